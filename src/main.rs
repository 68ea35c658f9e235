//! # Doc Triage CLI (`triage`)
//!
//! The `triage` binary is the primary interface for Doc Triage. It
//! provides commands for cache initialization, rubric inspection, document
//! discovery, classification runs, reporting, validation, and starting the
//! MCP server.
//!
//! ## Usage
//!
//! ```bash
//! triage --config ./config/triage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `triage init` | Create the SQLite cache and run schema migrations |
//! | `triage rubric` | Validate and print the classification rubric |
//! | `triage sources` | Show the configuration status of every component |
//! | `triage discover` | List drive documents without classifying them |
//! | `triage classify` | Discover and classify documents against the rubric |
//! | `triage report` | Summarize stored results by category and tier |
//! | `triage validate` | Spot-check stored results against known labels |
//! | `triage cache <stats\|purge>` | Inspect or clean the result cache |
//! | `triage serve mcp` | Start the MCP-compatible HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the cache database
//! triage init --config ./config/triage.toml
//!
//! # Check the rubric and component configuration
//! triage rubric --config ./config/triage.toml
//! triage sources --config ./config/triage.toml
//!
//! # Classify everything the drive lists, 50 documents per batch
//! triage classify --batch-size 50 --config ./config/triage.toml
//!
//! # Summarize what is stored, with a per-document table
//! triage report --details --config ./config/triage.toml
//!
//! # Score a reviewed sample reproducibly
//! triage validate --ground-truth labels.json --seed 7 --config ./config/triage.toml
//!
//! # Start MCP server for Cursor integration
//! triage serve mcp --config ./config/triage.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use doc_triage::cache;
use doc_triage::clock::{Clock, SystemClock};
use doc_triage::config;
use doc_triage::discovery::{self, DriveQuery};
use doc_triage::models::{BatchResult, ResultSource};
use doc_triage::progress::ProgressMode;
use doc_triage::rubric::Rubric;
use doc_triage::{batch, migrate, report, server, sources, stats, validate};

/// Doc Triage CLI — rubric-driven document classification for cloud-drive
/// content.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/triage.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "triage",
    about = "Doc Triage — rubric-driven document classification for cloud-drive content",
    version,
    long_about = "Doc Triage discovers documents from a configured drive, classifies each one \
    into user-defined rubric categories with an LLM, buckets the results into confidence tiers, \
    and caches them by content fingerprint so unchanged documents are never re-classified."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/triage.toml`. All rubric, drive, LLM, cache,
    /// and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/triage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the cache database schema.
    ///
    /// Creates the SQLite database file and the classifications table.
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Validate and print the classification rubric.
    ///
    /// Loads the rubric JSON named by `rubric_path`, checks it for
    /// duplicate or reserved category names, and prints each category
    /// with its matching hints. Exits non-zero if the rubric is missing
    /// or malformed.
    Rubric,

    /// Show the configuration status of every pipeline component.
    ///
    /// Reports whether the rubric, drive, LLM, and cache are usable as
    /// configured. Useful for verifying a config before running a
    /// classification.
    Sources,

    /// List drive documents without classifying them.
    ///
    /// Walks the configured drive listing, normalizes entries, and prints
    /// one row per document. Malformed entries are skipped and counted.
    Discover {
        /// Case-insensitive substring match on document names.
        #[arg(long)]
        query: Option<String>,

        /// Stop after this many documents.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Discover and classify documents against the rubric.
    ///
    /// Runs the full pipeline: discovery, fingerprinting, cache lookup,
    /// LLM classification for changed or new documents, and cache
    /// write-through. One document's failure never aborts the run.
    Classify {
        /// Case-insensitive substring match on document names.
        #[arg(long)]
        query: Option<String>,

        /// Stop discovery after this many documents.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config (documents per batch).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show what would be classified without calling the LLM.
        #[arg(long)]
        dry_run: bool,
    },

    /// Summarize stored classification results.
    ///
    /// Aggregates every non-expired cache entry into per-category counts
    /// and a confidence-tier distribution.
    Report {
        /// Output format: `markdown` or `json`.
        #[arg(long, default_value = "markdown")]
        format: String,

        /// Include a per-document listing.
        #[arg(long)]
        details: bool,
    },

    /// Spot-check stored results against known-good labels.
    ///
    /// Draws a uniform sample of classified documents that appear in the
    /// ground-truth file and reports overall and per-category accuracy.
    Validate {
        /// Path to a JSON file mapping document ids to expected categories.
        #[arg(long)]
        ground_truth: PathBuf,

        /// Documents to sample. Defaults to `[validation].sample_size`.
        #[arg(long)]
        sample_size: Option<usize>,

        /// Seed for reproducible sampling.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Inspect or clean the result cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Start the MCP-compatible HTTP server.
    ///
    /// Exposes the triage tools via a JSON API for integration with
    /// Cursor, Claude, and other MCP-compatible AI tools.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Cache maintenance subcommands.
#[derive(Subcommand)]
enum CacheAction {
    /// Print entry counts, tier and category breakdowns, and the
    /// database size.
    Stats,

    /// Delete expired entries.
    ///
    /// Expiry is otherwise lazy; this reclaims space eagerly.
    Purge,
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the MCP tool server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// the triage tool endpoints.
    Mcp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Cache database initialized successfully.");
        }
        Commands::Rubric => {
            let rubric = Rubric::load(&cfg.rubric_path)?;
            println!(
                "Rubric: {} ({} categories)",
                cfg.rubric_path.display(),
                rubric.len()
            );
            println!();
            for category in rubric.categories() {
                println!("  {}", category.name);
                if !category.description.is_empty() {
                    println!("      {}", category.description);
                }
                if !category.patterns.is_empty() {
                    println!("      patterns: {}", category.patterns.join(", "));
                }
                if !category.keywords.is_empty() {
                    println!("      keywords: {}", category.keywords.join(", "));
                }
            }
        }
        Commands::Sources => {
            sources::print_sources(&cfg);
        }
        Commands::Discover { query, limit } => {
            let lister = discovery::create_lister(&cfg.drive)?;
            let drive_query = DriveQuery {
                name_contains: query,
                limit,
            };
            let outcome = discovery::discover(lister.as_ref(), &drive_query).await?;

            println!("{:<40} {:<24} {:>10}  {}", "ID", "MIME", "SIZE", "MODIFIED");
            for doc in &outcome.documents {
                println!(
                    "{:<40} {:<24} {:>10}  {}",
                    doc.id,
                    doc.mime_type,
                    doc.size_bytes,
                    doc.modified_time.format("%Y-%m-%d %H:%M")
                );
            }
            println!();
            println!(
                "{} documents ({} entries skipped)",
                outcome.documents.len(),
                outcome.skipped
            );
        }
        Commands::Classify {
            query,
            limit,
            batch_size,
            dry_run,
        } => {
            let drive_query = DriveQuery {
                name_contains: query,
                limit,
            };

            if dry_run {
                let lister = discovery::create_lister(&cfg.drive)?;
                let outcome = discovery::discover(lister.as_ref(), &drive_query).await?;
                println!(
                    "Would classify {} documents ({} entries skipped).",
                    outcome.documents.len(),
                    outcome.skipped
                );
                return Ok(());
            }

            let progress = ProgressMode::default_for_tty().reporter();
            let cancel = CancellationToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        eprintln!();
                        eprintln!("Stopping after in-flight documents...");
                        cancel.cancel();
                    }
                });
            }

            let run =
                batch::run_classification(&cfg, &drive_query, batch_size, &cancel, progress.as_ref())
                    .await?;

            let cache_hits = run
                .batch
                .results
                .iter()
                .filter(|r| r.source == ResultSource::CacheHit)
                .count();

            println!("Classification run {} complete:", run.batch.run_id);
            println!(
                "  Discovered: {} documents ({} entries skipped)",
                run.discovered, run.skipped
            );
            println!("  Classified: {}", run.batch.results.len());
            println!("  From cache: {}", cache_hits);
            if !run.batch.failures.is_empty() {
                println!("  Failures:   {}", run.batch.failures.len());
                for failure in &run.batch.failures {
                    eprintln!("    {}: {}", failure.document_id, failure.error);
                }
            }
        }
        Commands::Report { format, details } => {
            if format != "markdown" && format != "json" {
                anyhow::bail!("unknown report format: {}", format);
            }

            let results = report::stored_results(&cfg).await?;
            let stored = BatchResult {
                run_id: String::new(),
                results,
                failures: Vec::new(),
            };
            let summary = report::generate(&stored, None, chrono::Utc::now());

            if format == "json" {
                let mut body = serde_json::to_value(&summary)?;
                if details {
                    body["documents"] = serde_json::to_value(&stored.results)?;
                }
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                let rows = details.then_some(stored.results.as_slice());
                print!("{}", report::render_markdown(&summary, rows));
            }
        }
        Commands::Validate {
            ground_truth,
            sample_size,
            seed,
        } => {
            let truth = validate::load_ground_truth(&ground_truth)?;
            let results = report::stored_results(&cfg).await?;
            let sample_size = sample_size.unwrap_or(cfg.validation.sample_size);
            let seed = seed.or(cfg.validation.seed);

            let outcome = validate::validate(&results, &truth, sample_size, seed);
            match outcome.accuracy {
                Some(accuracy) => {
                    println!(
                        "Validated {} sampled documents: {}/{} correct ({:.1}%)",
                        outcome.samples.len(),
                        outcome.correct_count,
                        outcome.samples.len(),
                        accuracy * 100.0
                    );
                    println!();
                    println!(
                        "{:<24} {:>8} {:>8} {:>9}",
                        "CATEGORY", "CORRECT", "TOTAL", "ACCURACY"
                    );
                    for (category, tally) in &outcome.per_category_tallies {
                        println!(
                            "{:<24} {:>8} {:>8} {:>8.1}%",
                            category,
                            tally.correct,
                            tally.total,
                            tally.accuracy() * 100.0
                        );
                    }
                }
                None => {
                    println!(
                        "No stored classifications matched the ground-truth labels; nothing to validate."
                    );
                }
            }
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => {
                stats::run_cache_stats(&cfg).await?;
            }
            CacheAction::Purge => {
                let clock: Arc<dyn Clock> = Arc::new(SystemClock);
                let store = cache::create_cache(&cfg.cache, clock).await?;
                let purged = store.purge_expired().await?;
                println!("Purged {} expired cache entries.", purged);
            }
        },
        Commands::Serve { service } => match service {
            ServeService::Mcp => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}
