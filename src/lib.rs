//! # Doc Triage
//!
//! A rubric-driven document classification pipeline for cloud-drive
//! content.
//!
//! Doc Triage discovers documents from a configured drive, classifies
//! each one into user-defined rubric categories with an LLM, buckets the
//! results into confidence tiers, and caches them by content fingerprint
//! so unchanged documents never pay for a second model call. Reports and
//! spot-check validation run over the cached state, exposed via a CLI
//! and an MCP-compatible HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │   Drive   │──▶│  Classifier  │──▶│  SQLite  │
//! │  listing  │   │ rubric + LLM │   │  cache   │
//! └───────────┘   └──────────────┘   └────┬─────┘
//!                                         │
//!                     ┌───────────────────┤
//!                     ▼                   ▼
//!                ┌──────────┐       ┌──────────┐
//!                │   CLI    │       │   HTTP   │
//!                │ (triage) │       │  (MCP)   │
//!                └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! triage init                      # create the cache database
//! triage discover                  # list drive documents
//! triage classify                  # classify them against the rubric
//! triage report --details          # summarize stored results
//! triage validate --ground-truth labels.json   # spot-check accuracy
//! triage serve mcp                 # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`rubric`] | Category rubric loading and validation |
//! | [`discovery`] | Drive listing and document normalization |
//! | [`classifier`] | Prompting, response parsing, cache write-through |
//! | [`cache`] | Fingerprint-keyed result cache |
//! | [`llm`] | LLM provider abstraction |
//! | [`batch`] | Batched, bounded-concurrency classification runs |
//! | [`report`] | Result aggregation and rendering |
//! | [`validate`] | Seeded sampling against ground-truth labels |
//! | [`server`] | MCP HTTP server |
//! | [`traits`] | Tool extension traits and registry |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod batch;
pub mod cache;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod db;
pub mod discovery;
pub mod drive_fs;
pub mod error;
pub mod fingerprint;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod report;
pub mod rubric;
pub mod server;
pub mod sources;
pub mod stats;
pub mod traits;
pub mod validate;
