//! Integration tests for the classification pipeline.
//!
//! These tests drive the real pipeline end-to-end: the classifier against
//! a cache, batch runs over the bounded worker pool, and the four built-in
//! tools through the same code paths the HTTP server uses.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use doc_triage::batch::{self, BatchOptions};
use doc_triage::cache::MemoryCache;
use doc_triage::classifier::Classifier;
use doc_triage::clock::ManualClock;
use doc_triage::config::Config;
use doc_triage::error::{Error, Result as TriageResult};
use doc_triage::llm::LlmClient;
use doc_triage::models::{ConfidenceThresholds, Document, ResultSource, Tier};
use doc_triage::progress::NoProgress;
use doc_triage::rubric::{Category, Rubric};
use doc_triage::server::run_server_with_tools;
use doc_triage::traits::{Tool, ToolContext, ToolRegistry};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ─── Test Clients ───────────────────────────────────────────────────

/// An LLM stand-in that answers a fixed category and counts calls.
struct CountingClient {
    calls: AtomicU32,
    delay: StdDuration,
    answer: String,
}

impl CountingClient {
    fn new(category: &str, confidence: u8) -> Self {
        Self::with_delay(category, confidence, StdDuration::ZERO)
    }

    fn with_delay(category: &str, confidence: u8, delay: StdDuration) -> Self {
        Self {
            calls: AtomicU32::new(0),
            delay,
            answer: json!({"category": category, "confidence": confidence}).to_string(),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for CountingClient {
    fn model_name(&self) -> &str {
        "counting"
    }

    async fn complete(&self, _system: &str, _user: &str) -> TriageResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.answer.clone())
    }
}

/// Fails every document whose prompt contains a marker, succeeds otherwise.
struct FlakyClient {
    fail_marker: String,
}

#[async_trait]
impl LlmClient for FlakyClient {
    fn model_name(&self) -> &str {
        "flaky"
    }

    async fn complete(&self, _system: &str, user: &str) -> TriageResult<String> {
        if user.contains(&self.fail_marker) {
            return Err(Error::Llm("model unavailable".into()));
        }
        Ok(json!({"category": "financial", "confidence": 85}).to_string())
    }
}

/// Never answers. Exercises the per-document timeout.
struct HangingClient;

#[async_trait]
impl LlmClient for HangingClient {
    fn model_name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _system: &str, _user: &str) -> TriageResult<String> {
        std::future::pending().await
    }
}

// ─── Test Tool ──────────────────────────────────────────────────────

/// A custom tool that counts stored classifications via the ToolContext.
struct CacheDepthTool;

#[async_trait]
impl Tool for CacheDepthTool {
    fn name(&self) -> &str {
        "cache_depth"
    }

    fn description(&self) -> &str {
        "Count stored classifications"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let stored = ctx.stored_results().await?;
        Ok(json!({ "stored": stored.len() }))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn rubric() -> Rubric {
    Rubric::new(vec![
        Category {
            name: "financial".into(),
            description: "Budgets, invoices, and forecasts".into(),
            patterns: vec!["*budget*".into(), "*invoice*".into()],
            keywords: vec!["invoice".into(), "forecast".into(), "revenue".into()],
        },
        Category {
            name: "legal".into(),
            description: "Contracts and agreements".into(),
            patterns: vec!["*contract*".into()],
            keywords: vec!["contract".into(), "agreement".into(), "liability".into()],
        },
    ])
    .unwrap()
}

fn doc(id: &str, name: &str, snippet: &str) -> Document {
    Document {
        id: id.into(),
        name: name.into(),
        mime_type: "text/plain".into(),
        content_snippet: snippet.into(),
        modified_time: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        size_bytes: snippet.len() as u64,
    }
}

fn classifier_with(llm: Arc<dyn LlmClient>, clock: Arc<ManualClock>) -> Classifier {
    Classifier::new(
        rubric(),
        llm,
        Arc::new(MemoryCache::new(clock.clone())),
        clock,
        ConfidenceThresholds::default(),
        7,
    )
}

fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
    ))
}

fn write_rubric(tmp: &TempDir) -> std::path::PathBuf {
    let path = tmp.path().join("rubric.json");
    let body = json!({
        "categories": [
            {
                "name": "financial",
                "description": "Budgets, invoices, and forecasts",
                "patterns": ["*budget*", "*invoice*"],
                "keywords": ["invoice", "forecast", "revenue"]
            },
            {
                "name": "legal",
                "description": "Contracts and agreements",
                "patterns": ["*contract*"],
                "keywords": ["contract", "agreement", "liability"]
            }
        ]
    });
    std::fs::write(&path, serde_json::to_string_pretty(&body).unwrap()).unwrap();
    path
}

fn write_drive_files(tmp: &TempDir) -> std::path::PathBuf {
    let files = tmp.path().join("drive");
    std::fs::create_dir_all(&files).unwrap();
    std::fs::write(
        files.join("q3-budget.md"),
        "Q3 budget forecast. Revenue projections and invoice totals for the quarter.",
    )
    .unwrap();
    std::fs::write(
        files.join("vendor-contract.md"),
        "Master service agreement. Contract terms and liability caps.",
    )
    .unwrap();
    std::fs::write(
        files.join("notes.txt"),
        "Standup notes. Nothing in particular.",
    )
    .unwrap();
    files
}

/// Full working config: pattern LLM, SQLite cache, filesystem drive with
/// three fixture documents.
fn test_config(tmp: &TempDir) -> Config {
    let rubric_path = write_rubric(tmp);
    let files = write_drive_files(tmp);
    let db_path = tmp.path().join("triage.db");
    let config_content = format!(
        r#"
rubric_path = "{}"

[processing]
batch_size = 10
concurrency = 2
timeout_secs = 30

[cache]
backend = "sqlite"
path = "{}"

[llm]
provider = "pattern"

[drive]
provider = "filesystem"
root = "{}"
"#,
        rubric_path.display(),
        db_path.display(),
        files.display()
    );
    toml::from_str(&config_content).unwrap()
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

// ─── Classifier Tests ───────────────────────────────────────────────

/// A fresh document goes to the model once; the unchanged document is
/// served from the cache afterwards.
#[tokio::test]
async fn test_fresh_then_cache_hit() {
    let clock = manual_clock();
    let llm = Arc::new(CountingClient::new("financial", 92));
    let classifier = classifier_with(llm.clone(), clock);

    let budget = doc("d1", "q3-budget.xlsx", "revenue forecast");

    let first = classifier.classify(&budget).await.unwrap();
    assert_eq!(first.source, ResultSource::Fresh);
    assert_eq!(first.category, "financial");
    assert_eq!(first.tier, Tier::High);
    assert_eq!(llm.calls(), 1);

    let second = classifier.classify(&budget).await.unwrap();
    assert_eq!(second.source, ResultSource::CacheHit);
    assert_eq!(second.fingerprint, first.fingerprint);
    assert_eq!(
        llm.calls(),
        1,
        "Unchanged document must not hit the model again"
    );
}

/// Advancing the clock past the TTL expires the entry and the model is
/// consulted again.
#[tokio::test]
async fn test_expired_entry_is_reclassified() {
    let clock = manual_clock();
    let llm = Arc::new(CountingClient::new("legal", 75));
    let classifier = classifier_with(llm.clone(), clock.clone());

    let contract = doc("d1", "contract.pdf", "agreement terms");
    classifier.classify(&contract).await.unwrap();
    assert_eq!(llm.calls(), 1);

    // An hour short of the 7-day TTL: still cached
    clock.advance(Duration::days(7) - Duration::hours(1));
    let cached = classifier.classify(&contract).await.unwrap();
    assert_eq!(cached.source, ResultSource::CacheHit);
    assert_eq!(llm.calls(), 1);

    // Past the TTL: expired, classified fresh
    clock.advance(Duration::hours(2));
    let fresh = classifier.classify(&contract).await.unwrap();
    assert_eq!(fresh.source, ResultSource::Fresh);
    assert_eq!(llm.calls(), 2);
}

/// A changed snippet produces a new fingerprint, so the document is
/// re-classified even though the id is unchanged.
#[tokio::test]
async fn test_changed_content_invalidates_cache() {
    let clock = manual_clock();
    let llm = Arc::new(CountingClient::new("financial", 92));
    let classifier = classifier_with(llm.clone(), clock);

    let original = doc("d1", "q3-budget.xlsx", "revenue forecast");
    let first = classifier.classify(&original).await.unwrap();

    let edited = doc("d1", "q3-budget.xlsx", "revenue forecast v2");
    let second = classifier.classify(&edited).await.unwrap();

    assert_eq!(second.source, ResultSource::Fresh);
    assert_ne!(second.fingerprint, first.fingerprint);
    assert_eq!(llm.calls(), 2);
}

/// Two concurrent requests for the same document produce one model call;
/// the waiter is served from the cache the winner filled.
#[tokio::test]
async fn test_concurrent_same_document_calls_model_once() {
    let clock = manual_clock();
    let llm = Arc::new(CountingClient::with_delay(
        "financial",
        92,
        StdDuration::from_millis(50),
    ));
    let classifier = Arc::new(classifier_with(llm.clone(), clock));

    let budget = doc("d1", "q3-budget.xlsx", "revenue forecast");
    let (a, b) = tokio::join!(classifier.classify(&budget), classifier.classify(&budget));
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(
        llm.calls(),
        1,
        "In-flight duplicate should wait, not re-classify"
    );
    assert_eq!(a.category, b.category);
    assert!(
        a.source == ResultSource::CacheHit || b.source == ResultSource::CacheHit,
        "One of the two should be served from the cache"
    );
}

// ─── Batch Tests ────────────────────────────────────────────────────

/// Batch results come back in input order even when workers finish out
/// of order.
#[tokio::test]
async fn test_batch_preserves_input_order() {
    let clock = manual_clock();
    let llm = Arc::new(CountingClient::new("financial", 92));
    let classifier = Arc::new(classifier_with(llm, clock));

    let documents: Vec<Document> = (0..12)
        .map(|i| doc(&format!("doc-{i:02}"), &format!("file-{i}.txt"), "revenue"))
        .collect();
    let expected: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();

    let options = BatchOptions {
        batch_size: 5,
        concurrency: 4,
        timeout: StdDuration::from_secs(5),
    };
    let outcome = batch::run(
        classifier,
        documents,
        &options,
        &CancellationToken::new(),
        &NoProgress,
    )
    .await;

    assert!(outcome.failures.is_empty());
    let got: Vec<String> = outcome
        .results
        .iter()
        .map(|r| r.document_id.clone())
        .collect();
    assert_eq!(got, expected, "Results must preserve discovery order");
}

/// One failing document is recorded and never aborts the rest.
#[tokio::test]
async fn test_batch_isolates_failures() {
    let clock = manual_clock();
    let llm = Arc::new(FlakyClient {
        fail_marker: "poison".into(),
    });
    let classifier = Arc::new(classifier_with(llm, clock));

    let documents = vec![
        doc("ok-1", "a.txt", "revenue"),
        doc("bad-1", "b.txt", "poison snippet"),
        doc("ok-2", "c.txt", "forecast"),
    ];

    let options = BatchOptions {
        batch_size: 10,
        concurrency: 2,
        timeout: StdDuration::from_secs(5),
    };
    let outcome = batch::run(
        classifier,
        documents,
        &options,
        &CancellationToken::new(),
        &NoProgress,
    )
    .await;

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].document_id, "bad-1");

    let ids: Vec<&str> = outcome
        .results
        .iter()
        .map(|r| r.document_id.as_str())
        .collect();
    assert_eq!(ids, vec!["ok-1", "ok-2"]);
}

/// A document that exceeds the per-document deadline is recorded as a
/// timeout failure.
#[tokio::test]
async fn test_batch_timeout_is_recorded() {
    let clock = manual_clock();
    let classifier = Arc::new(classifier_with(Arc::new(HangingClient), clock));

    let documents = vec![doc("slow-1", "slow.txt", "whatever")];
    let options = BatchOptions {
        batch_size: 1,
        concurrency: 1,
        timeout: StdDuration::from_millis(50),
    };
    let outcome = batch::run(
        classifier,
        documents,
        &options,
        &CancellationToken::new(),
        &NoProgress,
    )
    .await;

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.failures.len(), 1);
    assert!(
        outcome.failures[0].error.contains("timed out"),
        "Expected a timeout failure, got: {}",
        outcome.failures[0].error
    );
}

/// A cancelled run classifies nothing and does not record the skipped
/// documents as failures.
#[tokio::test]
async fn test_cancelled_run_skips_everything() {
    let clock = manual_clock();
    let llm = Arc::new(CountingClient::new("financial", 92));
    let classifier = Arc::new(classifier_with(llm.clone(), clock));

    let documents = vec![
        doc("d1", "a.txt", "revenue"),
        doc("d2", "b.txt", "forecast"),
    ];
    let options = BatchOptions {
        batch_size: 10,
        concurrency: 2,
        timeout: StdDuration::from_secs(5),
    };

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = batch::run(classifier, documents, &options, &cancel, &NoProgress).await;

    assert!(outcome.results.is_empty());
    assert!(
        outcome.failures.is_empty(),
        "Skipped documents are not failures"
    );
    assert_eq!(llm.calls(), 0);
}

// ─── Tool Tests ─────────────────────────────────────────────────────

/// The built-in registry serves exactly the four pipeline tools.
#[test]
fn test_builtin_registry() {
    let tools = ToolRegistry::with_builtins();
    assert_eq!(tools.len(), 4);

    let mut names: Vec<&str> = tools.tools().iter().map(|t| t.name()).collect();
    names.sort_unstable();
    assert_eq!(
        names,
        vec![
            "classify_documents",
            "discover_documents",
            "generate_report",
            "validate_samples"
        ]
    );
    assert!(tools.tools().iter().all(|t| t.is_builtin()));
    assert!(tools.find("discover_documents").is_some());
    assert!(tools.find("nonexistent").is_none());
}

/// The discover tool lists drive files through the ToolContext without
/// touching the model or the cache.
#[tokio::test]
async fn test_discover_tool_lists_drive_files() {
    let tmp = TempDir::new().unwrap();
    let ctx = ToolContext::new(Arc::new(test_config(&tmp)));
    let tools = ToolRegistry::with_builtins();
    let tool = tools.find("discover_documents").unwrap();

    let result = tool.execute(json!({}), &ctx).await.unwrap();
    assert_eq!(result["count"], 3);
    assert_eq!(result["skipped"], 0);

    // Name filter narrows the listing
    let result = tool.execute(json!({"query": "budget"}), &ctx).await.unwrap();
    assert_eq!(result["count"], 1);
}

/// Classify writes through to the SQLite cache; a second run, the report
/// tool, and the validation tool all read the same stored state back.
#[tokio::test]
async fn test_classify_report_validate_share_state() {
    let tmp = TempDir::new().unwrap();
    let ctx = ToolContext::new(Arc::new(test_config(&tmp)));
    let tools = ToolRegistry::with_builtins();

    // First pass: everything is fresh
    let classify = tools.find("classify_documents").unwrap();
    let first = classify.execute(json!({}), &ctx).await.unwrap();
    assert_eq!(first["classified"], 3);
    assert_eq!(first["failed"], 0);
    let sources: Vec<&str> = first["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["source"].as_str().unwrap())
        .collect();
    assert!(sources.iter().all(|s| *s == "FRESH"), "got: {:?}", sources);

    // Second pass: unchanged documents come from the cache
    let second = classify.execute(json!({}), &ctx).await.unwrap();
    let sources: Vec<&str> = second["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["source"].as_str().unwrap())
        .collect();
    assert!(
        sources.iter().all(|s| *s == "CACHE_HIT"),
        "got: {:?}",
        sources
    );

    // Report aggregates the stored state
    let report = tools.find("generate_report").unwrap();
    let rep = report.execute(json!({"details": true}), &ctx).await.unwrap();
    assert_eq!(rep["report"]["total_documents"], 3);
    assert_eq!(rep["report"]["per_category_counts"]["financial"], 1);
    assert_eq!(rep["report"]["per_category_counts"]["legal"], 1);
    assert_eq!(rep["report"]["per_category_counts"]["unclassified"], 1);
    assert_eq!(rep["report"]["tier_distribution"]["high"], 2);
    assert_eq!(rep["report"]["tier_distribution"]["low"], 1);
    assert_eq!(rep["documents"].as_array().unwrap().len(), 3);

    // Markdown rendering rides along when asked for
    let md = report
        .execute(json!({"format": "markdown"}), &ctx)
        .await
        .unwrap();
    assert!(md["markdown"].as_str().unwrap().contains("financial"));

    // Validation scores the stored results against known labels
    let validate = tools.find("validate_samples").unwrap();
    let out = validate
        .execute(
            json!({
                "ground_truth": {
                    "q3-budget.md": "financial",
                    "vendor-contract.md": "legal"
                },
                "seed": 7
            }),
            &ctx,
        )
        .await
        .unwrap();
    let v = &out["validation"];
    assert_eq!(v["correct_count"], 2);
    assert_eq!(v["accuracy"], 1.0);
    assert_eq!(v["tier_distribution"]["high"], 2);
}

/// Bad tool parameters fail loudly instead of defaulting.
#[tokio::test]
async fn test_tool_parameter_validation() {
    let tmp = TempDir::new().unwrap();
    let ctx = ToolContext::new(Arc::new(test_config(&tmp)));
    let tools = ToolRegistry::with_builtins();

    let err = tools
        .find("classify_documents")
        .unwrap()
        .execute(json!({"batch_size": 0}), &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("batch_size"));

    let err = tools
        .find("generate_report")
        .unwrap()
        .execute(json!({"format": "yaml"}), &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("format"));

    let err = tools
        .find("validate_samples")
        .unwrap()
        .execute(json!({}), &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ground_truth"));
}

// ─── Server Tests ───────────────────────────────────────────────────

/// The four built-ins and a custom tool are served over HTTP, with the
/// documented error envelope for bad calls.
#[tokio::test]
async fn test_tools_over_http() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let mut cfg = test_config(&tmp);
    cfg.server.bind = format!("127.0.0.1:{}", port);

    let mut tools = ToolRegistry::with_builtins();
    tools.register(Box::new(CacheDepthTool));

    let cfg_clone = cfg.clone();
    let server_handle = tokio::spawn(async move {
        run_server_with_tools(&cfg_clone, tools).await.ok();
    });
    wait_for_server(port).await;

    let client = reqwest::Client::new();

    // Tool list includes built-ins and the custom tool
    let resp = client
        .get(format!("http://127.0.0.1:{}/tools/list", port))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    for expected in [
        "discover_documents",
        "classify_documents",
        "generate_report",
        "validate_samples",
        "cache_depth",
    ] {
        assert!(
            names.contains(&expected),
            "Missing tool {} in {:?}",
            expected,
            names
        );
    }

    // Discovery through the HTTP surface
    let resp = client
        .post(format!("http://127.0.0.1:{}/tools/discover_documents", port))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["count"], 3);

    // Unknown tool → 404 with the error envelope
    let resp = client
        .post(format!("http://127.0.0.1:{}/tools/nonexistent", port))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    // Bad parameters → 400
    let resp = client
        .post(format!(
            "http://127.0.0.1:{}/tools/classify_documents",
            port
        ))
        .json(&json!({"batch_size": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    server_handle.abort();
}
