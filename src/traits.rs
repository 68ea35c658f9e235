//! Extension traits and the tool registry.
//!
//! This module provides the trait-based extension system for the triage
//! pipeline. The four built-in tools cover the full pipeline surface;
//! users can implement [`Tool`] in Rust to serve custom tools alongside
//! them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                ToolRegistry                  │
//! │  ┌────────────────────────┐ ┌─────────────┐  │
//! │  │ Built-in               │ │ Custom      │  │
//! │  │ discover / classify    │ │ (Rust)      │  │
//! │  │ report / validate      │ │ Tools       │  │
//! │  └────────────────────────┘ └─────────────┘  │
//! └──────────────────┬───────────────────────────┘
//!                    ▼
//!            run_server() → JSON HTTP API
//! ```
//!
//! # Usage
//!
//! ```rust
//! use doc_triage::traits::ToolRegistry;
//!
//! let mut tools = ToolRegistry::with_builtins();
//! // tools.register(Box::new(MyTool::new()));
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::batch::{self, ClassificationRun};
use crate::config::Config;
use crate::discovery::{self, DriveQuery};
use crate::models::{BatchResult, ClassificationResult, DiscoverOutcome};
use crate::progress::NoProgress;
use crate::report;
use crate::validate::{self, GroundTruth};

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A tool that agents can discover and call.
///
/// Implement this trait to create a compiled Rust tool. Tools are
/// registered at server startup and exposed via `GET /tools/list`
/// for agent discovery and `POST /tools/{name}` for invocation.
///
/// # Lifecycle
///
/// 1. The tool is registered via [`ToolRegistry::register`].
/// 2. [`name`](Tool::name), [`description`](Tool::description), and
///    [`parameters_schema`](Tool::parameters_schema) are called at startup
///    for the tool list.
/// 3. [`execute`](Tool::execute) is called each time an agent invokes
///    the tool.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use doc_triage::traits::{Tool, ToolContext};
///
/// pub struct CacheDepthTool;
///
/// #[async_trait]
/// impl Tool for CacheDepthTool {
///     fn name(&self) -> &str { "cache_depth" }
///     fn description(&self) -> &str { "Count stored classifications" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({
///             "type": "object",
///             "properties": {},
///             "required": []
///         })
///     }
///
///     async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
///         let stored = ctx.stored_results().await?;
///         Ok(json!({ "stored": stored.len() }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's name.
    ///
    /// Used as the route path (`POST /tools/{name}`) and in
    /// `GET /tools/list` responses. Should be a lowercase
    /// identifier with underscores (e.g., `"discover_documents"`).
    fn name(&self) -> &str;

    /// Returns a one-line description for agent discovery.
    ///
    /// Agents use this to decide whether to call the tool.
    fn description(&self) -> &str;

    /// Whether this tool is a built-in.
    ///
    /// Built-in tools are marked with `"builtin": true` in the
    /// `GET /tools/list` response. Defaults to `false`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// Returns the OpenAI function-calling JSON Schema for parameters.
    ///
    /// Must be a valid JSON Schema object with `type: "object"`,
    /// `properties`, and optionally `required`.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool.
    ///
    /// Called each time an agent invokes the tool via `POST /tools/{name}`.
    ///
    /// # Arguments
    ///
    /// * `params` — JSON parameters (always a JSON object).
    /// * `ctx` — Bridge to the configured pipeline.
    ///
    /// # Returns
    ///
    /// A JSON value that will be wrapped in `{ "result": ... }` in the
    /// HTTP response.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Tool metadata served by `GET /tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    /// OpenAI function-calling JSON Schema for the tool's parameters.
    pub parameters: Value,
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// Context bridge for tool execution.
///
/// Provides tools with access to the configured pipeline during
/// execution. Created by the server for each tool invocation.
///
/// All methods delegate to the same core functions used by the CLI,
/// ensuring tools have identical capabilities.
pub struct ToolContext {
    config: Arc<Config>,
}

impl ToolContext {
    /// Create a new tool context from the application config.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// The application configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// List documents from the configured drive without classifying them.
    ///
    /// Equivalent to `POST /tools/discover_documents` or `triage discover`.
    pub async fn discover(&self, query: &DriveQuery) -> Result<DiscoverOutcome> {
        let lister = discovery::create_lister(&self.config.drive)?;
        Ok(discovery::discover(lister.as_ref(), query).await?)
    }

    /// Discover and classify documents.
    ///
    /// Equivalent to `POST /tools/classify_documents` or `triage classify`.
    pub async fn classify(
        &self,
        query: &DriveQuery,
        batch_size: Option<usize>,
    ) -> Result<ClassificationRun> {
        let cancel = CancellationToken::new();
        Ok(batch::run_classification(&self.config, query, batch_size, &cancel, &NoProgress).await?)
    }

    /// Load every stored, non-expired classification, one per document.
    ///
    /// This is the state `generate_report` and `validate_samples` run over.
    pub async fn stored_results(&self) -> Result<Vec<ClassificationResult>> {
        Ok(report::stored_results(&self.config).await?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tool Implementations
// ═══════════════════════════════════════════════════════════════════════

fn drive_query(params: &Value) -> DriveQuery {
    let name = params["query"].as_str().unwrap_or("").trim();
    DriveQuery {
        name_contains: (!name.is_empty()).then(|| name.to_string()),
        limit: params["limit"].as_u64().map(|n| n as usize),
    }
}

/// Built-in discovery tool. Delegates to [`ToolContext::discover`].
pub struct DiscoverTool;

#[async_trait]
impl Tool for DiscoverTool {
    fn name(&self) -> &str {
        "discover_documents"
    }

    fn description(&self) -> &str {
        "List documents from the configured drive without classifying them"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Case-insensitive substring match on document names" },
                "limit": { "type": "integer", "description": "Stop after this many documents" }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = drive_query(&params);
        let outcome = ctx.discover(&query).await?;

        Ok(serde_json::json!({
            "count": outcome.documents.len(),
            "skipped": outcome.skipped,
            "documents": outcome.documents,
        }))
    }
}

/// Built-in classification tool. Delegates to [`ToolContext::classify`].
pub struct ClassifyTool;

#[async_trait]
impl Tool for ClassifyTool {
    fn name(&self) -> &str {
        "classify_documents"
    }

    fn description(&self) -> &str {
        "Discover and classify documents against the rubric, serving unchanged documents from the cache"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Case-insensitive substring match on document names" },
                "limit": { "type": "integer", "description": "Stop discovery after this many documents" },
                "batch_size": { "type": "integer", "description": "Documents per batch; defaults to [processing].batch_size" }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let batch_size = if params["batch_size"].is_null() {
            None
        } else {
            match params["batch_size"].as_u64() {
                Some(n) if n >= 1 => Some(n as usize),
                _ => anyhow::bail!("batch_size must be a positive integer"),
            }
        };

        let query = drive_query(&params);
        let run = ctx.classify(&query, batch_size).await?;

        Ok(serde_json::json!({
            "run_id": run.batch.run_id,
            "discovered": run.discovered,
            "skipped": run.skipped,
            "classified": run.batch.results.len(),
            "failed": run.batch.failures.len(),
            "results": run.batch.results,
            "failures": run.batch.failures,
        }))
    }
}

/// Built-in report tool. Aggregates stored classifications.
pub struct ReportTool;

#[async_trait]
impl Tool for ReportTool {
    fn name(&self) -> &str {
        "generate_report"
    }

    fn description(&self) -> &str {
        "Summarize stored classification results by category and confidence tier"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "details": { "type": "boolean", "description": "Include a per-document listing", "default": false },
                "format": { "type": "string", "enum": ["json", "markdown"], "default": "json" }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let details = params["details"].as_bool().unwrap_or(false);
        let format = params["format"].as_str().unwrap_or("json");
        if format != "json" && format != "markdown" {
            anyhow::bail!("format must be \"json\" or \"markdown\"");
        }

        let results = ctx.stored_results().await?;
        let batch = BatchResult {
            run_id: String::new(),
            results,
            failures: Vec::new(),
        };
        let rep = report::generate(&batch, None, Utc::now());

        let mut body = serde_json::json!({ "report": rep });
        if details {
            body["documents"] = serde_json::to_value(&batch.results)?;
        }
        if format == "markdown" {
            let rows = details.then_some(batch.results.as_slice());
            body["markdown"] = Value::String(report::render_markdown(&rep, rows));
        }
        Ok(body)
    }
}

/// Built-in validation tool. Scores stored classifications against
/// known-good labels.
pub struct ValidateTool;

#[async_trait]
impl Tool for ValidateTool {
    fn name(&self) -> &str {
        "validate_samples"
    }

    fn description(&self) -> &str {
        "Check a random sample of stored classifications against known-good labels"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "ground_truth": { "type": "object", "description": "Map of document id to expected category" },
                "ground_truth_path": { "type": "string", "description": "Path to a JSON file holding the ground-truth map" },
                "sample_size": { "type": "integer", "description": "Documents to sample; defaults to [validation].sample_size" },
                "seed": { "type": "integer", "description": "Seed for reproducible sampling" }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let ground_truth: GroundTruth = if params["ground_truth"].is_object() {
            serde_json::from_value(params["ground_truth"].clone())?
        } else if let Some(path) = params["ground_truth_path"].as_str() {
            validate::load_ground_truth(Path::new(path))?
        } else {
            anyhow::bail!("ground_truth (object) or ground_truth_path (string) is required");
        };

        let sample_size = params["sample_size"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(ctx.config.validation.sample_size);
        let seed = params["seed"].as_u64().or(ctx.config.validation.seed);

        let results = ctx.stored_results().await?;
        let rep = validate::validate(&results, &ground_truth, sample_size, seed);

        Ok(serde_json::json!({ "validation": rep }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry for tools (built-in and custom Rust).
///
/// Use [`ToolRegistry::with_builtins`] to create a registry pre-loaded
/// with the four pipeline tools, then optionally call
/// [`register`](ToolRegistry::register) to add custom ones.
///
/// # Example
///
/// ```rust
/// use doc_triage::traits::ToolRegistry;
///
/// let mut tools = ToolRegistry::with_builtins();
/// // tools.register(Box::new(MyTool::new()));
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Create a tool registry pre-loaded with the built-in tools
    /// (discover_documents, classify_documents, generate_report,
    /// validate_samples).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(DiscoverTool));
        registry.register(Box::new(ClassifyTool));
        registry.register(Box::new(ReportTool));
        registry.register(Box::new(ValidateTool));
        registry
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    /// Get all registered tools.
    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    /// Find a tool by name.
    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Metadata for every registered tool, in registration order.
    pub fn info(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                builtin: t.is_builtin(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Return the count of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
