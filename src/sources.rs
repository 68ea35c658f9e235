//! Pipeline source configuration overview.
//!
//! Reports whether each moving part of the pipeline (rubric, drive, LLM,
//! cache) is configured and usable, without touching the network. Used by
//! `triage sources` to debug a config before running a classification.

use serde::Serialize;

use crate::config::Config;

/// Configuration status of one pipeline component.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    /// Component name: `rubric`, `drive`, `llm`, or `cache`.
    pub name: String,
    /// The configured provider or backend.
    pub provider: String,
    /// Whether the component is usable as configured.
    pub configured: bool,
    /// Human-readable explanation (path, model, or what is missing).
    pub detail: String,
}

/// Inspect the configuration and report the status of every component.
pub fn get_sources(config: &Config) -> Vec<SourceStatus> {
    let mut sources = Vec::new();

    let rubric_exists = config.rubric_path.exists();
    sources.push(SourceStatus {
        name: "rubric".into(),
        provider: "json".into(),
        configured: rubric_exists,
        detail: if rubric_exists {
            config.rubric_path.display().to_string()
        } else {
            format!("{} does not exist", config.rubric_path.display())
        },
    });

    let drive_status = match config.drive.provider.as_str() {
        "filesystem" => match &config.drive.root {
            Some(root) if root.exists() => (true, root.display().to_string()),
            Some(root) => (false, format!("root {} does not exist", root.display())),
            None => (false, "[drive].root is not set".to_string()),
        },
        "disabled" => (false, "set [drive].provider to enable discovery".to_string()),
        other => (false, format!("unknown provider \"{}\"", other)),
    };
    sources.push(SourceStatus {
        name: "drive".into(),
        provider: config.drive.provider.clone(),
        configured: drive_status.0,
        detail: drive_status.1,
    });

    let llm_status = match config.llm.provider.as_str() {
        "openai" => match &config.llm.model {
            Some(model) if std::env::var("OPENAI_API_KEY").is_ok() => (true, model.clone()),
            Some(model) => (false, format!("{} (OPENAI_API_KEY is not set)", model)),
            None => (false, "[llm].model is not set".to_string()),
        },
        "pattern" => (true, "offline pattern matching against the rubric".to_string()),
        "disabled" => (false, "set [llm].provider to enable classification".to_string()),
        other => (false, format!("unknown provider \"{}\"", other)),
    };
    sources.push(SourceStatus {
        name: "llm".into(),
        provider: config.llm.provider.clone(),
        configured: llm_status.0,
        detail: llm_status.1,
    });

    sources.push(SourceStatus {
        name: "cache".into(),
        provider: config.cache.backend.clone(),
        configured: matches!(config.cache.backend.as_str(), "sqlite" | "memory"),
        detail: match config.cache.backend.as_str() {
            "sqlite" => config.cache.path.display().to_string(),
            "memory" => "per-process, nothing persists between runs".to_string(),
            other => format!("unknown backend \"{}\"", other),
        },
    });

    sources
}

/// Print the source table for the `triage sources` command.
pub fn print_sources(config: &Config) {
    let sources = get_sources(config);

    println!("{:<10} {:<12} {:<16} {}", "SOURCE", "PROVIDER", "STATUS", "DETAIL");
    for s in &sources {
        let status = if s.configured { "OK" } else { "NOT CONFIGURED" };
        println!("{:<10} {:<12} {:<16} {}", s.name, s.provider, status, s.detail);
    }
}
