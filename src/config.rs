use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::ConfidenceThresholds;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub rubric_path: PathBuf,
    #[serde(default)]
    pub confidence_thresholds: ConfidenceThresholds,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_cache_duration_days")]
    pub cache_duration_days: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_document_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            cache_duration_days: default_cache_duration_days(),
            concurrency: default_concurrency(),
            timeout_secs: default_document_timeout_secs(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}
fn default_cache_duration_days() -> u32 {
    7
}
fn default_concurrency() -> usize {
    4
}
fn default_document_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_backend")]
    pub backend: String,
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            path: default_cache_path(),
        }
    }
}

fn default_cache_backend() -> String {
    "sqlite".to_string()
}
fn default_cache_path() -> PathBuf {
    PathBuf::from("./triage.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

fn default_llm_provider() -> String {
    "disabled".to_string()
}
fn default_llm_max_retries() -> u32 {
    3
}
fn default_llm_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct DriveConfig {
    #[serde(default = "default_drive_provider")]
    pub provider: String,
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            provider: default_drive_provider(),
            root: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            snippet_max_chars: default_snippet_max_chars(),
        }
    }
}

fn default_drive_provider() -> String {
    "disabled".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}
fn default_snippet_max_chars() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8675".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidationConfig {
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            seed: None,
        }
    }
}

fn default_sample_size() -> usize {
    100
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl DriveConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate thresholds
    let t = &config.confidence_thresholds;
    if t.high > 100 || t.medium > 100 || t.low > 100 {
        anyhow::bail!("confidence_thresholds must be in [0, 100]");
    }
    if !(t.high >= t.medium && t.medium >= t.low) {
        anyhow::bail!(
            "confidence_thresholds must be ordered high >= medium >= low (got {}/{}/{})",
            t.high,
            t.medium,
            t.low
        );
    }

    // Validate processing
    if config.processing.batch_size < 1 {
        anyhow::bail!("processing.batch_size must be >= 1");
    }
    if config.processing.cache_duration_days < 1 {
        anyhow::bail!("processing.cache_duration_days must be >= 1");
    }
    if config.processing.concurrency < 1 {
        anyhow::bail!("processing.concurrency must be >= 1");
    }

    // Validate cache
    match config.cache.backend.as_str() {
        "sqlite" | "memory" => {}
        other => anyhow::bail!("Unknown cache backend: '{}'. Must be sqlite or memory.", other),
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "disabled" | "openai" | "pattern" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or pattern.",
            other
        ),
    }
    if config.llm.provider == "openai" && config.llm.model.is_none() {
        anyhow::bail!("llm.model must be specified when provider is 'openai'");
    }

    // Validate drive
    match config.drive.provider.as_str() {
        "disabled" | "filesystem" => {}
        other => anyhow::bail!(
            "Unknown drive provider: '{}'. Must be disabled or filesystem.",
            other
        ),
    }
    if config.drive.provider == "filesystem" && config.drive.root.is_none() {
        anyhow::bail!("drive.root must be specified when provider is 'filesystem'");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage.toml");
        std::fs::write(&path, body).unwrap();
        (dir, path)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let (_dir, path) = write_config("rubric_path = \"./rubric.json\"\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.confidence_thresholds.high, 90);
        assert_eq!(config.confidence_thresholds.medium, 70);
        assert_eq!(config.processing.batch_size, 100);
        assert_eq!(config.processing.cache_duration_days, 7);
        assert_eq!(config.processing.concurrency, 4);
        assert_eq!(config.cache.backend, "sqlite");
        assert_eq!(config.llm.provider, "disabled");
        assert!(!config.llm.is_enabled());
        assert_eq!(config.validation.sample_size, 100);
    }

    #[test]
    fn threshold_ordering_is_enforced() {
        let (_dir, path) = write_config(
            "rubric_path = \"./rubric.json\"\n\n[confidence_thresholds]\nhigh = 50\nmedium = 70\nlow = 0\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("high >= medium >= low"));
    }

    #[test]
    fn threshold_range_is_enforced() {
        let (_dir, path) = write_config(
            "rubric_path = \"./rubric.json\"\n\n[confidence_thresholds]\nhigh = 101\nmedium = 70\nlow = 0\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn batch_size_must_be_positive() {
        let (_dir, path) =
            write_config("rubric_path = \"./rubric.json\"\n\n[processing]\nbatch_size = 0\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn cache_duration_must_be_positive() {
        let (_dir, path) = write_config(
            "rubric_path = \"./rubric.json\"\n\n[processing]\ncache_duration_days = 0\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("cache_duration_days"));
    }

    #[test]
    fn openai_provider_requires_a_model() {
        let (_dir, path) =
            write_config("rubric_path = \"./rubric.json\"\n\n[llm]\nprovider = \"openai\"\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("llm.model"));
    }

    #[test]
    fn filesystem_drive_requires_a_root() {
        let (_dir, path) =
            write_config("rubric_path = \"./rubric.json\"\n\n[drive]\nprovider = \"filesystem\"\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("drive.root"));
    }

    #[test]
    fn unknown_providers_are_rejected() {
        let (_dir, path) =
            write_config("rubric_path = \"./rubric.json\"\n\n[llm]\nprovider = \"gemini\"\n");
        assert!(load_config(&path).is_err());

        let (_dir, path) =
            write_config("rubric_path = \"./rubric.json\"\n\n[cache]\nbackend = \"redis\"\n");
        assert!(load_config(&path).is_err());
    }
}
