//! LLM provider abstraction and implementations.
//!
//! Defines the [`LlmClient`] trait and concrete implementations:
//! - **[`DisabledClient`]** — returns errors; used when no LLM is configured.
//! - **[`OpenAiClient`]** — calls the OpenAI chat completions API with retry and backoff.
//! - **[`PatternClient`]** — offline provider that scores rubric patterns and
//!   keywords against the document text; answers in the same JSON wire shape
//!   the strict parser expects. Used for dry runs and hermetic tests.
//!
//! # Provider Selection
//!
//! Use [`create_client`] to instantiate the appropriate provider based on
//! the configuration (`llm.provider = "disabled" | "openai" | "pattern"`).
//!
//! # Retry Strategy
//!
//! The OpenAI client uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::models::UNCLASSIFIED;
use crate::rubric::Rubric;

/// A model that can answer one classification request.
///
/// `system` carries the instructions and the rubric; `user` carries the
/// document name and content snippet. The returned string is untrusted
/// model text; the classifier parses it strictly.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

// ============ Disabled Client ============

/// A no-op client that always returns errors.
///
/// Used when `llm.provider = "disabled"` in the configuration.
pub struct DisabledClient;

#[async_trait]
impl LlmClient for DisabledClient {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        Err(Error::Llm("llm provider is disabled".into()))
    }
}

// ============ OpenAI Client ============

/// Client for the OpenAI chat completions API.
///
/// Calls `POST /v1/chat/completions` with the configured model. Requires
/// the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAiClient {
    model: String,
    api_key: String,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiClient {
    /// Create a new OpenAI client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `llm.model` is not set in config, or if
    /// `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Llm("llm.model required for openai provider".into()))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Llm("OPENAI_API_KEY environment variable not set".into()))?;

        Ok(Self {
            model,
            api_key,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| Error::Llm(format!("failed to build HTTP client: {e}")))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.1,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| Error::Llm(format!("invalid response body: {e}")))?;
                        return parse_chat_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::Llm(format!(
                            "OpenAI API error {status}: {body_text}"
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::Llm(format!("OpenAI API error {status}: {body_text}")));
                }
                Err(e) => {
                    last_err = Some(Error::Llm(format!("request failed: {e}")));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Llm("completion failed after retries".into())))
    }
}

/// Extract the first choice's message content from a chat completions
/// response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Llm("invalid OpenAI response: missing message content".into()))
}

// ============ Pattern Client ============

/// Offline provider that classifies by rubric pattern and keyword hits.
///
/// Each category scores one point per pattern that matches the document
/// text (wildcards stripped, case-insensitive substring) and one per
/// keyword. The best-scoring category wins, ties broken by rubric order;
/// zero hits everywhere answers `unclassified`. Confidence grows with the
/// hit count and saturates at 95, so scores land in the same tiers a real
/// model would produce for obvious/ambiguous documents.
pub struct PatternClient {
    rubric: Rubric,
}

impl PatternClient {
    pub fn new(rubric: Rubric) -> Self {
        Self { rubric }
    }
}

#[async_trait]
impl LlmClient for PatternClient {
    fn model_name(&self) -> &str {
        "pattern"
    }

    async fn complete(&self, _system: &str, user: &str) -> Result<String> {
        let haystack = user.to_lowercase();

        let mut best: Option<(&str, u32)> = None;
        for category in self.rubric.categories() {
            let mut hits = 0u32;
            for pattern in &category.patterns {
                let needle = pattern.trim_matches('*').to_lowercase();
                if !needle.is_empty() && haystack.contains(&needle) {
                    hits += 1;
                }
            }
            for keyword in &category.keywords {
                let needle = keyword.to_lowercase();
                if !needle.is_empty() && haystack.contains(&needle) {
                    hits += 1;
                }
            }
            if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
                best = Some((category.name.as_str(), hits));
            }
        }

        let (category, confidence) = match best {
            Some((name, hits)) => (name, (60 + 10 * hits).min(95)),
            None => (UNCLASSIFIED, 0),
        };

        Ok(serde_json::json!({
            "category": category,
            "confidence": confidence,
        })
        .to_string())
    }
}

/// Create the appropriate [`LlmClient`] based on configuration.
///
/// # Errors
///
/// Returns an error for unknown provider names or if the OpenAI client
/// cannot be initialized (missing model or API key).
pub fn create_client(config: &LlmConfig, rubric: &Rubric) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledClient)),
        "openai" => Ok(Arc::new(OpenAiClient::new(config)?)),
        "pattern" => Ok(Arc::new(PatternClient::new(rubric.clone()))),
        other => Err(Error::Llm(format!("unknown llm provider: {other}"))),
    }
}
