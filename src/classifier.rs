//! Rubric classification of single documents.
//!
//! [`Classifier::classify`] is the cache-then-LLM path: fingerprint the
//! document, serve a non-expired cached result as a hit, otherwise prompt
//! the model, parse its answer strictly, derive the confidence tier, and
//! write the fresh result through to the cache.
//!
//! Model output is untrusted. [`parse_response`] extracts the outermost
//! JSON object from the raw text (models like to wrap answers in prose),
//! then validates the category against the rubric and the confidence
//! against the 0-100 range. Anything else fails that document, never the
//! run.
//!
//! Concurrent requests for the same fingerprint collapse to a single LLM
//! call: the first requester computes while the rest wait on a
//! per-fingerprint lock and re-read the cache. If the winning call fails,
//! the next waiter retries; calls for one fingerprint are never in flight
//! twice.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::cache::CacheStore;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::fingerprint::fingerprint;
use crate::llm::LlmClient;
use crate::models::{ClassificationResult, ConfidenceThresholds, Document, ResultSource, Tier};
use crate::rubric::Rubric;

/// Characters of content snippet included in the prompt.
pub const PROMPT_SNIPPET_LIMIT: usize = 4000;

/// Model verdict after strict parsing, before tiering.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub category: String,
    pub confidence: u8,
}

/// Build the (system, user) prompt pair for one document.
///
/// The system message carries the instructions and the rubric; the user
/// message carries only the document identity and snippet, truncated to
/// [`PROMPT_SNIPPET_LIMIT`] characters.
pub fn build_prompt(rubric: &Rubric, doc: &Document) -> (String, String) {
    let mut categories = String::new();
    for cat in rubric.categories() {
        categories.push_str("- ");
        categories.push_str(&cat.name);
        categories.push_str(": ");
        categories.push_str(&cat.description);
        categories.push('\n');
        if !cat.patterns.is_empty() {
            categories.push_str(&format!("  filename patterns: {}\n", cat.patterns.join(", ")));
        }
        if !cat.keywords.is_empty() {
            categories.push_str(&format!("  keywords: {}\n", cat.keywords.join(", ")));
        }
    }

    let system = format!(
        "You are a document classification assistant. Assign the document to \
         exactly one category from the rubric below, or \"unclassified\" if \
         none fits.\n\nRubric categories:\n{categories}\n\
         Respond with a single JSON object of the form \
         {{\"category\": \"<name>\", \"confidence\": <0-100>}} and no other text."
    );

    let snippet: String = doc.content_snippet.chars().take(PROMPT_SNIPPET_LIMIT).collect();
    let user = format!(
        "Document name: {}\nMIME type: {}\nContent:\n{}",
        doc.name, doc.mime_type, snippet
    );

    (system, user)
}

/// Strictly parse a raw model response into a [`Verdict`].
///
/// Accepts the outermost `{...}` span of the text, requires a string
/// `category` that names a rubric category (or the `unclassified`
/// sentinel) and a numeric `confidence` in `[0, 100]`. Returns the
/// rejection reason on failure.
pub fn parse_response(raw: &str, rubric: &Rubric) -> std::result::Result<Verdict, String> {
    let start = raw
        .find('{')
        .ok_or_else(|| "no JSON object in response".to_string())?;
    let end = raw
        .rfind('}')
        .filter(|&end| end >= start)
        .ok_or_else(|| "no JSON object in response".to_string())?;
    let body = &raw[start..=end];

    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| format!("response is not valid JSON: {e}"))?;

    let category = json
        .get("category")
        .and_then(|c| c.as_str())
        .ok_or_else(|| "missing or non-string 'category'".to_string())?;

    let confidence = json
        .get("confidence")
        .and_then(|c| c.as_f64())
        .ok_or_else(|| "missing or non-numeric 'confidence'".to_string())?;

    if !(0.0..=100.0).contains(&confidence) {
        return Err(format!("confidence {confidence} outside [0, 100]"));
    }

    if !rubric.is_valid_category(category) {
        return Err(format!("category '{category}' is not in the rubric"));
    }

    Ok(Verdict {
        category: category.to_string(),
        confidence: confidence.round() as u8,
    })
}

/// Cache-aware rubric classifier for single documents.
pub struct Classifier {
    rubric: Rubric,
    llm: Arc<dyn LlmClient>,
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    thresholds: ConfidenceThresholds,
    cache_ttl_days: u32,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Classifier {
    pub fn new(
        rubric: Rubric,
        llm: Arc<dyn LlmClient>,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        thresholds: ConfidenceThresholds,
        cache_ttl_days: u32,
    ) -> Self {
        Self {
            rubric,
            llm,
            cache,
            clock,
            thresholds,
            cache_ttl_days,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// Classify one document, serving from the cache when possible.
    pub async fn classify(&self, doc: &Document) -> Result<ClassificationResult> {
        let fp = fingerprint(doc);

        if let Some(hit) = self.cache_get(&fp).await {
            tracing::debug!(document_id = %doc.id, "cache hit");
            return Ok(hit);
        }

        // Serialize same-fingerprint misses so concurrent requests cost
        // one LLM call.
        let lock = {
            let mut map = self.inflight.lock().await;
            Arc::clone(
                map.entry(fp.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _guard = lock.lock().await;

        // The winner may have filled the cache while we waited.
        let outcome = match self.cache_get(&fp).await {
            Some(hit) => {
                tracing::debug!(document_id = %doc.id, "cache hit after wait");
                Ok(hit)
            }
            None => self.classify_fresh(doc, &fp).await,
        };

        // Every exit clears the entry: a requester that raced past the
        // winner's cleanup inserted a fresh one above.
        self.inflight.lock().await.remove(&fp);

        outcome
    }

    async fn classify_fresh(&self, doc: &Document, fp: &str) -> Result<ClassificationResult> {
        let (system, user) = build_prompt(&self.rubric, doc);

        let raw = self
            .llm
            .complete(&system, &user)
            .await
            .map_err(|e| Error::Classification {
                document_id: doc.id.clone(),
                reason: e.to_string(),
            })?;

        let verdict = parse_response(&raw, &self.rubric).map_err(|reason| {
            tracing::debug!(document_id = %doc.id, raw = %raw, "unusable model response");
            Error::Classification {
                document_id: doc.id.clone(),
                reason,
            }
        })?;

        let result = ClassificationResult {
            document_id: doc.id.clone(),
            fingerprint: fp.to_string(),
            category: verdict.category,
            confidence_score: verdict.confidence,
            tier: Tier::from_score(verdict.confidence, &self.thresholds),
            classified_at: self.clock.now(),
            source: ResultSource::Fresh,
        };

        self.cache_put(&result).await;
        tracing::debug!(
            document_id = %doc.id,
            category = %result.category,
            confidence = result.confidence_score,
            "classified"
        );

        Ok(result)
    }

    /// Cache read with degradation: a failing backend logs a warning and
    /// behaves like a miss.
    async fn cache_get(&self, fp: &str) -> Option<ClassificationResult> {
        match self.cache.get(fp).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, "cache read failed, continuing without cache");
                None
            }
        }
    }

    /// Cache write with degradation: a failing backend loses the entry
    /// but never the result.
    async fn cache_put(&self, result: &ClassificationResult) {
        if let Err(e) = self.cache.put(result, self.cache_ttl_days).await {
            tracing::warn!(error = %e, document_id = %result.document_id, "cache write failed");
        }
    }
}
