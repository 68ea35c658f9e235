//! Run reports.
//!
//! [`generate`] is a pure aggregation over a batch outcome; rendering to
//! markdown or JSON happens separately so the same [`Report`] feeds the
//! CLI, the tool surface, and tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::models::{
    BatchResult, ClassificationResult, Report, Tier, TierCounts, ValidationReport,
};

/// Aggregate a batch outcome (and an optional validation pass) into a
/// [`Report`]. Deterministic for a given input; input order never changes
/// the counts.
pub fn generate(
    batch: &BatchResult,
    validation: Option<&ValidationReport>,
    now: DateTime<Utc>,
) -> Report {
    let mut per_category_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut tiers = TierCounts::default();

    for result in &batch.results {
        *per_category_counts.entry(result.category.clone()).or_insert(0) += 1;
        match result.tier {
            Tier::High => tiers.high += 1,
            Tier::Medium => tiers.medium += 1,
            Tier::Low => tiers.low += 1,
        }
    }

    Report {
        generated_at: now,
        total_documents: batch.total_processed(),
        per_category_counts,
        tier_distribution: tiers,
        failure_count: batch.failures.len() as u64,
        validation_accuracy: validation.and_then(|v| v.accuracy),
    }
}

/// Collapse cache-read results to one row per document, keeping the most
/// recently classified entry. The cache is fingerprint-keyed, so an
/// edited document can briefly hold two live entries.
pub fn latest_per_document(results: Vec<ClassificationResult>) -> Vec<ClassificationResult> {
    let mut latest: BTreeMap<String, ClassificationResult> = BTreeMap::new();
    for result in results {
        match latest.get(&result.document_id) {
            Some(existing) if existing.classified_at >= result.classified_at => {}
            _ => {
                latest.insert(result.document_id.clone(), result);
            }
        }
    }
    latest.into_values().collect()
}

/// Load the stored classification state the `report` and `validate`
/// surfaces run over: every non-expired cache entry, one per document.
pub async fn stored_results(config: &Config) -> crate::error::Result<Vec<ClassificationResult>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = cache::create_cache(&config.cache, clock).await?;
    let results = store.all_results().await?;
    Ok(latest_per_document(results))
}

/// Render a report as markdown, optionally with a per-document table.
pub fn render_markdown(report: &Report, details: Option<&[ClassificationResult]>) -> String {
    let mut out = String::new();
    out.push_str("# Document Classification Report\n\n");
    out.push_str(&format!(
        "Generated: {}\n\n",
        report.generated_at.format("%Y-%m-%dT%H:%M:%SZ")
    ));

    let classified = report.total_documents - report.failure_count;
    out.push_str("## Summary\n\n");
    out.push_str(&format!("- Total documents: {}\n", report.total_documents));
    out.push_str(&format!("- Classified: {}\n", classified));
    out.push_str(&format!("- Failures: {}\n", report.failure_count));
    if let Some(accuracy) = report.validation_accuracy {
        out.push_str(&format!("- Validation accuracy: {:.1}%\n", accuracy * 100.0));
    }
    out.push('\n');

    out.push_str("## Categories\n\n");
    if report.per_category_counts.is_empty() {
        out.push_str("No documents were classified.\n\n");
    } else {
        out.push_str("| Category | Count | Share |\n");
        out.push_str("|----------|-------|-------|\n");
        for (category, count) in &report.per_category_counts {
            let share = if classified == 0 {
                0.0
            } else {
                *count as f64 / classified as f64 * 100.0
            };
            out.push_str(&format!("| {category} | {count} | {share:.1}% |\n"));
        }
        out.push('\n');
    }

    out.push_str("## Confidence Tiers\n\n");
    out.push_str("| Tier | Count |\n");
    out.push_str("|------|-------|\n");
    out.push_str(&format!("| HIGH | {} |\n", report.tier_distribution.high));
    out.push_str(&format!("| MEDIUM | {} |\n", report.tier_distribution.medium));
    out.push_str(&format!("| LOW | {} |\n", report.tier_distribution.low));
    out.push('\n');

    if let Some(rows) = details {
        out.push_str("## Documents\n\n");
        out.push_str("| Document | Category | Confidence | Tier | Source |\n");
        out.push_str("|----------|----------|------------|------|--------|\n");
        for r in rows {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                r.document_id,
                r.category,
                r.confidence_score,
                r.tier,
                match r.source {
                    crate::models::ResultSource::CacheHit => "cache",
                    crate::models::ResultSource::Fresh => "fresh",
                }
            ));
        }
        out.push('\n');
    }

    out
}
