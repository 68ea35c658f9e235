//! Core data models used throughout the triage pipeline.
//!
//! These types represent the documents, classification results, and reports
//! that flow through discovery, classification, and validation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw entry produced by a drive listing before normalization.
///
/// Listings are untrusted: any field may be missing. Normalization decides
/// which entries become [`Document`]s and which are skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocumentEntry {
    pub id: Option<String>,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub modified_time: Option<DateTime<Utc>>,
    pub size_bytes: Option<u64>,
}

/// Normalized drive document, immutable once discovered within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub content_snippet: String,
    pub modified_time: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Confidence thresholds that map a 0-100 score onto a [`Tier`].
///
/// Invariant (enforced at config load): `high >= medium >= low`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub high: u8,
    pub medium: u8,
    pub low: u8,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        ConfidenceThresholds {
            high: 90,
            medium: 70,
            low: 0,
        }
    }
}

/// Confidence tier derived from a score and the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    /// Pure threshold decision: `score >= high` is High, `score >= medium`
    /// is Medium, anything else Low.
    pub fn from_score(score: u8, thresholds: &ConfidenceThresholds) -> Tier {
        if score >= thresholds.high {
            Tier::High
        } else if score >= thresholds.medium {
            Tier::Medium
        } else {
            Tier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::High => "HIGH",
            Tier::Medium => "MEDIUM",
            Tier::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a result came from the cache or a fresh LLM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultSource {
    CacheHit,
    Fresh,
}

/// Category name used when the model cannot place a document in any
/// rubric category.
pub const UNCLASSIFIED: &str = "unclassified";

/// Outcome of classifying a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub document_id: String,
    pub fingerprint: String,
    /// A rubric category name, or the `unclassified` sentinel.
    pub category: String,
    /// 0-100.
    pub confidence_score: u8,
    pub tier: Tier,
    pub classified_at: DateTime<Utc>,
    pub source: ResultSource,
}

/// A document that failed classification within a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub document_id: String,
    pub error: String,
}

/// Aggregate outcome of a batch run. `results` preserves discovery input
/// order; failed documents appear only in `failures`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub run_id: String,
    pub results: Vec<ClassificationResult>,
    pub failures: Vec<BatchFailure>,
}

impl BatchResult {
    pub fn total_processed(&self) -> u64 {
        (self.results.len() + self.failures.len()) as u64
    }
}

/// Outcome of a discovery pass over the drive listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverOutcome {
    pub documents: Vec<Document>,
    /// Listing entries counted but not discoverable (missing id, failed
    /// content fetch).
    pub skipped: u64,
}

/// One sampled comparison between a prediction and ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSample {
    pub document_id: String,
    pub predicted: String,
    pub actual: String,
    pub correct: bool,
}

/// Per-category validation tally, keyed by the ground-truth category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryAccuracy {
    pub correct: u64,
    pub total: u64,
}

impl CategoryAccuracy {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Result of validating sampled classifications against ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub samples: Vec<ValidationSample>,
    pub correct_count: u64,
    /// Absent when the eligible sample was empty. Never an error.
    pub accuracy: Option<f64>,
    /// Accuracy fraction per ground-truth category.
    pub per_category_accuracy: BTreeMap<String, f64>,
    /// Correct/total tallies behind `per_category_accuracy`.
    pub per_category_tallies: BTreeMap<String, CategoryAccuracy>,
    /// Tier distribution of the sampled results.
    pub tier_distribution: TierCounts,
    /// Predicted-category distribution of the sampled results.
    pub category_distribution: BTreeMap<String, u64>,
}

/// Per-tier result counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

/// Aggregated run report. Write-once: generated from results, never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub total_documents: u64,
    pub per_category_counts: BTreeMap<String, u64>,
    pub tier_distribution: TierCounts,
    pub failure_count: u64,
    pub validation_accuracy: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> ConfidenceThresholds {
        ConfidenceThresholds {
            high: 90,
            medium: 70,
            low: 0,
        }
    }

    #[test]
    fn tier_boundaries_are_inclusive() {
        let t = thresholds();
        assert_eq!(Tier::from_score(90, &t), Tier::High);
        assert_eq!(Tier::from_score(89, &t), Tier::Medium);
        assert_eq!(Tier::from_score(70, &t), Tier::Medium);
        assert_eq!(Tier::from_score(69, &t), Tier::Low);
    }

    #[test]
    fn tier_extremes() {
        let t = thresholds();
        assert_eq!(Tier::from_score(100, &t), Tier::High);
        assert_eq!(Tier::from_score(0, &t), Tier::Low);
    }

    #[test]
    fn tier_is_monotone_in_score() {
        let t = thresholds();
        let mut prev = Tier::from_score(0, &t);
        for score in 1..=100u8 {
            let cur = Tier::from_score(score, &t);
            // Ord derives High < Medium < Low, so rising scores never
            // move toward Low.
            assert!(cur <= prev, "tier regressed at score {score}");
            prev = cur;
        }
    }

    #[test]
    fn tier_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Tier::High).unwrap(), "\"HIGH\"");
        assert_eq!(
            serde_json::to_string(&ResultSource::CacheHit).unwrap(),
            "\"CACHE_HIT\""
        );
        assert_eq!(
            serde_json::to_string(&ResultSource::Fresh).unwrap(),
            "\"FRESH\""
        );
    }

    #[test]
    fn degenerate_thresholds_collapse_to_one_tier() {
        let t = ConfidenceThresholds {
            high: 0,
            medium: 0,
            low: 0,
        };
        assert_eq!(Tier::from_score(0, &t), Tier::High);
        assert_eq!(Tier::from_score(55, &t), Tier::High);
    }
}
