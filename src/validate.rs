//! Sampled validation against ground truth.
//!
//! Draws a uniform, without-replacement sample from the classified
//! documents that have a human-reviewed ground-truth label, then scores
//! prediction accuracy overall and per ground-truth category. The RNG is
//! seedable so audit runs are reproducible.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::models::{
    CategoryAccuracy, ClassificationResult, Tier, TierCounts, ValidationReport, ValidationSample,
};

/// Ground truth mapping: document id to the category a reviewer assigned.
pub type GroundTruth = BTreeMap<String, String>;

/// Load a ground-truth JSON file (`{"<document_id>": "<category>", ...}`).
pub fn load_ground_truth(path: &Path) -> Result<GroundTruth> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Validate a sample of `results` against `ground_truth`.
///
/// Only documents present in the ground truth are eligible; missing
/// labels shrink the sample silently. An empty sample yields
/// `accuracy: None`, never an error.
pub fn validate(
    results: &[ClassificationResult],
    ground_truth: &GroundTruth,
    sample_size: usize,
    seed: Option<u64>,
) -> ValidationReport {
    let eligible: Vec<&ClassificationResult> = results
        .iter()
        .filter(|r| ground_truth.contains_key(&r.document_id))
        .collect();

    let sampled = sample_without_replacement(eligible, sample_size, seed);

    let mut samples = Vec::with_capacity(sampled.len());
    let mut correct_count = 0u64;
    let mut per_category: BTreeMap<String, CategoryAccuracy> = BTreeMap::new();
    let mut tier_distribution = TierCounts::default();
    let mut category_distribution: BTreeMap<String, u64> = BTreeMap::new();

    for result in sampled {
        let actual = &ground_truth[&result.document_id];
        let correct = &result.category == actual;
        if correct {
            correct_count += 1;
        }

        let tally = per_category.entry(actual.clone()).or_default();
        tally.total += 1;
        if correct {
            tally.correct += 1;
        }

        match result.tier {
            Tier::High => tier_distribution.high += 1,
            Tier::Medium => tier_distribution.medium += 1,
            Tier::Low => tier_distribution.low += 1,
        }
        *category_distribution
            .entry(result.category.clone())
            .or_insert(0) += 1;

        samples.push(ValidationSample {
            document_id: result.document_id.clone(),
            predicted: result.category.clone(),
            actual: actual.clone(),
            correct,
        });
    }

    let accuracy = if samples.is_empty() {
        None
    } else {
        Some(correct_count as f64 / samples.len() as f64)
    };

    // The outward field is category -> fraction; the tallies ride along.
    let per_category_accuracy = per_category
        .iter()
        .map(|(category, tally)| (category.clone(), tally.accuracy()))
        .collect();

    tracing::debug!(
        sampled = samples.len(),
        correct = correct_count,
        "validation pass complete"
    );

    ValidationReport {
        samples,
        correct_count,
        accuracy,
        per_category_accuracy,
        per_category_tallies: per_category,
        tier_distribution,
        category_distribution,
    }
}

/// Uniform sample of `size` items via partial Fisher-Yates. A seeded rng
/// makes the draw reproducible.
fn sample_without_replacement<T>(mut pool: Vec<T>, size: usize, seed: Option<u64>) -> Vec<T> {
    if size >= pool.len() {
        return pool;
    }

    let mut rng = match seed {
        Some(seed) => fastrand::Rng::with_seed(seed),
        None => fastrand::Rng::new(),
    };

    let len = pool.len();
    for i in 0..size {
        let j = i + rng.usize(..len - i);
        pool.swap(i, j);
    }
    pool.truncate(size);
    pool
}
