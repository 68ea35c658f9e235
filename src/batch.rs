//! Batch classification runs.
//!
//! Splits discovered documents into consecutive batches of `batch_size`
//! and fans each batch out over a bounded worker pool of `concurrency`
//! tasks. One document's failure is recorded and never aborts the rest;
//! results are re-ordered to input order before they are returned.
//! Cancellation skips every document that has not started yet and keeps
//! the results already produced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache;
use crate::classifier::Classifier;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::discovery::{self, DriveQuery};
use crate::error::{Error, Result};
use crate::llm;
use crate::models::{BatchFailure, BatchResult, ClassificationResult, Document};
use crate::progress::{RunProgressEvent, RunProgressReporter};
use crate::rubric::Rubric;

/// Tunables for one batch run, taken from the `[processing]` config.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub concurrency: usize,
    /// Per-document deadline covering the whole classify path (cache,
    /// LLM retries included).
    pub timeout: Duration,
}

enum DocOutcome {
    Done(ClassificationResult),
    Failed(BatchFailure),
}

/// Classify `documents` in batches, preserving input order in the output.
pub async fn run(
    classifier: Arc<Classifier>,
    documents: Vec<Document>,
    options: &BatchOptions,
    cancel: &CancellationToken,
    progress: &dyn RunProgressReporter,
) -> BatchResult {
    let run_id = Uuid::new_v4().to_string();
    let total = documents.len() as u64;
    let completed = AtomicU64::new(0);

    let batch_size = options.batch_size.max(1);
    let concurrency = options.concurrency.max(1);

    let mut batches = Vec::new();
    let mut iter = documents.into_iter();
    loop {
        let chunk: Vec<Document> = iter.by_ref().take(batch_size).collect();
        if chunk.is_empty() {
            break;
        }
        batches.push(chunk);
    }

    let mut results = Vec::new();
    let mut failures = Vec::new();

    for (batch_index, batch) in batches.into_iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(run_id = %run_id, batch = batch_index, "cancelled, skipping remaining batches");
            break;
        }
        tracing::debug!(run_id = %run_id, batch = batch_index, size = batch.len(), "starting batch");

        let mut outcomes: Vec<(usize, Option<DocOutcome>)> =
            stream::iter(batch.into_iter().enumerate())
                .map(|(index, doc)| {
                    let classifier = Arc::clone(&classifier);
                    let cancel = cancel.clone();
                    let completed = &completed;
                    let timeout = options.timeout;
                    async move {
                        // Un-started documents are dropped on cancellation,
                        // not recorded as failures.
                        if cancel.is_cancelled() {
                            return (index, None);
                        }

                        let outcome =
                            match tokio::time::timeout(timeout, classifier.classify(&doc)).await {
                                Ok(Ok(result)) => DocOutcome::Done(result),
                                Ok(Err(e)) => {
                                    tracing::warn!(document_id = %doc.id, error = %e, "document failed");
                                    DocOutcome::Failed(BatchFailure {
                                        document_id: doc.id,
                                        error: e.to_string(),
                                    })
                                }
                                Err(_) => {
                                    let err = Error::Timeout {
                                        document_id: doc.id.clone(),
                                        secs: timeout.as_secs(),
                                    };
                                    tracing::warn!(document_id = %doc.id, "document timed out");
                                    DocOutcome::Failed(BatchFailure {
                                        document_id: doc.id,
                                        error: err.to_string(),
                                    })
                                }
                            };

                        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        progress.report(RunProgressEvent::Classifying { n: done, total });
                        (index, Some(outcome))
                    }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        // Workers finish out of order; restore input order.
        outcomes.sort_by_key(|(index, _)| *index);
        for (_, outcome) in outcomes {
            match outcome {
                Some(DocOutcome::Done(result)) => results.push(result),
                Some(DocOutcome::Failed(failure)) => failures.push(failure),
                None => {}
            }
        }
    }

    tracing::info!(
        run_id = %run_id,
        results = results.len(),
        failures = failures.len(),
        "batch run complete"
    );

    BatchResult {
        run_id,
        results,
        failures,
    }
}

/// Outcome of a full discover-then-classify pass.
#[derive(Debug)]
pub struct ClassificationRun {
    /// Documents the drive listing yielded after normalization.
    pub discovered: u64,
    /// Listing entries skipped as malformed.
    pub skipped: u64,
    pub batch: BatchResult,
}

/// Discover documents and classify them, wiring every component from the
/// loaded configuration. The CLI `classify` command and the
/// `classify_documents` tool both run through here.
pub async fn run_classification(
    config: &Config,
    query: &DriveQuery,
    batch_size: Option<usize>,
    cancel: &CancellationToken,
    progress: &dyn RunProgressReporter,
) -> Result<ClassificationRun> {
    let rubric = Rubric::load(&config.rubric_path)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = cache::create_cache(&config.cache, Arc::clone(&clock)).await?;
    let llm = llm::create_client(&config.llm, &rubric)?;
    let lister = discovery::create_lister(&config.drive)?;

    progress.report(RunProgressEvent::Discovering {
        drive: lister.name().to_string(),
    });
    let listing = discovery::discover(lister.as_ref(), query).await?;
    let discovered = listing.documents.len() as u64;

    let classifier = Arc::new(Classifier::new(
        rubric,
        llm,
        cache,
        clock,
        config.confidence_thresholds,
        config.processing.cache_duration_days,
    ));
    let options = BatchOptions {
        batch_size: batch_size.unwrap_or(config.processing.batch_size),
        concurrency: config.processing.concurrency,
        timeout: Duration::from_secs(config.processing.timeout_secs),
    };

    let batch = run(classifier, listing.documents, &options, cancel, progress).await;

    Ok(ClassificationRun {
        discovered,
        skipped: listing.skipped,
        batch,
    })
}
