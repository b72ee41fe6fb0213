//! Batch processing.
//!
//! Runs each change event of a batch through the processor and the loader,
//! one at a time and in delivery order, and aggregates the outcome. Failures
//! are attributed to the event that caused them; a batch never fails as a
//! whole.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use chat_indexer_shared::ChangeEvent;

use crate::errors::EventError;
use crate::loader::SearchLoader;
use crate::processor::{EventPlan, EventProcessor};

/// A failure recorded against one record.
#[derive(Debug, Clone)]
pub struct RecordFailure {
    pub record_id: String,
    pub error: EventError,
}

/// Aggregate outcome of one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Events seen, including skipped and invalid ones.
    pub processed: usize,
    /// Records whose operations were applied.
    pub succeeded: BTreeSet<String>,
    /// Failures in the order they happened.
    pub failed: Vec<RecordFailure>,
    /// Well-formed events that required no index call.
    pub skipped: usize,
    /// Malformed events dropped without an index call.
    pub invalid: usize,
}

impl BatchResult {
    /// Whether any failure remains.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Ids of records whose failure may clear on redelivery.
    pub fn retryable_record_ids(&self) -> HashSet<&str> {
        self.failed
            .iter()
            .filter(|failure| failure.error.is_retryable())
            .map(|failure| failure.record_id.as_str())
            .collect()
    }

    /// Whether any failure may clear on redelivery.
    pub fn has_retryable_failures(&self) -> bool {
        self.failed.iter().any(|failure| failure.error.is_retryable())
    }

    /// Fold the result of redelivering this batch's retryable subset.
    ///
    /// Retryable failures are replaced by whatever the redelivery produced for
    /// the same records; permanent failures are kept as they were.
    pub fn absorb_redelivery(&mut self, retry: BatchResult) {
        self.failed.retain(|failure| !failure.error.is_retryable());
        for record_id in &retry.succeeded {
            self.succeeded.insert(record_id.clone());
        }
        self.failed.extend(retry.failed);
        self.reconcile();
    }

    /// A record with any failure in the batch is not reported as succeeded.
    fn reconcile(&mut self) {
        for failure in &self.failed {
            self.succeeded.remove(&failure.record_id);
        }
    }

    /// Serializable summary for the acknowledgment path and the logs.
    pub fn report(&self) -> BatchReport {
        BatchReport {
            processed: self.processed,
            succeeded: self.succeeded.len(),
            failed: self.failed.len(),
            skipped: self.skipped,
            invalid: self.invalid,
            failures: self
                .failed
                .iter()
                .map(|failure| FailureReport {
                    record_id: failure.record_id.clone(),
                    error_description: failure.error.to_string(),
                    retryable: failure.error.is_retryable(),
                })
                .collect(),
        }
    }
}

/// One failure in a [`BatchReport`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub record_id: String,
    pub error_description: String,
    pub retryable: bool,
}

/// Counts and failure reasons of a processed batch.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub failures: Vec<FailureReport>,
}

/// Applies batches of change events to the search index.
pub struct BatchProcessor {
    processor: EventProcessor,
    loader: SearchLoader,
}

impl BatchProcessor {
    /// Create a batch processor from its parts.
    pub fn new(processor: EventProcessor, loader: SearchLoader) -> Self {
        Self { processor, loader }
    }

    /// Process a batch sequentially, in delivery order.
    ///
    /// Never fails: every error is recorded against the record it belongs to
    /// and processing moves on to the next event.
    #[instrument(skip(self, events), fields(event_count = events.len()))]
    pub async fn process_batch(&self, events: &[ChangeEvent]) -> BatchResult {
        let mut result = BatchResult::default();

        for event in events {
            result.processed += 1;

            let record_id = event.record_id().unwrap_or_default().to_string();
            let outcome = match self.processor.process_event(event) {
                Ok(EventPlan::Apply(operation)) => self.loader.apply(&operation).await,
                Ok(EventPlan::Skip { reason }) => {
                    debug!(record_id = %record_id, reason = reason, "Event skipped");
                    result.skipped += 1;
                    continue;
                }
                Ok(EventPlan::Invalid { reason }) => {
                    debug!(
                        event_id = ?event.event_id,
                        reason = %reason,
                        "Invalid event dropped"
                    );
                    result.invalid += 1;
                    continue;
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    result.succeeded.insert(record_id);
                }
                Err(error) => {
                    warn!(
                        record_id = %record_id,
                        kind = %event.kind,
                        error = %error,
                        retryable = error.is_retryable(),
                        "Failed to apply change event"
                    );
                    result.failed.push(RecordFailure { record_id, error });
                }
            }
        }

        result.reconcile();

        info!(
            processed = result.processed,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            skipped = result.skipped,
            invalid = result.invalid,
            "Processed batch"
        );
        result
    }
}
