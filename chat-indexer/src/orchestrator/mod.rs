//! Orchestrator module for the chat indexer.
//!
//! Coordinates the consumer and the batch processor, and decides how each
//! batch is acknowledged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, instrument, warn};

use chat_indexer_shared::ChangeEvent;

use crate::batch::{BatchProcessor, BatchResult};
use crate::consumer::StreamMessage;
use crate::errors::IngestError;

/// Source of change event batches.
///
/// Implemented by the Kafka consumer; tests provide their own.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Subscribe to the event source.
    fn subscribe(&self) -> Result<(), IngestError>;

    /// Deliver batches on `sender` until the source ends or `shutdown` fires,
    /// handling acknowledgments received on `ack_receiver`.
    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        ack_receiver: mpsc::Receiver<StreamMessage>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), IngestError>;
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Size of the message channel buffer.
    pub channel_buffer_size: usize,
    /// Extra attempts for records whose failure is retryable.
    pub max_redeliveries: u32,
    /// Wait before the first redelivery; attempt `n` waits `n` times as long.
    pub redelivery_backoff: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
            max_redeliveries: 3,
            redelivery_backoff: Duration::from_millis(500),
        }
    }
}

/// Orchestrator that coordinates the ingest components.
///
/// The orchestrator:
/// - Manages the lifecycle of the consumer
/// - Runs each batch through the batch processor
/// - Redelivers records that failed with a retryable error
/// - Acknowledges or rejects batches
/// - Handles shutdown signals
pub struct Orchestrator {
    consumer: Arc<dyn Consumer>,
    processor: BatchProcessor,
    config: OrchestratorConfig,
    shutdown_tx: broadcast::Sender<()>,
    /// Total number of events processed since startup.
    total_events_processed: Arc<AtomicU64>,
    /// Total number of records applied to the index since startup.
    total_records_indexed: Arc<AtomicU64>,
    /// Total number of batches rejected back to the consumer since startup.
    total_batches_rejected: Arc<AtomicU64>,
}

impl Orchestrator {
    /// Create a new orchestrator with the given components.
    pub fn new(consumer: Arc<dyn Consumer>, processor: BatchProcessor) -> Self {
        Self::with_config(consumer, processor, OrchestratorConfig::default())
    }

    /// Create a new orchestrator with custom configuration.
    pub fn with_config(
        consumer: Arc<dyn Consumer>,
        processor: BatchProcessor,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            consumer,
            processor,
            config,
            shutdown_tx,
            total_events_processed: Arc::new(AtomicU64::new(0)),
            total_records_indexed: Arc::new(AtomicU64::new(0)),
            total_batches_rejected: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run the orchestrator.
    ///
    /// Starts the consumer and processes batches until the stream ends or a
    /// shutdown signal is received.
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Result<(), IngestError> {
        info!("Starting chat indexer orchestrator");

        self.consumer.subscribe()?;

        let (event_transmitter, mut event_receiver) =
            mpsc::channel::<StreamMessage>(self.config.channel_buffer_size);
        let (ack_transmitter, ack_receiver) =
            mpsc::channel::<StreamMessage>(self.config.channel_buffer_size);

        // Start consumer in background
        let consumer = Arc::clone(&self.consumer);
        let shutdown_rx = self.shutdown_tx.subscribe();

        let consumer_handle = tokio::spawn(async move {
            if let Err(e) = consumer
                .run(event_transmitter, ack_receiver, shutdown_rx)
                .await
            {
                error!(error = %e, "Consumer error");
            }
        });

        info!("Ready to process change events");

        // Set up progress logging timer (every 10 seconds)
        let total_events = Arc::clone(&self.total_events_processed);
        let total_records = Arc::clone(&self.total_records_indexed);
        let mut progress_timer = interval(Duration::from_secs(10));
        progress_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Track previous values for rate calculation
        let mut prev_events: u64 = 0;
        let mut prev_time = std::time::Instant::now();

        loop {
            tokio::select! {
                msg = event_receiver.recv() => {
                    match msg {
                        Some(StreamMessage::Events { events, offsets }) => {
                            debug!(
                                event_count = events.len(),
                                offset_count = offsets.len(),
                                "Received events from consumer"
                            );
                            let result = self.process_events(&events).await;
                            let ack = if result.has_retryable_failures() {
                                self.total_batches_rejected.fetch_add(1, Ordering::Relaxed);
                                error!(
                                    failed = result.failed.len(),
                                    "Retryable failures remain after redelivery. Sending NACK to broker"
                                );
                                StreamMessage::Acknowledgment {
                                    offsets,
                                    success: false,
                                    error: Some(format!(
                                        "{} records failed with retryable errors",
                                        result.retryable_record_ids().len()
                                    )),
                                }
                            } else {
                                StreamMessage::Acknowledgment {
                                    offsets,
                                    success: true,
                                    error: None,
                                }
                            };
                            if ack_transmitter.send(ack).await.is_err() {
                                warn!("Acknowledgment channel closed, consumer is gone");
                            }
                        }
                        Some(StreamMessage::Error(e)) => {
                            error!(error = %e, "Received error from consumer");
                        }
                        Some(StreamMessage::End) | None => {
                            info!("Consumer stream ended");
                            break;
                        }
                        Some(StreamMessage::Acknowledgment { .. }) => {
                            warn!("Received acknowledgment on event channel (should be on ack channel)");
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    let _ = self.shutdown_tx.send(());
                    break;
                }
                _ = progress_timer.tick() => {
                    let events = total_events.load(Ordering::Relaxed);
                    let records = total_records.load(Ordering::Relaxed);

                    let now = std::time::Instant::now();
                    let elapsed_secs = now.duration_since(prev_time).as_secs_f64();
                    let events_per_sec = if elapsed_secs > 0.0 {
                        (events.saturating_sub(prev_events) as f64) / elapsed_secs
                    } else {
                        0.0
                    };

                    info!(
                        events_processed = events,
                        records_indexed = records,
                        batches_rejected = self.total_batches_rejected.load(Ordering::Relaxed),
                        events_per_sec = format!("{:.2}", events_per_sec),
                        "Processing progress"
                    );

                    prev_events = events;
                    prev_time = now;
                }
            }
        }

        // Dropping the ack channel lets the consumer stop once it drains.
        drop(ack_transmitter);
        let _ = consumer_handle.await;

        info!(
            total_events_processed = self.total_events_processed.load(Ordering::Relaxed),
            total_records_indexed = self.total_records_indexed.load(Ordering::Relaxed),
            total_batches_rejected = self.total_batches_rejected.load(Ordering::Relaxed),
            "Orchestrator shutdown complete"
        );
        Ok(())
    }

    /// Process one delivered batch, redelivering the retryable subset.
    ///
    /// Each redelivery resubmits, in their original order, every event of the
    /// records that failed with a retryable error. Permanent failures are
    /// logged and kept in the result; they never trigger a redelivery.
    async fn process_events(&self, events: &[ChangeEvent]) -> BatchResult {
        self.total_events_processed
            .fetch_add(events.len() as u64, Ordering::Relaxed);

        let mut result = self.processor.process_batch(events).await;

        let mut attempt = 0;
        while result.has_retryable_failures() && attempt < self.config.max_redeliveries {
            attempt += 1;
            let retry_ids = result.retryable_record_ids();
            let subset: Vec<ChangeEvent> = events
                .iter()
                .filter(|event| {
                    event
                        .record_id()
                        .is_some_and(|id| retry_ids.contains(id))
                })
                .cloned()
                .collect();

            let backoff = self.config.redelivery_backoff * attempt;
            warn!(
                attempt = attempt,
                max_redeliveries = self.config.max_redeliveries,
                record_count = retry_ids.len(),
                backoff_ms = backoff.as_millis() as u64,
                "Redelivering records with retryable failures"
            );
            tokio::time::sleep(backoff).await;

            let retry = self.processor.process_batch(&subset).await;
            result.absorb_redelivery(retry);
        }

        for failure in result.failed.iter().filter(|f| !f.error.is_retryable()) {
            error!(
                record_id = %failure.record_id,
                error = %failure.error,
                "Dropping record after permanent failure"
            );
        }

        self.total_records_indexed
            .fetch_add(result.succeeded.len() as u64, Ordering::Relaxed);

        let report = result.report();
        match serde_json::to_string(&report) {
            Ok(report) => info!(report = %report, "Batch report"),
            Err(e) => warn!(error = %e, "Failed to serialize batch report"),
        }

        result
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
