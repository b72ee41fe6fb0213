//! Kafka consumer implementation for the chat indexer.
//!
//! Consumes change events from a Kafka topic, batches them and forwards them
//! to the orchestrator. Offsets are committed only when the orchestrator
//! acknowledges a batch; a negative acknowledgment rewinds the partitions so
//! the broker delivers the batch again.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer as _, StreamConsumer},
    message::{BorrowedMessage, Message as _},
    Offset, TopicPartitionList,
};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, warn};

use chat_indexer_shared::ChangeEvent;

use crate::consumer::messages::{MessageOffset, StreamMessage};
use crate::errors::IngestError;
use crate::orchestrator::Consumer;

/// Default topic carrying message change events.
pub const DEFAULT_TOPIC: &str = "chat.messages.changes";

/// Default batch size for Kafka message batching.
const DEFAULT_BATCH_SIZE: usize = 50;

/// Default batch timeout in milliseconds.
const DEFAULT_BATCH_TIMEOUT_MS: u64 = 1000;

/// Timeout for rewinding a partition after a negative acknowledgment.
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka consumer settings.
#[derive(Debug, Clone)]
pub struct KafkaConsumerConfig {
    /// Kafka broker addresses (comma-separated).
    pub brokers: String,
    /// Consumer group ID.
    pub group_id: String,
    /// Topic to subscribe to.
    pub topic: String,
    /// Number of messages to batch before sending.
    pub batch_size: usize,
    /// Maximum time to wait before flushing a partial batch.
    pub batch_timeout: Duration,
}

impl KafkaConsumerConfig {
    /// Settings with the default topic and batching.
    pub fn new(brokers: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: group_id.into(),
            topic: DEFAULT_TOPIC.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: Duration::from_millis(DEFAULT_BATCH_TIMEOUT_MS),
        }
    }
}

/// A payload holds one change event or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum ChangePayload {
    Batch(Vec<serde_json::Value>),
    Single(ChangeEvent),
}

/// Decode a Kafka payload into change events.
///
/// Array elements are decoded one by one; a malformed element is logged and
/// dropped without affecting its neighbours.
pub fn parse_payload(payload: &[u8]) -> Result<Vec<ChangeEvent>, IngestError> {
    let parsed: ChangePayload = serde_json::from_slice(payload)
        .map_err(|e| IngestError::parse(format!("Failed to decode change event payload: {}", e)))?;

    Ok(match parsed {
        ChangePayload::Batch(elements) => elements
            .into_iter()
            .enumerate()
            .filter_map(|(position, element)| {
                serde_json::from_value::<ChangeEvent>(element)
                    .map_err(|e| {
                        warn!(position, error = %e, "Skipping malformed change event in payload");
                    })
                    .ok()
            })
            .collect(),
        ChangePayload::Single(event) => vec![event],
    })
}

/// Lowest and highest offset per partition.
fn partition_bounds(offsets: &[MessageOffset]) -> BTreeMap<(String, i32), (i64, i64)> {
    let mut bounds: BTreeMap<(String, i32), (i64, i64)> = BTreeMap::new();
    for (topic, partition, offset) in offsets {
        bounds
            .entry((topic.clone(), *partition))
            .and_modify(|(low, high)| {
                *low = (*low).min(*offset);
                *high = (*high).max(*offset);
            })
            .or_insert((*offset, *offset));
    }
    bounds
}

/// A consumed Kafka message waiting to be flushed.
///
/// Messages that yield no events (empty or unparsable payloads) are kept too,
/// so their offsets are committed together with the batch around them.
struct PendingMessage {
    events: Vec<ChangeEvent>,
    offset: MessageOffset,
}

/// Kafka consumer for change events.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    config: KafkaConsumerConfig,
}

impl KafkaConsumer {
    /// Create a new Kafka consumer.
    ///
    /// # Returns
    ///
    /// * `Ok(KafkaConsumer)` - A new consumer instance
    /// * `Err(IngestError)` - If consumer creation fails
    pub fn new(config: KafkaConsumerConfig) -> Result<Self, IngestError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| IngestError::kafka(e.to_string()))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            topic = %config.topic,
            batch_size = config.batch_size,
            batch_timeout_ms = config.batch_timeout.as_millis() as u64,
            "Created Kafka consumer with batching"
        );

        Ok(Self { consumer, config })
    }

    /// Flush a batch of pending messages to the channel.
    async fn flush_batch(
        &self,
        batch: &mut Vec<PendingMessage>,
        sender: &mpsc::Sender<StreamMessage>,
    ) -> Result<(), IngestError> {
        if batch.is_empty() {
            return Ok(());
        }

        let message_count = batch.len();
        let mut events = Vec::new();
        let mut offsets = Vec::with_capacity(message_count);
        for pending in batch.drain(..) {
            events.extend(pending.events);
            offsets.push(pending.offset);
        }

        info!(
            event_count = events.len(),
            message_count = message_count,
            "Sending batch of events to processor"
        );
        sender
            .send(StreamMessage::Events { events, offsets })
            .await
            .map_err(|e| IngestError::channel(e.to_string()))
    }

    /// Commit the highest offset of each partition in a batch.
    fn commit_offsets(&self, offsets: &[MessageOffset]) -> Result<(), IngestError> {
        if offsets.is_empty() {
            return Ok(());
        }

        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), (_, high)) in partition_bounds(offsets) {
            tpl.add_partition_offset(&topic, partition, Offset::Offset(high + 1))?;
        }

        self.consumer.commit(&tpl, CommitMode::Async)?;
        Ok(())
    }

    /// Rewind each partition of a batch to its first message.
    ///
    /// Returns the position each partition was rewound to.
    fn rewind(&self, offsets: &[MessageOffset]) -> HashMap<(String, i32), i64> {
        let mut rewound = HashMap::new();
        for ((topic, partition), (low, _)) in partition_bounds(offsets) {
            match self
                .consumer
                .seek(&topic, partition, Offset::Offset(low), SEEK_TIMEOUT)
            {
                Ok(()) => {
                    warn!(
                        topic = %topic,
                        partition = partition,
                        offset = low,
                        "Rewound partition for redelivery"
                    );
                    rewound.insert((topic, partition), low);
                }
                Err(e) => {
                    // Without the seek the batch is re-read only after a restart or rebalance.
                    error!(topic = %topic, partition = partition, error = %e, "Failed to rewind partition");
                }
            }
        }
        rewound
    }

    /// Handle an acknowledgment from the orchestrator.
    fn acknowledge(
        &self,
        offsets: Vec<MessageOffset>,
        success: bool,
        error: Option<String>,
        batch: &mut Vec<PendingMessage>,
        rewound: &mut HashMap<(String, i32), i64>,
    ) {
        if !success {
            error!(
                offset_count = offsets.len(),
                error = error.as_deref().unwrap_or("Unknown error"),
                "Not committing offsets due to processing failure"
            );
            let positions = self.rewind(&offsets);
            // Pending messages on a rewound partition will be read again.
            batch.retain(|pending| {
                let (topic, partition, _) = &pending.offset;
                !positions.contains_key(&(topic.clone(), *partition))
            });
            rewound.extend(positions);
            return;
        }

        // A batch read before a rewind must not move the committed offset past
        // the messages waiting to be redelivered.
        let mut committable = Vec::with_capacity(offsets.len());
        for ((topic, partition), (low, _)) in partition_bounds(&offsets) {
            let key = (topic, partition);
            match rewound.get(&key) {
                Some(position) if low > *position => {
                    debug!(
                        topic = %key.0,
                        partition = key.1,
                        "Skipping commit of a batch read before rewind"
                    );
                    continue;
                }
                Some(_) => {
                    rewound.remove(&key);
                }
                None => {}
            }
            committable.extend(
                offsets
                    .iter()
                    .filter(|(t, p, _)| *t == key.0 && *p == key.1)
                    .cloned(),
            );
        }

        match self.commit_offsets(&committable) {
            Ok(()) => debug!(
                offset_count = committable.len(),
                "Committed offsets after successful processing"
            ),
            Err(e) => error!(error = %e, "Failed to commit offsets after acknowledgment"),
        }
    }

    /// Decode one Kafka message. Failures are logged and yield no events.
    fn parse_message(&self, msg: &BorrowedMessage<'_>) -> Vec<ChangeEvent> {
        let payload = match msg.payload() {
            Some(p) if !p.is_empty() => p,
            _ => {
                debug!(
                    topic = %msg.topic(),
                    partition = msg.partition(),
                    offset = msg.offset(),
                    "Received message with empty payload"
                );
                return Vec::new();
            }
        };

        match parse_payload(payload) {
            Ok(events) => events,
            Err(e) => {
                error!(
                    topic = %msg.topic(),
                    partition = msg.partition(),
                    offset = msg.offset(),
                    error = %e,
                    "Failed to parse message, skipping it"
                );
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Consumer for KafkaConsumer {
    /// Subscribe to the configured topic.
    fn subscribe(&self) -> Result<(), IngestError> {
        self.consumer.subscribe(&[self.config.topic.as_str()])?;

        info!(topic = %self.config.topic, "Subscribed to Kafka topic");
        Ok(())
    }

    /// Start consuming messages and send them through the channel.
    ///
    /// Messages are batched before being sent to improve efficiency.
    #[instrument(skip(self, sender, ack_receiver, shutdown))]
    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        mut ack_receiver: mpsc::Receiver<StreamMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), IngestError> {
        use futures::StreamExt;

        let mut message_stream = self.consumer.stream();
        let mut batch: Vec<PendingMessage> = Vec::with_capacity(self.config.batch_size);
        let mut rewound: HashMap<(String, i32), i64> = HashMap::new();
        let mut flush_timer = tokio::time::interval(self.config.batch_timeout);
        flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Skip the first tick immediately
        flush_timer.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Consumer received shutdown signal");
                    // Pending messages are not committed and will be re-read on restart
                    let _ = sender.send(StreamMessage::End).await;
                    break;
                }
                ack_msg = ack_receiver.recv() => {
                    match ack_msg {
                        Some(StreamMessage::Acknowledgment { offsets, success, error }) => {
                            self.acknowledge(offsets, success, error, &mut batch, &mut rewound);
                        }
                        Some(StreamMessage::End) | None => {
                            info!("Acknowledgment channel closed");
                            break;
                        }
                        _ => {}
                    }
                }
                message = message_stream.next() => {
                    match message {
                        Some(Ok(msg)) => {
                            debug!(
                                topic = %msg.topic(),
                                partition = msg.partition(),
                                offset = msg.offset(),
                                "Received message from Kafka"
                            );
                            let events = self.parse_message(&msg);
                            batch.push(PendingMessage {
                                events,
                                offset: (msg.topic().to_string(), msg.partition(), msg.offset()),
                            });

                            if batch.len() >= self.config.batch_size {
                                self.flush_batch(&mut batch, &sender).await?;
                            }
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Kafka error");
                            let _ = sender.send(StreamMessage::Error(e.to_string())).await;
                        }
                        None => {
                            info!("Kafka stream ended");
                            self.flush_batch(&mut batch, &sender).await?;
                            let _ = sender.send(StreamMessage::End).await;
                            break;
                        }
                    }
                }
                _ = flush_timer.tick() => {
                    if !batch.is_empty() {
                        debug!(count = batch.len(), "Flushing batch due to timeout");
                        self.flush_batch(&mut batch, &sender).await?;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_indexer_shared::ChangeKind;

    #[test]
    fn test_default_config() {
        let config = KafkaConsumerConfig::new("localhost:9092", "chat-indexer");
        assert_eq!(config.topic, DEFAULT_TOPIC);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.batch_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_parse_single_event() {
        let payload = br#"{
            "eventId": "evt-1",
            "recordId": "msg-1",
            "kind": "INSERT",
            "after": {"content": {"S": "hello"}}
        }"#;

        let events = parse_payload(payload).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Created);
        assert_eq!(events[0].after_content(), Some("hello"));
    }

    #[test]
    fn test_parse_event_array() {
        let payload = br#"[
            {"recordId": "msg-1", "kind": "REMOVE"},
            {"recordId": "msg-2", "kind": "MODIFY",
             "before": {"content": {"S": "a"}}, "after": {"content": {"S": "b"}}}
        ]"#;

        let events = parse_payload(payload).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ChangeKind::Deleted);
        assert_eq!(events[1].before_content(), Some("a"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_payload(b"not json"),
            Err(IngestError::ParseError(_))
        ));
        assert!(matches!(
            parse_payload(br#"{"recordId": "msg-1", "kind": "TRUNCATE"}"#),
            Err(IngestError::ParseError(_))
        ));
    }

    #[test]
    fn test_malformed_array_element_does_not_drop_its_neighbours() {
        let payload = br#"[
            {"recordId": "msg-1", "kind": "INSERT", "after": {"content": {"S": "hi"}}},
            {"recordId": "msg-2", "kind": "TRUNCATE"},
            {"recordId": "msg-3", "kind": "INSERT", "after": {"content": {"X": "?"}}},
            {"recordId": "msg-4", "kind": "REMOVE"}
        ]"#;

        let events = parse_payload(payload).unwrap();

        let ids: Vec<_> = events.iter().filter_map(|e| e.record_id()).collect();
        assert_eq!(ids, vec!["msg-1", "msg-4"]);
        assert_eq!(events[1].kind, ChangeKind::Deleted);
    }

    #[test]
    fn test_partition_bounds() {
        let offsets = vec![
            ("t".to_string(), 0, 12),
            ("t".to_string(), 1, 4),
            ("t".to_string(), 0, 10),
            ("t".to_string(), 0, 11),
        ];

        let bounds = partition_bounds(&offsets);

        assert_eq!(bounds.len(), 2);
        assert_eq!(bounds[&("t".to_string(), 0)], (10, 12));
        assert_eq!(bounds[&("t".to_string(), 1)], (4, 4));
    }
}
