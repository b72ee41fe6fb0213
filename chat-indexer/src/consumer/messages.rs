//! Message types for the consumer.
//!
//! Defines the messages exchanged between the consumer and the orchestrator.

use chat_indexer_shared::ChangeEvent;

/// Position of one Kafka message: topic, partition and offset.
pub type MessageOffset = (String, i32, i64);

/// Messages that flow through the ingest.
#[derive(Debug)]
pub enum StreamMessage {
    /// A batch of change events with the offsets of the messages they came from.
    Events {
        events: Vec<ChangeEvent>,
        offsets: Vec<MessageOffset>,
    },
    /// Outcome of a batch. `success: false` asks the consumer to redeliver it.
    Acknowledgment {
        offsets: Vec<MessageOffset>,
        success: bool,
        error: Option<String>,
    },
    /// Stream has ended.
    End,
    /// An error occurred.
    Error(String),
}
