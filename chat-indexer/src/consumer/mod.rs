//! Consumer module for the chat indexer.
//!
//! Provides Kafka consumer functionality for receiving change events.

mod kafka_consumer;
mod messages;

pub use kafka_consumer::{parse_payload, KafkaConsumer, KafkaConsumerConfig};
pub use messages::{MessageOffset, StreamMessage};
