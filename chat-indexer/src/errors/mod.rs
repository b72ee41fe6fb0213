//! Error types for the chat indexer.
//!
//! Two families live here: [`IngestError`] for the plumbing around a batch
//! (Kafka, channels, payload parsing), and the per-event errors
//! ([`ShapeError`], [`EventError`]) that are recorded against a single record
//! and never abort a batch.

use chat_indexer_repository::IndexError;
use thiserror::Error;

/// Errors that can occur in the ingest plumbing.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Kafka-related error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Error parsing or decoding data.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl IngestError {
    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a channel error.
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::ChannelError(msg.into())
    }
}

impl From<rdkafka::error::KafkaError> for IngestError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}

/// Errors raised while shaping a record image into an index document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// A mandatory field is absent. The event is skipped, not failed.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A field is present but malformed.
    #[error("Shaping error: {0}")]
    Shaping(String),
}

impl ShapeError {
    /// Create an invalid record error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Create a shaping error.
    pub fn shaping(msg: impl Into<String>) -> Self {
        Self::Shaping(msg.into())
    }
}

/// A failure attributed to one change event.
#[derive(Error, Debug, Clone)]
pub enum EventError {
    /// The record image has malformed fields.
    #[error("Shaping error: {0}")]
    Shaping(String),

    /// The index is temporarily unreachable or timed out.
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// The index permanently refused the document.
    #[error("Index rejected: {0}")]
    IndexRejected(String),

    /// Backend error that fits no other category.
    #[error("Uncategorized index error: {0}")]
    Uncategorized(String),
}

impl EventError {
    /// Whether redelivering the event may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::IndexUnavailable(_) | Self::Uncategorized(_))
    }
}

impl From<IndexError> for EventError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::ConnectionError(msg) | IndexError::Unavailable(msg) => {
                Self::IndexUnavailable(msg)
            }
            IndexError::Rejected(msg) => Self::IndexRejected(msg),
            IndexError::SerializationError(msg) => Self::Shaping(msg),
            IndexError::Unknown(msg) => Self::Uncategorized(msg),
        }
    }
}
