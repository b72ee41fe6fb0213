//! Index error types.
//!
//! This module defines the unified error type for all index operations, and
//! the single place where backend responses are classified into it. Callers
//! only ever see the taxonomy below, never backend-specific error shapes.

use thiserror::Error;

/// Unified errors from index operations.
///
/// Used by the `IndexClient` trait and the schema manager. Variants split into
/// transient failures that are worth redelivering and permanent ones that will
/// fail the same way on every attempt.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    /// Failed to build a client for the backend (bad URL, TLS setup, ...).
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Backend unreachable, overloaded, or the request timed out.
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    /// Backend refused the request (mapping conflict, malformed document, ...).
    #[error("Index rejected request: {0}")]
    Rejected(String),

    /// Failed to serialize a document for the backend.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Anything the backend returned that fits none of the above.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl IndexError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create an unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a rejected error.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create an unknown error.
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Unknown errors count as retryable: redelivery is safe because every
    /// index operation is idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_) | Self::Unavailable(_) | Self::Unknown(_)
        )
    }

    /// Classify a non-success HTTP response from the backend.
    ///
    /// # Arguments
    ///
    /// * `operation` - Name of the operation, used in the message
    /// * `status` - HTTP status code
    /// * `body` - Response body, included verbatim in the message
    ///
    /// 409 is a version conflict that outlived `retry_on_conflict`; another
    /// writer holds the document, so the request is worth repeating.
    pub fn from_status(operation: &str, status: u16, body: &str) -> Self {
        let msg = format!("{} failed with status {}: {}", operation, status, body);
        match status {
            408 | 409 | 429 | 500..=599 => Self::Unavailable(msg),
            400..=499 => Self::Rejected(msg),
            _ => Self::Unknown(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses_are_unavailable() {
        for status in [408, 429, 500, 502, 503, 504] {
            let err = IndexError::from_status("Update", status, "busy");
            assert!(
                matches!(err, IndexError::Unavailable(_)),
                "status {} should be unavailable",
                status
            );
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_version_conflict_is_retryable() {
        let err = IndexError::from_status(
            "Update",
            409,
            r#"{"error":{"type":"version_conflict_engine_exception"}}"#,
        );
        assert!(matches!(err, IndexError::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_errors_are_rejected() {
        for status in [400, 403, 404, 413] {
            let err = IndexError::from_status("Update", status, "mapper_parsing_exception");
            assert!(
                matches!(err, IndexError::Rejected(_)),
                "status {} should be rejected",
                status
            );
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_other_statuses_are_unknown() {
        let err = IndexError::from_status("Delete", 302, "");
        assert!(matches!(err, IndexError::Unknown(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_message_includes_operation_and_body() {
        let err = IndexError::from_status("Update", 400, "strict_dynamic_mapping_exception");
        assert_eq!(
            err.to_string(),
            "Index rejected request: Update failed with status 400: strict_dynamic_mapping_exception"
        );
    }

    #[test]
    fn test_serialization_is_permanent() {
        assert!(!IndexError::serialization("bad").is_retryable());
    }
}
