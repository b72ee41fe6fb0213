//! Index client trait definition.
//!
//! This module defines the abstract interface for index maintenance,
//! allowing for different backend implementations (OpenSearch, in-memory, etc.).

use async_trait::async_trait;
use serde_json::Value;

use chat_indexer_shared::{MessageDocument, MessagePatch};

use crate::errors::IndexError;

/// Abstracts the underlying search backend.
///
/// Implementations are constructed once at startup and shared as
/// `Arc<dyn IndexClient>` with the batch processor and the schema manager, so
/// tests can swap in a fake backend.
///
/// Document operations target the index the client was configured with. Every
/// operation is idempotent: the upstream feed redelivers, so applying the same
/// call twice must leave the index in the same state as applying it once.
///
/// # Revisions
///
/// Documents and patches carry a `revision` (epoch milliseconds of the change
/// they reflect). Implementations use it so that a create and an edit of the
/// same message converge on the same document whichever one arrives first.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Check whether an index exists.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` / `Ok(false)` - Whether the index exists
    /// * `Err(IndexError)` - If the check itself failed
    async fn index_exists(&self, name: &str) -> Result<bool, IndexError>;

    /// Create an index with the given settings and mappings unless it exists.
    ///
    /// An index that already exists (including one created concurrently by
    /// another instance) is success, not an error.
    async fn ensure_index(&self, name: &str, mapping: &Value) -> Result<(), IndexError>;

    /// Write a full document, creating it if absent and replacing it otherwise.
    ///
    /// When the stored document has a newer revision, its fields are kept and
    /// only fields it is missing are filled in from `document`.
    async fn upsert_document(
        &self,
        id: &str,
        document: &MessageDocument,
    ) -> Result<(), IndexError>;

    /// Merge a partial document, creating it from the patch if absent.
    ///
    /// The merge is skipped when the stored document has a newer revision.
    async fn merge_document(&self, id: &str, patch: &MessagePatch) -> Result<(), IndexError>;

    /// Delete a document.
    ///
    /// If the document doesn't exist, the operation is considered successful.
    async fn delete_document(&self, id: &str) -> Result<(), IndexError>;
}
