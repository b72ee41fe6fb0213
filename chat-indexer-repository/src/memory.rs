//! In-memory index client.
//!
//! Keeps documents in a map guarded by a lock and applies the same
//! revision rules as the OpenSearch scripts. Used for local runs without a
//! search cluster and as the backend of the pipeline tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use chat_indexer_shared::{MessageDocument, MessagePatch};

use crate::errors::IndexError;
use crate::interfaces::IndexClient;
use crate::merge::{self, Source};

/// Index client backed by process memory.
#[derive(Default)]
pub struct InMemoryIndexClient {
    indices: RwLock<HashMap<String, Value>>,
    documents: RwLock<HashMap<String, Source>>,
}

fn poisoned() -> IndexError {
    IndexError::unknown("in-memory index lock poisoned")
}

impl InMemoryIndexClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored source of a document, if present.
    pub fn document(&self, id: &str) -> Option<Source> {
        self.documents.read().ok()?.get(id).cloned()
    }

    /// Number of stored documents.
    pub fn document_count(&self) -> usize {
        self.documents.read().map(|docs| docs.len()).unwrap_or(0)
    }

    /// Mapping an index was created with, if it exists.
    pub fn index_mapping(&self, name: &str) -> Option<Value> {
        self.indices.read().ok()?.get(name).cloned()
    }
}

#[async_trait]
impl IndexClient for InMemoryIndexClient {
    async fn index_exists(&self, name: &str) -> Result<bool, IndexError> {
        Ok(self.indices.read().map_err(|_| poisoned())?.contains_key(name))
    }

    async fn ensure_index(&self, name: &str, mapping: &Value) -> Result<(), IndexError> {
        let mut indices = self.indices.write().map_err(|_| poisoned())?;
        indices
            .entry(name.to_string())
            .or_insert_with(|| mapping.clone());
        Ok(())
    }

    async fn upsert_document(
        &self,
        id: &str,
        document: &MessageDocument,
    ) -> Result<(), IndexError> {
        let incoming = merge::document_source(document)?;
        let mut documents = self.documents.write().map_err(|_| poisoned())?;
        let next = merge::apply_upsert(documents.get(id), &incoming);
        documents.insert(id.to_string(), next);
        debug!(doc_id = %id, "Document upserted in memory");
        Ok(())
    }

    async fn merge_document(&self, id: &str, patch: &MessagePatch) -> Result<(), IndexError> {
        let patch = merge::patch_source(id, patch)?;
        let mut documents = self.documents.write().map_err(|_| poisoned())?;
        match merge::apply_merge(documents.get(id), &patch) {
            Some(next) => {
                documents.insert(id.to_string(), next);
                debug!(doc_id = %id, "Document merged in memory");
            }
            None => debug!(doc_id = %id, "Stale merge ignored"),
        }
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<(), IndexError> {
        self.documents
            .write()
            .map_err(|_| poisoned())?
            .remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(id: &str, content: &str, revision: i64) -> MessageDocument {
        MessageDocument {
            message_id: id.to_string(),
            channel_id: "chan-1".to_string(),
            user_id: "user-1".to_string(),
            content: content.to_string(),
            message_type: "text".to_string(),
            created_at: "2024-06-10T06:13:20.000Z".to_string(),
            edited_at: None,
            parent_message_id: None,
            attachments: vec![],
            content_length: content.chars().count(),
            token_count: content.split_whitespace().count(),
            has_attachments: false,
            has_reply: false,
            revision,
        }
    }

    #[tokio::test]
    async fn test_upsert_twice_stores_one_document() {
        let client = InMemoryIndexClient::new();
        let doc = document("msg-1", "hello world", 1);

        client.upsert_document("msg-1", &doc).await.unwrap();
        let first = client.document("msg-1").unwrap();
        client.upsert_document("msg-1", &doc).await.unwrap();

        assert_eq!(client.document_count(), 1);
        assert_eq!(client.document("msg-1").unwrap(), first);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let client = InMemoryIndexClient::new();
        assert!(client.delete_document("nope").await.is_ok());
        assert!(client.delete_document("nope").await.is_ok());
        assert_eq!(client.document_count(), 0);
    }

    #[tokio::test]
    async fn test_merge_then_upsert_keeps_newer_content() {
        let client = InMemoryIndexClient::new();
        let patch = MessagePatch {
            content: Some("edited".to_string()),
            content_length: Some(6),
            token_count: Some(1),
            revision: Some(5),
            ..Default::default()
        };

        client.merge_document("msg-1", &patch).await.unwrap();
        client
            .upsert_document("msg-1", &document("msg-1", "original text", 1))
            .await
            .unwrap();

        let stored = client.document("msg-1").unwrap();
        assert_eq!(stored["content"], "edited");
        assert_eq!(stored["content_length"], 6);
        assert_eq!(stored["user_id"], "user-1");
        assert_eq!(stored["revision"], 5);
    }

    #[tokio::test]
    async fn test_ensure_index_is_idempotent() {
        let client = InMemoryIndexClient::new();
        let first = json!({"mappings": {"properties": {}}});
        let second = json!({"mappings": {"dynamic": "strict"}});

        assert!(!client.index_exists("idx").await.unwrap());
        client.ensure_index("idx", &first).await.unwrap();
        client.ensure_index("idx", &second).await.unwrap();

        assert!(client.index_exists("idx").await.unwrap());
        assert_eq!(client.index_mapping("idx"), Some(first));
    }
}
