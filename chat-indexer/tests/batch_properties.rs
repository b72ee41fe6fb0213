//! Convergence and isolation properties of batch processing.
//!
//! These tests run the real processor, loader and batch processor against the
//! in-memory index client, wrapped to count calls and inject failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use chat_indexer::batch::BatchProcessor;
use chat_indexer::errors::EventError;
use chat_indexer::loader::SearchLoader;
use chat_indexer::processor::EventProcessor;
use chat_indexer_repository::{IndexClient, IndexError, InMemoryIndexClient};
use chat_indexer_shared::{AttributeValue, ChangeEvent, FieldMap, MessageDocument, MessagePatch};

/// In-memory index client that counts calls and fails writes for chosen ids.
struct RecordingIndexClient {
    inner: InMemoryIndexClient,
    calls: Mutex<Vec<String>>,
    unavailable_ids: Vec<String>,
}

impl RecordingIndexClient {
    fn new() -> Self {
        Self {
            inner: InMemoryIndexClient::new(),
            calls: Mutex::new(Vec::new()),
            unavailable_ids: Vec::new(),
        }
    }

    fn unavailable_for(id: &str) -> Self {
        let mut client = Self::new();
        client.unavailable_ids.push(id.to_string());
        client
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, op: &str, id: &str) -> Result<(), IndexError> {
        self.calls.lock().unwrap().push(format!("{}:{}", op, id));
        if self.unavailable_ids.iter().any(|failing| failing == id) {
            return Err(IndexError::unavailable("503 Service Unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexClient for RecordingIndexClient {
    async fn index_exists(&self, name: &str) -> Result<bool, IndexError> {
        self.inner.index_exists(name).await
    }

    async fn ensure_index(&self, name: &str, mapping: &Value) -> Result<(), IndexError> {
        self.inner.ensure_index(name, mapping).await
    }

    async fn upsert_document(&self, id: &str, document: &MessageDocument) -> Result<(), IndexError> {
        self.record("upsert", id)?;
        self.inner.upsert_document(id, document).await
    }

    async fn merge_document(&self, id: &str, patch: &MessagePatch) -> Result<(), IndexError> {
        self.record("merge", id)?;
        self.inner.merge_document(id, patch).await
    }

    async fn delete_document(&self, id: &str) -> Result<(), IndexError> {
        self.record("delete", id)?;
        self.inner.delete_document(id).await
    }
}

fn batch_processor(client: Arc<RecordingIndexClient>) -> BatchProcessor {
    BatchProcessor::new(EventProcessor::new(), SearchLoader::new(client))
}

fn image(content: &str) -> FieldMap {
    let mut image: FieldMap = HashMap::new();
    image.insert("channelId".to_string(), AttributeValue::string("chan-1"));
    image.insert("userId".to_string(), AttributeValue::string("user-1"));
    image.insert("content".to_string(), AttributeValue::string(content));
    image.insert(
        "createdAt".to_string(),
        AttributeValue::number(1_718_000_000_000i64),
    );
    image
}

fn edited(content: &str) -> FieldMap {
    let mut image = image(content);
    image.insert(
        "editedAt".to_string(),
        AttributeValue::number(1_718_000_100_000i64),
    );
    image
}

#[tokio::test]
async fn test_created_event_is_idempotent() {
    let once = Arc::new(RecordingIndexClient::new());
    let twice = Arc::new(RecordingIndexClient::new());
    let event = ChangeEvent::created("msg-1", image("hello world"));

    batch_processor(once.clone())
        .process_batch(&[event.clone()])
        .await;
    let result = batch_processor(twice.clone())
        .process_batch(&[event.clone(), event])
        .await;

    assert_eq!(result.succeeded.len(), 1);
    assert_eq!(twice.inner.document_count(), 1);
    assert_eq!(
        twice.inner.document("msg-1"),
        once.inner.document("msg-1")
    );
}

#[tokio::test]
async fn test_update_and_create_converge_in_either_order() {
    let create = ChangeEvent::created("msg-1", image("hello world"));
    let update = ChangeEvent::updated("msg-1", image("hello world"), edited("hello there"));

    let in_order = Arc::new(RecordingIndexClient::new());
    batch_processor(in_order.clone())
        .process_batch(&[create.clone(), update.clone()])
        .await;

    // Update delivered in an earlier batch than its create.
    let reordered = Arc::new(RecordingIndexClient::new());
    let processor = batch_processor(reordered.clone());
    processor.process_batch(&[update]).await;
    processor.process_batch(&[create]).await;

    let expected = in_order.inner.document("msg-1").unwrap();
    assert_eq!(reordered.inner.document("msg-1").unwrap(), expected);
    assert_eq!(expected["content"], "hello there");
    assert_eq!(expected["token_count"], 2);
    assert_eq!(expected["user_id"], "user-1");
    assert_eq!(expected["edited_at"], "2024-06-10T06:15:00.000Z");
}

#[tokio::test]
async fn test_delete_is_absorbing() {
    let client = Arc::new(RecordingIndexClient::new());
    let processor = batch_processor(client.clone());

    let never_indexed = processor
        .process_batch(&[ChangeEvent::deleted("ghost", None)])
        .await;
    assert!(never_indexed.succeeded.contains("ghost"));
    assert!(never_indexed.failed.is_empty());

    processor
        .process_batch(&[ChangeEvent::created("msg-1", image("bye"))])
        .await;
    let twice = processor
        .process_batch(&[
            ChangeEvent::deleted("msg-1", Some(image("bye"))),
            ChangeEvent::deleted("msg-1", None),
        ])
        .await;

    assert!(twice.failed.is_empty());
    assert!(twice.succeeded.contains("msg-1"));
    assert!(client.inner.document("msg-1").is_none());
    assert_eq!(client.inner.document_count(), 0);
}

#[tokio::test]
async fn test_unchanged_content_makes_no_index_call() {
    let client = Arc::new(RecordingIndexClient::new());
    let mut after = image("same text");
    after.insert("type".to_string(), AttributeValue::string("system"));

    let result = batch_processor(client.clone())
        .process_batch(&[ChangeEvent::updated("msg-1", image("same text"), after)])
        .await;

    assert_eq!(client.call_count(), 0);
    assert_eq!(result.skipped, 1);
    assert!(result.succeeded.is_empty());
    assert!(result.failed.is_empty());
}

#[tokio::test]
async fn test_failure_of_third_event_is_isolated() {
    let client = Arc::new(RecordingIndexClient::unavailable_for("msg-3"));
    let events: Vec<ChangeEvent> = (1..=5)
        .map(|i| ChangeEvent::created(format!("msg-{}", i), image("hello world")))
        .collect();

    let result = batch_processor(client.clone()).process_batch(&events).await;

    assert_eq!(result.succeeded.len(), 4);
    assert!(!result.succeeded.contains("msg-3"));
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].record_id, "msg-3");
    assert!(matches!(
        result.failed[0].error,
        EventError::IndexUnavailable(_)
    ));
    assert_eq!(client.call_count(), 5);
    assert_eq!(client.inner.document_count(), 4);
}

#[tokio::test]
async fn test_created_event_without_record_id_is_skipped() {
    let client = Arc::new(RecordingIndexClient::new());
    let mut event = ChangeEvent::created("msg-1", image("hello"));
    event.record_id = None;

    let result = batch_processor(client.clone()).process_batch(&[event]).await;

    assert_eq!(client.call_count(), 0);
    assert_eq!(result.processed, 1);
    assert_eq!(result.invalid, 1);
    assert!(result.succeeded.is_empty());
    assert!(result.failed.is_empty());
}

#[tokio::test]
async fn test_stored_document_has_derived_fields() {
    let client = Arc::new(RecordingIndexClient::new());
    let mut reply = image("re: hello");
    reply.insert(
        "parentMessageId".to_string(),
        AttributeValue::string("msg-1"),
    );

    batch_processor(client.clone())
        .process_batch(&[
            ChangeEvent::created("msg-1", image("hello world")),
            ChangeEvent::created("msg-2", reply),
        ])
        .await;

    let plain = client.inner.document("msg-1").unwrap();
    assert_eq!(plain["content_length"], 11);
    assert_eq!(plain["token_count"], 2);
    assert_eq!(plain["has_attachments"], false);
    assert_eq!(plain["has_reply"], false);
    assert_eq!(plain["created_at"], "2024-06-10T06:13:20.000Z");
    assert!(plain["edited_at"].is_null());

    let reply = client.inner.document("msg-2").unwrap();
    assert_eq!(reply["has_reply"], true);
    assert_eq!(reply["parent_message_id"], "msg-1");
}

#[tokio::test]
async fn test_update_without_timestamps_cannot_reorder_state() {
    let create = ChangeEvent::created("msg-1", image("original"));
    let mut unversioned: FieldMap = HashMap::new();
    unversioned.insert("content".to_string(), AttributeValue::string("edited"));
    let update = ChangeEvent::updated("msg-1", image("original"), unversioned);

    let in_order = Arc::new(RecordingIndexClient::new());
    let processor = batch_processor(in_order.clone());
    processor.process_batch(&[create.clone()]).await;
    let result = processor.process_batch(&[update.clone()]).await;
    assert_eq!(result.invalid, 1);
    assert!(result.failed.is_empty());

    let reordered = Arc::new(RecordingIndexClient::new());
    let processor = batch_processor(reordered.clone());
    processor.process_batch(&[update]).await;
    processor.process_batch(&[create]).await;

    let expected = in_order.inner.document("msg-1").unwrap();
    assert_eq!(reordered.inner.document("msg-1").unwrap(), expected);
    assert_eq!(expected["content"], "original");
}
