//! Loader module for the chat indexer.
//!
//! Applies processed events to the search index, one call per event.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use chat_indexer_repository::IndexClient;

use crate::errors::EventError;
use crate::processor::ProcessedEvent;

/// Configuration for the search loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Upper bound on a single index call. Exceeding it is an unavailable index.
    pub request_timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(5000),
        }
    }
}

/// Loader that writes processed events into the search index.
///
/// The loader is responsible for:
/// - Dispatching each operation to the matching `IndexClient` call
/// - Bounding every call with the configured timeout
/// - Classifying backend errors into per-event errors
pub struct SearchLoader {
    client: Arc<dyn IndexClient>,
    config: LoaderConfig,
}

impl SearchLoader {
    /// Create a new search loader with the given index client.
    pub fn new(client: Arc<dyn IndexClient>) -> Self {
        Self::with_config(client, LoaderConfig::default())
    }

    /// Create a new search loader with custom configuration.
    pub fn with_config(client: Arc<dyn IndexClient>, config: LoaderConfig) -> Self {
        Self { client, config }
    }

    /// Apply one operation to the index.
    #[instrument(skip(self, event), fields(record_id = %event.record_id()))]
    pub async fn apply(&self, event: &ProcessedEvent) -> Result<(), EventError> {
        let call = async {
            match event {
                ProcessedEvent::Upsert {
                    record_id,
                    document,
                } => self.client.upsert_document(record_id, document).await,
                ProcessedEvent::Merge { record_id, patch } => {
                    self.client.merge_document(record_id, patch).await
                }
                ProcessedEvent::Delete { record_id } => {
                    self.client.delete_document(record_id).await
                }
            }
        };

        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(Ok(())) => {
                debug!("Index call succeeded");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Index call failed");
                Err(EventError::from(e))
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.request_timeout.as_millis() as u64,
                    "Index call timed out"
                );
                Err(EventError::IndexUnavailable(format!(
                    "index call timed out after {:?}",
                    self.config.request_timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chat_indexer_repository::IndexError;
    use chat_indexer_shared::{MessageDocument, MessagePatch};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock index client for testing.
    struct MockIndexClient {
        upserts: AtomicUsize,
        merges: AtomicUsize,
        deletes: AtomicUsize,
        delay: Option<Duration>,
        error: Option<fn() -> IndexError>,
    }

    impl MockIndexClient {
        fn new() -> Self {
            Self {
                upserts: AtomicUsize::new(0),
                merges: AtomicUsize::new(0),
                deletes: AtomicUsize::new(0),
                delay: None,
                error: None,
            }
        }

        async fn respond(&self) -> Result<(), IndexError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.error {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl IndexClient for MockIndexClient {
        async fn index_exists(&self, _name: &str) -> Result<bool, IndexError> {
            Ok(true)
        }

        async fn ensure_index(&self, _name: &str, _mapping: &Value) -> Result<(), IndexError> {
            Ok(())
        }

        async fn upsert_document(
            &self,
            _id: &str,
            _document: &MessageDocument,
        ) -> Result<(), IndexError> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            self.respond().await
        }

        async fn merge_document(&self, _id: &str, _patch: &MessagePatch) -> Result<(), IndexError> {
            self.merges.fetch_add(1, Ordering::SeqCst);
            self.respond().await
        }

        async fn delete_document(&self, _id: &str) -> Result<(), IndexError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.respond().await
        }
    }

    fn merge_event() -> ProcessedEvent {
        ProcessedEvent::Merge {
            record_id: "msg-1".to_string(),
            patch: MessagePatch {
                content: Some("hi".to_string()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_dispatches_by_operation() {
        let client = Arc::new(MockIndexClient::new());
        let loader = SearchLoader::new(client.clone());

        loader.apply(&merge_event()).await.unwrap();
        loader
            .apply(&ProcessedEvent::Delete {
                record_id: "msg-1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(client.upserts.load(Ordering::SeqCst), 0);
        assert_eq!(client.merges.load(Ordering::SeqCst), 1);
        assert_eq!(client.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_errors_are_classified() {
        let mut mock = MockIndexClient::new();
        mock.error = Some(|| IndexError::rejected("mapper_parsing_exception"));
        let loader = SearchLoader::new(Arc::new(mock));

        let result = loader.apply(&merge_event()).await;
        assert!(matches!(result, Err(EventError::IndexRejected(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_index_unavailable() {
        let mut mock = MockIndexClient::new();
        mock.delay = Some(Duration::from_secs(30));
        let loader = SearchLoader::with_config(
            Arc::new(mock),
            LoaderConfig {
                request_timeout: Duration::from_secs(1),
            },
        );

        let result = loader.apply(&merge_event()).await;

        match result {
            Err(e @ EventError::IndexUnavailable(_)) => assert!(e.is_retryable()),
            other => panic!("expected IndexUnavailable, got {:?}", other),
        }
    }
}
