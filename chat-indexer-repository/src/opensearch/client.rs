//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `IndexClient`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use opensearch::{
    http::{
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{IndicesCreateParts, IndicesExistsParts},
    DeleteParts, OpenSearch, UpdateParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info};
use url::Url;

use chat_indexer_shared::{MessageDocument, MessagePatch};

use crate::errors::IndexError;
use crate::interfaces::IndexClient;
use crate::merge::{self, Source};
use crate::opensearch::index_config::IndexConfig;

/// Number of times OpenSearch retries an update that hit a version conflict.
const RETRY_ON_CONFLICT: i64 = 3;

/// Painless version of `merge::apply_upsert`.
///
/// `merge.rs` is the reference definition and carries the behavioural tests;
/// a change to either side must be made to both.
const UPSERT_SCRIPT: &str = "\
def current = ctx._source.revision; \
if (current == null || current < params.doc.revision) { \
  ctx._source.clear(); \
  ctx._source.putAll(params.doc); \
} else { \
  boolean filled = false; \
  for (entry in params.doc.entrySet()) { \
    if (!ctx._source.containsKey(entry.getKey())) { \
      ctx._source.put(entry.getKey(), entry.getValue()); \
      filled = true; \
    } \
  } \
  if (!filled) { ctx.op = 'none'; } \
}";

/// Painless version of `merge::apply_merge`. Kept in step with `merge.rs`.
const MERGE_SCRIPT: &str = "\
def current = ctx._source.revision; \
def incoming = params.doc.revision; \
if (current != null && incoming != null && current > incoming) { \
  ctx.op = 'none'; \
} else { \
  ctx._source.putAll(params.doc); \
}";

/// OpenSearch client implementation.
///
/// # Example
///
/// ```ignore
/// use chat_indexer_repository::opensearch::{IndexConfig, OpenSearchClient};
///
/// let config = IndexConfig::new("chat-messages");
/// let client = OpenSearchClient::new("http://localhost:9200", config).await?;
///
/// // Succeeds whether or not the document exists
/// client.delete_document("msg-1").await?;
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
    index_config: IndexConfig,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index_config` - The index configuration naming the target index
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(IndexError)` - If connection setup fails
    pub async fn new(url: &str, index_config: IndexConfig) -> Result<Self, IndexError> {
        let parsed_url = Url::parse(url).map_err(|e| IndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| IndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            index = %index_config.name,
            "Created OpenSearch client"
        );

        Ok(Self {
            client,
            index_config,
        })
    }

    /// Build an update body that runs `script` when the document exists and
    /// indexes `source` as-is when it does not.
    fn scripted_upsert_body(script: &str, source: &Source) -> Value {
        json!({
            "script": {
                "source": script,
                "lang": "painless",
                "params": { "doc": source }
            },
            "upsert": source
        })
    }

    /// Read the body of a failed response and classify it.
    async fn failure(operation: &str, response: Response) -> IndexError {
        let status = response.status_code().as_u16();
        let body = response.text().await.unwrap_or_default();
        error!(status = status, body = %body, operation = operation, "OpenSearch request failed");
        IndexError::from_status(operation, status, &body)
    }

    /// Any error before a response arrives (connect, timeout, TLS) is transient.
    fn transport_error(operation: &str, err: opensearch::Error) -> IndexError {
        IndexError::unavailable(format!("{} request failed: {}", operation, err))
    }

    async fn send_update(
        &self,
        operation: &str,
        id: &str,
        body: Value,
    ) -> Result<(), IndexError> {
        let response = self
            .client
            .update(UpdateParts::IndexId(&self.index_config.name, id))
            .retry_on_conflict(RETRY_ON_CONFLICT)
            .body(body)
            .send()
            .await
            .map_err(|e| Self::transport_error(operation, e))?;

        if !response.status_code().is_success() {
            return Err(Self::failure(operation, response).await);
        }

        Ok(())
    }
}

#[async_trait]
impl IndexClient for OpenSearchClient {
    async fn index_exists(&self, name: &str) -> Result<bool, IndexError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[name]))
            .send()
            .await
            .map_err(|e| Self::transport_error("Index exists", e))?;

        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(Self::failure("Index exists", response).await),
        }
    }

    /// Create the index, treating `resource_already_exists_exception` as success.
    ///
    /// Creation itself is the idempotency point: two instances racing through
    /// a negative existence check both end up with `Ok(())`.
    async fn ensure_index(&self, name: &str, mapping: &Value) -> Result<(), IndexError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(name))
            .body(mapping.clone())
            .send()
            .await
            .map_err(|e| Self::transport_error("Index creation", e))?;

        let status = response.status_code();
        if status.is_success() {
            info!(index = %name, "Created index");
            return Ok(());
        }

        let status = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        if status == 400 && body.contains("resource_already_exists_exception") {
            debug!(index = %name, "Index already exists");
            return Ok(());
        }

        error!(status = status, body = %body, "Index creation failed");
        Err(IndexError::from_status("Index creation", status, &body))
    }

    /// Write a full document through the update API so the revision guard runs
    /// server-side.
    ///
    /// API reference: https://docs.opensearch.org/latest/api-reference/document-apis/update-document/#using-the-upsert-operation
    async fn upsert_document(
        &self,
        id: &str,
        document: &MessageDocument,
    ) -> Result<(), IndexError> {
        let source = merge::document_source(document)?;
        self.send_update("Upsert", id, Self::scripted_upsert_body(UPSERT_SCRIPT, &source))
            .await?;

        debug!(doc_id = %id, revision = document.revision, "Document upserted");
        Ok(())
    }

    async fn merge_document(&self, id: &str, patch: &MessagePatch) -> Result<(), IndexError> {
        let source = merge::patch_source(id, patch)?;
        self.send_update("Merge", id, Self::scripted_upsert_body(MERGE_SCRIPT, &source))
            .await?;

        debug!(doc_id = %id, revision = ?patch.revision, "Document merged");
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<(), IndexError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(&self.index_config.name, id))
            .send()
            .await
            .map_err(|e| Self::transport_error("Delete", e))?;

        let status = response.status_code();

        // 404 is acceptable - document may not exist
        if !status.is_success() && status.as_u16() != 404 {
            return Err(Self::failure("Delete", response).await);
        }

        debug!(doc_id = %id, "Document deleted");
        Ok(())
    }
}
