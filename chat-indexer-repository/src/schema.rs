//! Index schema management.
//!
//! Makes sure the target index exists with the declared mapping before any
//! document traffic flows. Safe to call on every cold start and repeatedly
//! afterwards.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::errors::IndexError;
use crate::interfaces::IndexClient;
use crate::opensearch::{get_index_settings, IndexConfig};

/// Ensures the message index exists with the expected field mappings.
pub struct IndexSchemaManager {
    client: Arc<dyn IndexClient>,
    config: IndexConfig,
    /// Index names this process has already created.
    created: Mutex<HashSet<String>>,
}

impl IndexSchemaManager {
    /// Create a schema manager for the configured index.
    pub fn new(client: Arc<dyn IndexClient>, config: IndexConfig) -> Self {
        Self {
            client,
            config,
            created: Mutex::new(HashSet::new()),
        }
    }

    /// Name of the managed index.
    pub fn index_name(&self) -> &str {
        &self.config.name
    }

    /// Ensure the index exists, creating it when needed.
    ///
    /// The existence check is best effort: if it fails, creation is attempted
    /// anyway, and creation tolerates an index that already exists. An index
    /// this process created before is not created again just because a later
    /// existence check failed.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index is ready for use
    /// * `Err(IndexError)` - If creation failed; the pipeline must not start
    #[instrument(skip(self), fields(index = %self.config.name))]
    pub async fn ensure_index(&self) -> Result<(), IndexError> {
        let name = self.config.name.as_str();
        let mut created = self.created.lock().await;

        match self.client.index_exists(name).await {
            Ok(true) => {
                debug!("Index exists");
                return Ok(());
            }
            Ok(false) => {
                info!("Index does not exist, creating it");
            }
            Err(e) if created.contains(name) => {
                warn!(error = %e, "Index existence check failed, index was already created by this process");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "Index existence check failed, attempting creation");
            }
        }

        let settings = get_index_settings(&self.config);
        self.client.ensure_index(name, &settings).await?;
        created.insert(name.to_string());

        info!("Index is ready");
        Ok(())
    }
}
