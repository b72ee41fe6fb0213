//! Dependency initialization and wiring for the chat indexer.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use chat_indexer_repository::{
    IndexClient, IndexConfig, IndexSchemaManager, InMemoryIndexClient, OpenSearchClient,
};

use crate::batch::BatchProcessor;
use crate::config::settings::{ConnectionMode, IndexBackend, Settings};
use crate::consumer::KafkaConsumer;
use crate::loader::SearchLoader;
use crate::orchestrator::{Consumer, Orchestrator};
use crate::processor::EventProcessor;
use crate::IndexingError;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// See [`Settings::from_env`] for the variables read.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If the index cannot be prepared, or a
    ///   connection fails in fail-fast mode
    pub async fn new() -> Result<Self, IndexingError> {
        let settings = Settings::from_env();

        info!(
            backend = ?settings.backend,
            opensearch_url = %settings.opensearch_url,
            index = %settings.index.name,
            kafka_broker = %settings.kafka.brokers,
            kafka_group_id = %settings.kafka.group_id,
            topic = %settings.kafka.topic,
            connection_mode = ?settings.connection_mode,
            retry_interval_secs = settings.retry_interval.as_secs(),
            "Initializing dependencies"
        );

        let client: Arc<dyn IndexClient> = match settings.backend {
            IndexBackend::OpenSearch => Arc::new(
                Self::connect_to_opensearch(
                    &settings.opensearch_url,
                    settings.index.clone(),
                    settings.connection_mode,
                    settings.retry_interval,
                )
                .await?,
            ),
            IndexBackend::Memory => {
                warn!("Using the in-memory index backend, documents are not persisted");
                Arc::new(InMemoryIndexClient::new())
            }
        };

        let consumer = KafkaConsumer::new(settings.kafka.clone()).map_err(|e| {
            IndexingError::config(format!("Failed to create Kafka consumer: {}", e))
        })?;

        info!("Kafka consumer created");

        Self::with_components(Arc::new(consumer), client, &settings).await
    }

    /// Wire the pipeline around an existing consumer and index client.
    ///
    /// The index is prepared first; the pipeline is not built when that fails.
    pub async fn with_components(
        consumer: Arc<dyn Consumer>,
        client: Arc<dyn IndexClient>,
        settings: &Settings,
    ) -> Result<Self, IndexingError> {
        IndexSchemaManager::new(Arc::clone(&client), settings.index.clone())
            .ensure_index()
            .await
            .map_err(|e| {
                IndexingError::initialization(format!(
                    "Failed to ensure index '{}' exists: {}",
                    settings.index.name, e
                ))
            })?;

        let processor = BatchProcessor::new(
            EventProcessor::new(),
            SearchLoader::with_config(client, settings.loader.clone()),
        );
        let orchestrator =
            Orchestrator::with_config(consumer, processor, settings.orchestrator.clone());

        Ok(Self { orchestrator })
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        url: &str,
        index_config: IndexConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchClient, IndexingError> {
        loop {
            match Self::try_connect_opensearch(url, index_config.clone()).await {
                Ok(client) => {
                    info!("OpenSearch connection established");
                    return Ok(client);
                }
                Err(e) => match mode {
                    ConnectionMode::FailFast => return Err(e),
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    /// Create the client and make one round trip to check the cluster answers.
    async fn try_connect_opensearch(
        url: &str,
        index_config: IndexConfig,
    ) -> Result<OpenSearchClient, IndexingError> {
        let name = index_config.name.clone();
        let client = OpenSearchClient::new(url, index_config).await.map_err(|e| {
            IndexingError::config(format!("Failed to create OpenSearch client: {}", e))
        })?;

        client.index_exists(&name).await.map_err(|e| {
            IndexingError::config(format!("Failed to reach OpenSearch: {}", e))
        })?;

        Ok(client)
    }
}
