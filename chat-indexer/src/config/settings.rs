//! Runtime settings read from the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use chat_indexer_repository::opensearch::{IndexConfig, DEFAULT_INDEX_NAME};

use crate::consumer::KafkaConsumerConfig;
use crate::loader::LoaderConfig;
use crate::orchestrator::OrchestratorConfig;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default Kafka broker address.
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";

/// Default Kafka consumer group ID.
const DEFAULT_KAFKA_GROUP_ID: &str = "chat-indexer";

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connection at a fixed interval until successful.
    Retry,
}

impl ConnectionMode {
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Defaults to "retry" if not set or invalid.
    fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_lowercase).as_deref() {
            None | Some("retry") => Self::Retry,
            Some("fail-fast" | "failfast" | "fail_fast") => Self::FailFast,
            Some(other) => {
                warn!(value = %other, "Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Where documents are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    /// An OpenSearch cluster.
    OpenSearch,
    /// Process memory, for local runs without a cluster.
    Memory,
}

impl IndexBackend {
    fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_lowercase).as_deref() {
            None | Some("opensearch") => Self::OpenSearch,
            Some("memory" | "in-memory") => Self::Memory,
            Some(other) => {
                warn!(value = %other, "Invalid INDEX_BACKEND, defaulting to 'opensearch'");
                Self::OpenSearch
            }
        }
    }
}

/// All settings the indexer reads at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: IndexBackend,
    pub opensearch_url: String,
    pub connection_mode: ConnectionMode,
    pub retry_interval: Duration,
    pub index: IndexConfig,
    pub loader: LoaderConfig,
    pub kafka: KafkaConsumerConfig,
    pub orchestrator: OrchestratorConfig,
}

/// Parse a numeric variable, falling back to `default` when unset or invalid.
fn number<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = key, value = %raw, "Invalid numeric setting, using default");
            default
        }),
    }
}

impl Settings {
    /// Read settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `INDEX_BACKEND`: "opensearch" or "memory" (default: opensearch)
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    /// - `INDEX_NAME`: Target index name (default: chat-messages)
    /// - `INDEX_SHARDS` / `INDEX_REPLICAS`: Index layout (default: 1 / 1)
    /// - `INDEX_REQUEST_TIMEOUT_MS`: Timeout of a single index call (default: 5000)
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    /// - `KAFKA_GROUP_ID`: Consumer group ID (default: chat-indexer)
    /// - `CHANGE_EVENTS_TOPIC`: Topic to consume (default: chat.messages.changes)
    /// - `KAFKA_BATCH_SIZE` / `KAFKA_BATCH_TIMEOUT_MS`: Batching (default: 50 / 1000)
    /// - `MAX_REDELIVERIES` / `REDELIVERY_BACKOFF_MS`: Redelivery (default: 3 / 500)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let index = IndexConfig::new(text("INDEX_NAME", DEFAULT_INDEX_NAME)).with_sharding(
            number(&lookup, "INDEX_SHARDS", 1),
            number(&lookup, "INDEX_REPLICAS", 1),
        );

        let mut kafka = KafkaConsumerConfig::new(
            text("KAFKA_BROKER", DEFAULT_KAFKA_BROKER),
            text("KAFKA_GROUP_ID", DEFAULT_KAFKA_GROUP_ID),
        );
        if let Some(topic) = lookup("CHANGE_EVENTS_TOPIC") {
            kafka.topic = topic;
        }
        kafka.batch_size = number(&lookup, "KAFKA_BATCH_SIZE", kafka.batch_size).max(1);
        kafka.batch_timeout = Duration::from_millis(number(
            &lookup,
            "KAFKA_BATCH_TIMEOUT_MS",
            kafka.batch_timeout.as_millis() as u64,
        ));

        let defaults = OrchestratorConfig::default();
        let orchestrator = OrchestratorConfig {
            max_redeliveries: number(&lookup, "MAX_REDELIVERIES", defaults.max_redeliveries),
            redelivery_backoff: Duration::from_millis(number(
                &lookup,
                "REDELIVERY_BACKOFF_MS",
                defaults.redelivery_backoff.as_millis() as u64,
            )),
            ..defaults
        };

        let loader = LoaderConfig {
            request_timeout: Duration::from_millis(number(
                &lookup,
                "INDEX_REQUEST_TIMEOUT_MS",
                LoaderConfig::default().request_timeout.as_millis() as u64,
            )),
        };

        Self {
            backend: IndexBackend::parse(lookup("INDEX_BACKEND").as_deref()),
            opensearch_url: text("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL),
            connection_mode: ConnectionMode::parse(lookup("OPENSEARCH_CONNECTION_MODE").as_deref()),
            retry_interval: Duration::from_secs(number(
                &lookup,
                "OPENSEARCH_RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL_SECS,
            )),
            index,
            loader,
            kafka,
            orchestrator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[]);

        assert_eq!(settings.backend, IndexBackend::OpenSearch);
        assert_eq!(settings.opensearch_url, "http://localhost:9200");
        assert_eq!(settings.connection_mode, ConnectionMode::Retry);
        assert_eq!(settings.retry_interval, Duration::from_secs(15));
        assert_eq!(settings.index.name, "chat-messages");
        assert_eq!(settings.index.shards, 1);
        assert_eq!(settings.index.replicas, 1);
        assert_eq!(settings.loader.request_timeout, Duration::from_millis(5000));
        assert_eq!(settings.kafka.brokers, "localhost:9092");
        assert_eq!(settings.kafka.group_id, "chat-indexer");
        assert_eq!(settings.kafka.topic, "chat.messages.changes");
        assert_eq!(settings.kafka.batch_size, 50);
        assert_eq!(settings.orchestrator.max_redeliveries, 3);
        assert_eq!(
            settings.orchestrator.redelivery_backoff,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_overrides() {
        let settings = settings(&[
            ("INDEX_BACKEND", "Memory"),
            ("OPENSEARCH_CONNECTION_MODE", "fail-fast"),
            ("INDEX_NAME", "messages-v2"),
            ("INDEX_SHARDS", "3"),
            ("INDEX_REPLICAS", "0"),
            ("INDEX_REQUEST_TIMEOUT_MS", "250"),
            ("CHANGE_EVENTS_TOPIC", "messages"),
            ("KAFKA_BATCH_SIZE", "10"),
            ("MAX_REDELIVERIES", "0"),
        ]);

        assert_eq!(settings.backend, IndexBackend::Memory);
        assert_eq!(settings.connection_mode, ConnectionMode::FailFast);
        assert_eq!(settings.index.name, "messages-v2");
        assert_eq!(settings.index.shards, 3);
        assert_eq!(settings.index.replicas, 0);
        assert_eq!(settings.loader.request_timeout, Duration::from_millis(250));
        assert_eq!(settings.kafka.topic, "messages");
        assert_eq!(settings.kafka.batch_size, 10);
        assert_eq!(settings.orchestrator.max_redeliveries, 0);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let settings = settings(&[
            ("INDEX_BACKEND", "elastic"),
            ("OPENSEARCH_CONNECTION_MODE", "sometimes"),
            ("KAFKA_BATCH_SIZE", "lots"),
            ("REDELIVERY_BACKOFF_MS", "-1"),
        ]);

        assert_eq!(settings.backend, IndexBackend::OpenSearch);
        assert_eq!(settings.connection_mode, ConnectionMode::Retry);
        assert_eq!(settings.kafka.batch_size, 50);
        assert_eq!(
            settings.orchestrator.redelivery_backoff,
            Duration::from_millis(500)
        );
    }
}
