//! OpenSearch index configuration and mappings.
//!
//! This module defines the index settings and mappings for the message search index.

use serde_json::{json, Value};

/// The default name of the message search index.
pub const DEFAULT_INDEX_NAME: &str = "chat-messages";

/// Configuration for the search index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// The index name (used for all operations).
    pub name: String,
    /// Number of primary shards, applied on creation only.
    pub shards: u32,
    /// Number of replicas, applied on creation only.
    pub replicas: u32,
}

impl IndexConfig {
    /// Create a new index configuration with one shard and one replica.
    ///
    /// # Arguments
    ///
    /// * `name` - The index name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shards: 1,
            replicas: 1,
        }
    }

    /// Override the shard and replica counts.
    pub fn with_sharding(mut self, shards: u32, replicas: u32) -> Self {
        self.shards = shards;
        self.replicas = replicas;
        self
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_NAME)
    }
}

/// Get the index settings and mappings for the message search index.
///
/// The mapping is strict: documents carrying a field it does not declare are
/// rejected by the backend, which keeps the shaper and the mapping in lockstep.
///
/// The configuration includes:
/// - **text** for `content`, analyzed with the standard analyzer
/// - **keyword** fields for ids and categorical values used in filters
/// - **date** fields for creation and edit times
/// - **integer/boolean** derived fields for filtering and sorting
/// - **nested** attachments so per-attachment conditions match one attachment
///
/// # Arguments
///
/// * `config` - Index configuration providing shard and replica counts
pub fn get_index_settings(config: &IndexConfig) -> Value {
    json!({
        "settings": {
            "number_of_shards": config.shards,
            "number_of_replicas": config.replicas
        },
        "mappings": {
            "dynamic": "strict",
            "properties": {
                "message_id": {
                    "type": "keyword"
                },
                "channel_id": {
                    "type": "keyword"
                },
                "user_id": {
                    "type": "keyword"
                },
                "content": {
                    "type": "text",
                    "analyzer": "standard"
                },
                "message_type": {
                    "type": "keyword"
                },
                "created_at": {
                    "type": "date",
                    "format": "strict_date_optional_time"
                },
                "edited_at": {
                    "type": "date",
                    "format": "strict_date_optional_time"
                },
                "parent_message_id": {
                    "type": "keyword"
                },
                "attachments": {
                    "type": "nested",
                    "properties": {
                        "name": {
                            "type": "text",
                            "fields": {
                                "raw": {
                                    "type": "keyword"
                                }
                            }
                        },
                        "size": {
                            "type": "long"
                        },
                        "mime_type": {
                            "type": "keyword"
                        },
                        "url": {
                            "type": "keyword",
                            "index": false
                        }
                    }
                },
                "content_length": {
                    "type": "integer"
                },
                "token_count": {
                    "type": "integer"
                },
                "has_attachments": {
                    "type": "boolean"
                },
                "has_reply": {
                    "type": "boolean"
                },
                "revision": {
                    "type": "long"
                }
            }
        }
    })
}
