//! # Chat Indexer
//!
//! Keeps a full-text search index in sync with the chat message store by
//! consuming its change feed from Kafka.
//!
//! ## Architecture
//!
//! The indexer follows the Consumer-Processor-Loader pattern:
//!
//! 1. **Consumer**: Receives change events from Kafka
//! 2. **Processor**: Validates events and shapes message documents
//! 3. **Loader**: Applies index operations through an `IndexClient`
//! 4. **Batch**: Runs a batch through processor and loader, isolating failures
//! 5. **Orchestrator**: Coordinates the flow, redelivery and acknowledgments
//!
//! ## Modules
//!
//! - [`config`]: Settings and dependency initialization
//! - [`consumer`]: Kafka consumer for change events
//! - [`processor`]: Event validation and document shaping
//! - [`loader`]: Applies operations to the search index
//! - [`batch`]: Per-batch processing and results
//! - [`orchestrator`]: Coordinates the ingest flow
//! - [`errors`]: Error types for the indexer

pub mod batch;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod loader;
pub mod orchestrator;
pub mod processor;

pub use config::{Dependencies, Settings};
pub use errors::IngestError;

use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The search index could not be prepared; the pipeline must not start.
    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// Ingest error.
    #[error("Ingest error: {0}")]
    IngestError(#[from] IngestError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create an initialization error.
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::InitializationError(msg.into())
    }
}
