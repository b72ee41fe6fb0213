//! Chat Indexer Main Entry Point
//!
//! Consumes chat message change events from Kafka and keeps the message
//! search index in sync.

use chat_indexer::{Dependencies, IndexingError};
use dotenv::dotenv;
use std::env;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
///
/// `RUST_LOG` wins over `LOG_LEVEL`; `LOG_FORMAT=json` switches to JSON output.
fn init_tracing() -> Result<(), IndexingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            EnvFilter::try_new(format!(
                "chat_indexer={level},chat_indexer_repository={level}"
            ))
            .map_err(|e| IndexingError::config(format!("Invalid LOG_LEVEL '{}': {}", level, e)))?
        }
    };

    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
    });
    let pretty_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_target(true).pretty());

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing()?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting chat indexer");

    let mut deps = match Dependencies::new().await {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    match deps.orchestrator.run().await {
        Ok(()) => {
            info!("Chat indexer stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Chat indexer failed");
            Err(e.into())
        }
    }
}
