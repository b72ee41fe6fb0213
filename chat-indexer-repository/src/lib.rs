//! # Chat Indexer Repository
//!
//! This crate provides the trait and implementations for maintaining the
//! message search index. It includes definitions for errors, the index client
//! interface, an OpenSearch implementation, an in-memory implementation, and
//! the schema manager that prepares the index before traffic flows.

pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod merge;
pub mod opensearch;
pub mod schema;

pub use errors::IndexError;
pub use interfaces::IndexClient;
pub use memory::InMemoryIndexClient;
pub use opensearch::{IndexConfig, OpenSearchClient};
pub use schema::IndexSchemaManager;
