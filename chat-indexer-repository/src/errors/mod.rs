//! Error types for the chat indexer repository.
//!
//! This module provides a unified error type for all index operations.

mod index_error;

pub use index_error::IndexError;
