//! Processor module for the chat indexer.
//!
//! Validates change events and shapes them into index documents.

pub mod document_shaper;
mod event_processor;

pub use document_shaper::DocumentShaper;
pub use event_processor::{validate, EventDisposition, EventPlan, EventProcessor, ProcessedEvent};
