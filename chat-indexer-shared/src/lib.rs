//! # Chat Indexer Shared
//!
//! This crate defines shared data structures and types used across the chat indexer.
//! It includes the change events read from the primary store's change feed and the
//! documents written to the search index.

pub mod types;

pub use types::attribute_value::{non_null, AttributeValue, FieldMap};
pub use types::change_event::{ChangeEvent, ChangeKind, CONTENT_FIELD};
pub use types::message_document::{
    Attachment, MessageDocument, MessagePatch, DEFAULT_MESSAGE_TYPE, DEFAULT_MIME_TYPE,
};
