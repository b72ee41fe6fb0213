//! This module defines the core data structures and types used across the chat indexer.
//! It re-exports the change-event input types and the index document types.

pub mod attribute_value;
pub mod change_event;
pub mod message_document;

pub use attribute_value::{AttributeValue, FieldMap};
pub use change_event::{ChangeEvent, ChangeKind};
pub use message_document::{Attachment, MessageDocument, MessagePatch};
