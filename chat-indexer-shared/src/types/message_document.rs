//! Message document types for the search index.
//!
//! This module defines the document structure that is indexed in the search
//! engine, and the partial document used to merge content edits.

use serde::{Deserialize, Serialize};

/// Message type stored when the source record does not carry one.
pub const DEFAULT_MESSAGE_TYPE: &str = "text";

/// MIME type stored for attachments that do not declare one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A normalized file attachment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    pub mime_type: String,
    pub url: String,
}

/// Document representation for the search index.
///
/// Built one-to-one from a message record image. The document id in the index
/// is the `message_id`, which makes repeated writes of the same record
/// converge on a single document.
///
/// # Fields
///
/// - `message_id`: Record identifier and index document id
/// - `channel_id`: Channel the message was posted in
/// - `user_id`: Author of the message
/// - `content`: Message text (primary search field)
/// - `message_type`: Categorical type, `"text"` when the record has none
/// - `created_at` / `edited_at`: ISO-8601 UTC timestamps with millisecond precision
/// - `parent_message_id`: Message this one replies to
/// - `attachments`: Normalized attachment list
/// - `content_length`, `token_count`, `has_attachments`, `has_reply`: derived from content
/// - `revision`: Epoch milliseconds of the latest change the document reflects
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageDocument {
    pub message_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub content: String,
    pub message_type: String,
    pub created_at: String,
    pub edited_at: Option<String>,
    pub parent_message_id: Option<String>,
    pub attachments: Vec<Attachment>,
    pub content_length: usize,
    pub token_count: usize,
    pub has_attachments: bool,
    pub has_reply: bool,
    pub revision: i64,
}

impl MessageDocument {
    /// The document ID used in the search index.
    pub fn document_id(&self) -> &str {
        &self.message_id
    }
}

/// Partial document merged into an existing (or missing) index document.
///
/// Only fields that are `Some` are written. For the nullable fields the outer
/// `Option` says whether the field changed and the inner one carries the new
/// value, so an edit that clears a reply reference serializes as `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_reply: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_attachments: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,
}

impl MessagePatch {
    /// True when the patch carries no field besides the revision.
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.content_length.is_none()
            && self.token_count.is_none()
            && self.message_type.is_none()
            && self.edited_at.is_none()
            && self.parent_message_id.is_none()
            && self.has_reply.is_none()
            && self.attachments.is_none()
            && self.has_attachments.is_none()
    }
}
