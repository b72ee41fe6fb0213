//! Document shaper.
//!
//! Pure transform from a message record image to the documents stored in the
//! search index. Everything derived here is computed from the image alone, so
//! shaping the same image twice yields the same document.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::debug;

use chat_indexer_shared::{
    non_null, Attachment, AttributeValue, FieldMap, MessageDocument, MessagePatch,
    DEFAULT_MESSAGE_TYPE, DEFAULT_MIME_TYPE,
};

use crate::errors::ShapeError;

/// Source record field names.
pub mod fields {
    pub const CHANNEL_ID: &str = "channelId";
    pub const USER_ID: &str = "userId";
    pub const CONTENT: &str = chat_indexer_shared::CONTENT_FIELD;
    pub const MESSAGE_TYPE: &str = "type";
    pub const CREATED_AT: &str = "createdAt";
    pub const EDITED_AT: &str = "editedAt";
    pub const UPDATED_AT: &str = "updatedAt";
    pub const PARENT_MESSAGE_ID: &str = "parentMessageId";
    pub const ATTACHMENTS: &str = "attachments";
}

/// Number of characters in the content.
pub fn content_length(content: &str) -> usize {
    content.chars().count()
}

/// Number of whitespace-delimited words in the content.
pub fn token_count(content: &str) -> usize {
    content.split_whitespace().count()
}

/// A parsed timestamp: epoch milliseconds and the canonical ISO-8601 form.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Timestamp {
    millis: i64,
    iso: String,
}

impl Timestamp {
    fn from_millis(field: &str, millis: i64) -> Result<Self, ShapeError> {
        let iso = DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| {
                ShapeError::shaping(format!("field '{}' is out of range: {}", field, millis))
            })?
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        Ok(Self { millis, iso })
    }

    /// Epoch milliseconds are the native encoding; numeric strings and
    /// RFC 3339 strings are tolerated for records written by older clients.
    fn parse(field: &str, value: &AttributeValue) -> Result<Self, ShapeError> {
        match value {
            AttributeValue::N(raw) => {
                let millis = raw.trim().parse::<i64>().map_err(|_| {
                    ShapeError::shaping(format!(
                        "field '{}' is not an epoch-millisecond number: {}",
                        field, raw
                    ))
                })?;
                Self::from_millis(field, millis)
            }
            AttributeValue::S(raw) => {
                if let Ok(millis) = raw.trim().parse::<i64>() {
                    return Self::from_millis(field, millis);
                }
                let parsed = DateTime::parse_from_rfc3339(raw.trim()).map_err(|e| {
                    ShapeError::shaping(format!(
                        "field '{}' is not a valid timestamp '{}': {}",
                        field, raw, e
                    ))
                })?;
                Self::from_millis(field, parsed.timestamp_millis())
            }
            other => Err(ShapeError::shaping(format!(
                "field '{}' expected a timestamp, got {}",
                field,
                other.type_name()
            ))),
        }
    }
}

fn required_str<'a>(image: &'a FieldMap, field: &str) -> Result<&'a str, ShapeError> {
    match non_null(image, field) {
        None => Err(ShapeError::invalid(format!(
            "missing required field '{}'",
            field
        ))),
        Some(AttributeValue::S(value)) => Ok(value),
        Some(other) => Err(ShapeError::shaping(format!(
            "field '{}' expected S, got {}",
            field,
            other.type_name()
        ))),
    }
}

fn optional_str<'a>(image: &'a FieldMap, field: &str) -> Result<Option<&'a str>, ShapeError> {
    match non_null(image, field) {
        None => Ok(None),
        Some(AttributeValue::S(value)) => Ok(Some(value)),
        Some(other) => Err(ShapeError::shaping(format!(
            "field '{}' expected S, got {}",
            field,
            other.type_name()
        ))),
    }
}

fn optional_timestamp(image: &FieldMap, field: &str) -> Result<Option<Timestamp>, ShapeError> {
    non_null(image, field)
        .map(|value| Timestamp::parse(field, value))
        .transpose()
}

fn message_type(image: &FieldMap) -> Result<String, ShapeError> {
    Ok(optional_str(image, fields::MESSAGE_TYPE)?
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_MESSAGE_TYPE)
        .to_string())
}

fn parent_message_id(image: &FieldMap) -> Result<Option<String>, ShapeError> {
    Ok(optional_str(image, fields::PARENT_MESSAGE_ID)?
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string))
}

/// Latest of the record's own timestamps, in epoch milliseconds.
fn revision(image: &FieldMap) -> Result<Option<i64>, ShapeError> {
    let mut latest = None;
    for field in [fields::CREATED_AT, fields::EDITED_AT, fields::UPDATED_AT] {
        if let Some(ts) = optional_timestamp(image, field)? {
            latest = latest.max(Some(ts.millis));
        }
    }
    Ok(latest)
}

fn attachment_from_attribute(value: &AttributeValue) -> Option<Attachment> {
    let entry = value.as_map()?;
    let name = non_null(entry, "name")?.as_str()?.trim();
    let url = non_null(entry, "url")?.as_str()?.trim();
    if name.is_empty() || url.is_empty() {
        return None;
    }
    let size = match non_null(entry, "size") {
        None => 0,
        Some(size) => size.as_number_str()?.trim().parse::<u64>().ok()?,
    };
    let mime_type = match non_null(entry, "mimeType") {
        None => DEFAULT_MIME_TYPE.to_string(),
        Some(mime) => mime.as_str()?.to_string(),
    };

    Some(Attachment {
        name: name.to_string(),
        size,
        mime_type,
        url: url.to_string(),
    })
}

fn attachment_from_json(value: &Value) -> Option<Attachment> {
    let entry = value.as_object()?;
    let name = entry.get("name")?.as_str()?.trim();
    let url = entry.get("url")?.as_str()?.trim();
    if name.is_empty() || url.is_empty() {
        return None;
    }
    let size = match entry.get("size") {
        None | Some(Value::Null) => 0,
        Some(size) => size.as_u64()?,
    };
    let mime_type = match entry.get("mimeType") {
        None | Some(Value::Null) => DEFAULT_MIME_TYPE.to_string(),
        Some(mime) => mime.as_str()?.to_string(),
    };

    Some(Attachment {
        name: name.to_string(),
        size,
        mime_type,
        url: url.to_string(),
    })
}

/// Normalize the attachment list, dropping entries that cannot be normalized.
///
/// Accepts a list of maps, or a string holding a JSON array of objects. Any
/// other shape, or a string that is not a JSON array, is a shaping error.
fn attachments(image: &FieldMap) -> Result<Vec<Attachment>, ShapeError> {
    let (normalized, total) = match non_null(image, fields::ATTACHMENTS) {
        None => return Ok(Vec::new()),
        Some(AttributeValue::L(items)) => (
            items
                .iter()
                .filter_map(attachment_from_attribute)
                .collect::<Vec<_>>(),
            items.len(),
        ),
        Some(AttributeValue::S(raw)) => {
            let items: Vec<Value> = serde_json::from_str(raw).map_err(|e| {
                ShapeError::shaping(format!("field 'attachments' is not a JSON array: {}", e))
            })?;
            (
                items
                    .iter()
                    .filter_map(attachment_from_json)
                    .collect::<Vec<_>>(),
                items.len(),
            )
        }
        Some(other) => {
            return Err(ShapeError::shaping(format!(
                "field 'attachments' expected L or S, got {}",
                other.type_name()
            )))
        }
    };

    if normalized.len() < total {
        debug!(
            dropped = total - normalized.len(),
            kept = normalized.len(),
            "Dropped attachments that could not be normalized"
        );
    }
    Ok(normalized)
}

/// Whether a field differs between two images. `NULL` and absent are equal.
fn changed(before: Option<&FieldMap>, after: &FieldMap, field: &str) -> bool {
    match before {
        Some(before) => non_null(before, field) != non_null(after, field),
        None => non_null(after, field).is_some(),
    }
}

/// Shapes message record images into index documents.
///
/// The shaper holds no state; it exists as a type so the processor can own
/// one and tests can call it directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentShaper;

impl DocumentShaper {
    /// Create a new document shaper.
    pub fn new() -> Self {
        Self
    }

    /// Shape a full document from the current record image.
    ///
    /// # Errors
    ///
    /// * `ShapeError::InvalidRecord` - `channelId`, `userId`, `content` or
    ///   `createdAt` is absent
    /// * `ShapeError::Shaping` - a field is present with the wrong type or an
    ///   unparsable value
    pub fn shape(&self, record_id: &str, after: &FieldMap) -> Result<MessageDocument, ShapeError> {
        let channel_id = required_str(after, fields::CHANNEL_ID)?;
        let user_id = required_str(after, fields::USER_ID)?;
        let content = required_str(after, fields::CONTENT)?;
        let created_at = non_null(after, fields::CREATED_AT)
            .ok_or_else(|| {
                ShapeError::invalid(format!("missing required field '{}'", fields::CREATED_AT))
            })
            .and_then(|value| Timestamp::parse(fields::CREATED_AT, value))?;
        let edited_at = optional_timestamp(after, fields::EDITED_AT)?;
        let parent_message_id = parent_message_id(after)?;
        let attachments = attachments(after)?;
        let revision = revision(after)?.unwrap_or(created_at.millis);

        Ok(MessageDocument {
            message_id: record_id.to_string(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            message_type: message_type(after)?,
            created_at: created_at.iso,
            edited_at: edited_at.map(|ts| ts.iso),
            has_reply: parent_message_id.is_some(),
            parent_message_id,
            has_attachments: !attachments.is_empty(),
            attachments,
            content_length: content_length(content),
            token_count: token_count(content),
            revision,
        })
    }

    /// Shape a patch holding only the fields that changed between two images.
    ///
    /// Derived fields are recomputed only when a field they depend on changed:
    /// `content_length`/`token_count` with `content`, `has_reply` with
    /// `parentMessageId`, `has_attachments` with `attachments`. Without a
    /// `before` image every field present in `after` counts as changed.
    ///
    /// # Errors
    ///
    /// * `ShapeError::InvalidRecord` - `content` is absent from `after`, or
    ///   `after` carries none of `createdAt`, `editedAt`, `updatedAt`
    /// * `ShapeError::Shaping` - a changed field is malformed
    pub fn shape_patch(
        &self,
        record_id: &str,
        before: Option<&FieldMap>,
        after: &FieldMap,
    ) -> Result<MessagePatch, ShapeError> {
        let content = required_str(after, fields::CONTENT)?;
        // An unversioned patch could not be ordered against the full document.
        let revision = revision(after)?.ok_or_else(|| {
            ShapeError::invalid("update carries no createdAt, editedAt or updatedAt")
        })?;
        let mut patch = MessagePatch {
            revision: Some(revision),
            ..Default::default()
        };

        if changed(before, after, fields::CONTENT) {
            patch.content = Some(content.to_string());
            patch.content_length = Some(content_length(content));
            patch.token_count = Some(token_count(content));
        }

        if changed(before, after, fields::MESSAGE_TYPE) {
            patch.message_type = Some(message_type(after)?);
        }

        if changed(before, after, fields::EDITED_AT) {
            patch.edited_at = Some(optional_timestamp(after, fields::EDITED_AT)?.map(|ts| ts.iso));
        }

        if changed(before, after, fields::PARENT_MESSAGE_ID) {
            let parent = parent_message_id(after)?;
            patch.has_reply = Some(parent.is_some());
            patch.parent_message_id = Some(parent);
        }

        if changed(before, after, fields::ATTACHMENTS) {
            let attachments = attachments(after)?;
            patch.has_attachments = Some(!attachments.is_empty());
            patch.attachments = Some(attachments);
        }

        debug!(record_id = %record_id, empty = patch.is_empty(), "Shaped patch document");
        Ok(patch)
    }
}
