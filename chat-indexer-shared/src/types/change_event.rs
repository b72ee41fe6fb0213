//! Change events delivered by the primary store's change feed.

use serde::{Deserialize, Serialize};

use crate::types::attribute_value::{AttributeValue, FieldMap};

/// Name of the content field inside a message record image.
pub const CONTENT_FIELD: &str = "content";

/// The kind of mutation a change event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A new record was written.
    #[serde(rename = "INSERT", alias = "Created")]
    Created,
    /// An existing record was modified.
    #[serde(rename = "MODIFY", alias = "Updated")]
    Updated,
    /// A record was removed.
    #[serde(rename = "REMOVE", alias = "Deleted")]
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// One record mutation.
///
/// `before` is present for updates and deletes, `after` for creates and
/// updates. Events that break this shape are still representable so that the
/// batch processor can skip them instead of failing deserialization of the
/// whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Upstream event identifier, only used for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Identifier of the mutated record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<FieldMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<FieldMap>,
}

impl ChangeEvent {
    /// Create event carrying the new record image.
    pub fn created(record_id: impl Into<String>, after: FieldMap) -> Self {
        Self {
            event_id: None,
            record_id: Some(record_id.into()),
            kind: ChangeKind::Created,
            before: None,
            after: Some(after),
        }
    }

    /// Update event carrying both record images.
    pub fn updated(record_id: impl Into<String>, before: FieldMap, after: FieldMap) -> Self {
        Self {
            event_id: None,
            record_id: Some(record_id.into()),
            kind: ChangeKind::Updated,
            before: Some(before),
            after: Some(after),
        }
    }

    /// Delete event carrying the last record image.
    pub fn deleted(record_id: impl Into<String>, before: Option<FieldMap>) -> Self {
        Self {
            event_id: None,
            record_id: Some(record_id.into()),
            kind: ChangeKind::Deleted,
            before,
            after: None,
        }
    }

    /// The record id, if present and non-empty.
    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// Content of the `after` image, when it is a string.
    pub fn after_content(&self) -> Option<&str> {
        Self::content_of(self.after.as_ref())
    }

    /// Content of the `before` image, when it is a string.
    pub fn before_content(&self) -> Option<&str> {
        Self::content_of(self.before.as_ref())
    }

    fn content_of(image: Option<&FieldMap>) -> Option<&str> {
        image
            .and_then(|fields| fields.get(CONTENT_FIELD))
            .and_then(AttributeValue::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_insert_event() {
        let json = r#"{
            "eventId": "evt-1",
            "recordId": "msg-1",
            "kind": "INSERT",
            "after": {"content": {"S": "hello world"}}
        }"#;

        let event: ChangeEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.kind, ChangeKind::Created);
        assert_eq!(event.record_id(), Some("msg-1"));
        assert_eq!(event.after_content(), Some("hello world"));
        assert!(event.before.is_none());
    }

    #[test]
    fn test_kind_aliases() {
        let kinds: Vec<ChangeKind> =
            serde_json::from_str(r#"["Created", "MODIFY", "Deleted", "REMOVE"]"#).unwrap();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Created,
                ChangeKind::Updated,
                ChangeKind::Deleted,
                ChangeKind::Deleted
            ]
        );
    }

    #[test]
    fn test_missing_record_id_is_representable() {
        let event: ChangeEvent = serde_json::from_str(r#"{"kind": "REMOVE"}"#).unwrap();
        assert!(event.record_id().is_none());

        let blank: ChangeEvent =
            serde_json::from_str(r#"{"recordId": "  ", "kind": "REMOVE"}"#).unwrap();
        assert!(blank.record_id().is_none());
    }

    #[test]
    fn test_non_string_content_is_not_content() {
        let mut after = FieldMap::new();
        after.insert(CONTENT_FIELD.to_string(), AttributeValue::number(5));
        let event = ChangeEvent::created("msg-1", after);
        assert!(event.after_content().is_none());
    }
}
