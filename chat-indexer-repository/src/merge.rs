//! Revision-guarded write rules.
//!
//! Both write operations are expressed here over plain JSON objects so the
//! in-memory backend and the OpenSearch scripts share one definition of what
//! "converges" means:
//!
//! - full upsert: replace the stored document unless it has a revision at
//!   least as new, in which case only fill in the fields it lacks
//! - merge: overlay the patch unless the stored document is strictly newer
//!
//! With these rules, an edit delivered before its create and a create
//! delivered before its edit produce the same document.
//!
//! The painless scripts in `opensearch/client.rs` restate these rules for the
//! server side and change together with this module.

use serde::Serialize;
use serde_json::{Map, Value};

use chat_indexer_shared::{MessageDocument, MessagePatch};

use crate::errors::IndexError;

/// Field holding the document revision.
pub const REVISION_FIELD: &str = "revision";

/// Field holding the document identity.
pub const ID_FIELD: &str = "message_id";

/// A JSON object as stored in the index.
pub type Source = Map<String, Value>;

fn to_source<T: Serialize>(value: &T) -> Result<Source, IndexError> {
    match serde_json::to_value(value).map_err(|e| IndexError::serialization(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(IndexError::serialization(format!(
            "Expected a JSON object, got {}",
            other
        ))),
    }
}

/// Serialize a full document into its stored form.
pub fn document_source(document: &MessageDocument) -> Result<Source, IndexError> {
    to_source(document)
}

/// Serialize a patch into the body merged into the index.
///
/// The identity field is always included so that a document created from a
/// patch alone is still attributable to its message.
pub fn patch_source(id: &str, patch: &MessagePatch) -> Result<Source, IndexError> {
    let mut source = to_source(patch)?;
    source.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    Ok(source)
}

fn revision_of(source: &Source) -> Option<i64> {
    source.get(REVISION_FIELD).and_then(Value::as_i64)
}

/// Apply a full upsert to the stored document.
pub fn apply_upsert(stored: Option<&Source>, incoming: &Source) -> Source {
    let Some(stored) = stored else {
        return incoming.clone();
    };

    match (revision_of(stored), revision_of(incoming)) {
        (Some(current), Some(new)) if current >= new => {
            let mut merged = stored.clone();
            for (key, value) in incoming {
                merged.entry(key.clone()).or_insert_with(|| value.clone());
            }
            merged
        }
        _ => incoming.clone(),
    }
}

/// Apply a merge to the stored document.
///
/// Returns `None` when the stored document is newer and the patch is dropped.
pub fn apply_merge(stored: Option<&Source>, patch: &Source) -> Option<Source> {
    let Some(stored) = stored else {
        return Some(patch.clone());
    };

    if let (Some(current), Some(new)) = (revision_of(stored), revision_of(patch)) {
        if current > new {
            return None;
        }
    }

    let mut merged = stored.clone();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    Some(merged)
}
