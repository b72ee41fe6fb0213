//! Event processor implementation.
//!
//! Validates change events and turns them into index operations.

use tracing::{debug, instrument};

use chat_indexer_shared::{
    non_null, ChangeEvent, ChangeKind, FieldMap, MessageDocument, MessagePatch, CONTENT_FIELD,
};

use crate::errors::{EventError, ShapeError};
use crate::processor::document_shaper::DocumentShaper;

/// Outcome of the validation step that runs before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDisposition {
    /// The event is well formed and must be applied.
    Proceed,
    /// The event is well formed but requires no index call.
    Skip(&'static str),
    /// The event lacks a mandatory field. It is dropped, neither failed nor succeeded.
    Invalid(String),
}

/// Decide what to do with an event, based on its kind.
///
/// * Created and Updated need a record id and an `after.content` value.
/// * Updated is skipped when the content did not change.
/// * Deleted only needs a record id.
pub fn validate(event: &ChangeEvent) -> EventDisposition {
    if event.record_id().is_none() {
        return EventDisposition::Invalid("missing record id".to_string());
    }

    match event.kind {
        ChangeKind::Deleted => EventDisposition::Proceed,
        ChangeKind::Created | ChangeKind::Updated => {
            let after = event.after.as_ref();
            let after_content = after.and_then(|image| non_null(image, CONTENT_FIELD));
            if after_content.is_none() {
                return EventDisposition::Invalid(format!(
                    "{} event without after.{}",
                    event.kind, CONTENT_FIELD
                ));
            }

            if event.kind == ChangeKind::Updated {
                let before_content = event
                    .before
                    .as_ref()
                    .and_then(|image| non_null(image, CONTENT_FIELD));
                if before_content == after_content {
                    return EventDisposition::Skip("content unchanged");
                }
            }

            EventDisposition::Proceed
        }
    }
}

/// Index operation derived from one change event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedEvent {
    /// Replace the stored document (create-if-absent).
    Upsert {
        record_id: String,
        document: MessageDocument,
    },
    /// Merge changed fields into the stored document (create-if-absent).
    Merge {
        record_id: String,
        patch: MessagePatch,
    },
    /// Remove the document; absence is success.
    Delete { record_id: String },
}

impl ProcessedEvent {
    /// Id of the document the operation targets.
    pub fn record_id(&self) -> &str {
        match self {
            Self::Upsert { record_id, .. }
            | Self::Merge { record_id, .. }
            | Self::Delete { record_id } => record_id,
        }
    }
}

/// What the processor decided for one event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPlan {
    /// Apply this operation to the index.
    Apply(ProcessedEvent),
    /// Nothing to do.
    Skip { reason: &'static str },
    /// Malformed event, dropped without counting as a failure.
    Invalid { reason: String },
}

/// Processor that transforms change events into index operations.
///
/// The processor is responsible for:
/// - Validating each event once, according to its kind
/// - Shaping full documents for creates and patches for updates
/// - Mapping deletes to document removals
#[derive(Debug, Default, Clone)]
pub struct EventProcessor {
    shaper: DocumentShaper,
}

impl EventProcessor {
    /// Create a new event processor.
    pub fn new() -> Self {
        Self {
            shaper: DocumentShaper::new(),
        }
    }

    /// Process a single change event.
    ///
    /// # Returns
    ///
    /// * `Ok(EventPlan)` - The operation to apply, or why nothing is applied
    /// * `Err(EventError::Shaping)` - A present field could not be shaped
    #[instrument(skip(self, event), fields(record_id = ?event.record_id, kind = %event.kind))]
    pub fn process_event(&self, event: &ChangeEvent) -> Result<EventPlan, EventError> {
        match validate(event) {
            EventDisposition::Proceed => {}
            EventDisposition::Skip(reason) => {
                debug!(reason = reason, "Skipping event");
                return Ok(EventPlan::Skip { reason });
            }
            EventDisposition::Invalid(reason) => {
                debug!(reason = %reason, "Dropping invalid event");
                return Ok(EventPlan::Invalid { reason });
            }
        }

        // validate() guarantees the record id and, for non-deletes, the after image.
        let record_id = event.record_id().unwrap_or_default().to_string();
        let empty = FieldMap::new();
        let after = event.after.as_ref().unwrap_or(&empty);

        let shaped = match event.kind {
            ChangeKind::Created => self
                .shaper
                .shape(&record_id, after)
                .map(|document| ProcessedEvent::Upsert {
                    record_id: record_id.clone(),
                    document,
                }),
            ChangeKind::Updated => self
                .shaper
                .shape_patch(&record_id, event.before.as_ref(), after)
                .map(|patch| ProcessedEvent::Merge {
                    record_id: record_id.clone(),
                    patch,
                }),
            ChangeKind::Deleted => Ok(ProcessedEvent::Delete {
                record_id: record_id.clone(),
            }),
        };

        match shaped {
            Ok(processed) => Ok(EventPlan::Apply(processed)),
            Err(ShapeError::InvalidRecord(reason)) => {
                debug!(reason = %reason, "Dropping invalid event");
                Ok(EventPlan::Invalid { reason })
            }
            Err(ShapeError::Shaping(reason)) => Err(EventError::Shaping(reason)),
        }
    }
}
