//! Tagged field values carried by change-event snapshots.
//!
//! The primary store emits record images where every value carries its
//! primitive type alongside the payload, e.g. `{"S": "hello"}` or
//! `{"N": "1718000000000"}`. Numbers travel as strings so that no precision
//! is lost in transit; callers parse them on demand.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A record image: field name to tagged value.
pub type FieldMap = HashMap<String, AttributeValue>;

/// A single typed value inside a record image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String value.
    #[serde(rename = "S")]
    S(String),
    /// Number, encoded as its decimal string representation.
    #[serde(rename = "N")]
    N(String),
    /// Boolean value.
    #[serde(rename = "BOOL")]
    Bool(bool),
    /// Explicit null. The payload is always `true` on the wire.
    #[serde(rename = "NULL")]
    Null(bool),
    /// Ordered list of values.
    #[serde(rename = "L")]
    L(Vec<AttributeValue>),
    /// Nested map of values.
    #[serde(rename = "M")]
    M(FieldMap),
}

impl AttributeValue {
    /// Short tag name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::Bool(_) => "BOOL",
            Self::Null(_) => "NULL",
            Self::L(_) => "L",
            Self::M(_) => "M",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// Raw numeric text of an `N` value.
    pub fn as_number_str(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }

    /// Parse an `N` value as a signed integer.
    ///
    /// Returns `None` for non-numbers and for numbers that are not integral.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_number_str().and_then(|n| n.trim().parse().ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            Self::L(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            Self::M(map) => Some(map),
            _ => None,
        }
    }

    /// Build a string value.
    pub fn string(value: impl Into<String>) -> Self {
        Self::S(value.into())
    }

    /// Build a number value from anything printable as a number.
    pub fn number(value: impl ToString) -> Self {
        Self::N(value.to_string())
    }

    /// Build an explicit null.
    pub fn null() -> Self {
        Self::Null(true)
    }
}

/// Look up a field, treating an explicit `NULL` the same as an absent field.
pub fn non_null<'a>(fields: &'a FieldMap, name: &str) -> Option<&'a AttributeValue> {
    fields.get(name).filter(|value| !value.is_null())
}
