//! Type-safe identifiers.
//!
//! Newtype wrappers keep request ids and resource ids from being mixed up.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RequestId`] | Correlates a request with its response |
//! | [`ResourceId`] | Identifies the backing resource of a document |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

// ============================================================================
// RequestId
// ============================================================================

/// Identifier correlating a request with its response.
///
/// Ids are opaque: a numeric id and a string id with the same text are
/// different ids. Whatever the remote sent is echoed back unchanged, so
/// numeric ids keep their JSON number form (`u64` ids past `i64::MAX` and
/// `1.0` both survive).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id (locally issued ids are always integers).
    Number(Number),
    /// String id.
    String(String),
}

impl RequestId {
    /// Converts a JSON value into an id.
    ///
    /// Returns `None` for anything other than a number or a string.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    /// Converts the id into its JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::from(s.as_str()),
        }
    }
}

impl From<i64> for RequestId {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for RequestId {
    #[inline]
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RequestId {
    #[inline]
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "\"{s}\""),
        }
    }
}

// ============================================================================
// ResourceId
// ============================================================================

/// Identity of a document's backing resource (usually a path or URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a resource id.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    #[inline]
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
