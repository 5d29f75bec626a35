//! Wire error codes and the structured error object.
//!
//! Codes follow the JSON-RPC 2.0 reserved range. Callers branch on the
//! integer value, never on the message text.
//!
//! | Code | Constant | Meaning |
//! |------|----------|---------|
//! | -32700 | [`ErrorCode::PARSE_ERROR`] | Text is not valid JSON |
//! | -32600 | [`ErrorCode::INVALID_REQUEST`] | JSON does not match an envelope shape |
//! | -32601 | [`ErrorCode::METHOD_NOT_FOUND`] | No handler for the method |
//! | -32602 | [`ErrorCode::INVALID_PARAMS`] | Params do not match the handler's input |
//! | -32603 | [`ErrorCode::INTERNAL_ERROR`] | Handler failed or panicked |
//! | -32000 | [`ErrorCode::UNSUPPORTED_VERSION`] | Handshake version not supported |
//! | -32001 | [`ErrorCode::RESOURCE_CONFLICT`] | Document is locked by an open conflict |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// ErrorCode
// ============================================================================

/// Integer error code carried in an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: Self = Self(-32700);
    /// The JSON sent is not a valid envelope.
    pub const INVALID_REQUEST: Self = Self(-32600);
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: Self = Self(-32601);
    /// Invalid method parameters.
    pub const INVALID_PARAMS: Self = Self(-32602);
    /// Internal handler error.
    pub const INTERNAL_ERROR: Self = Self(-32603);
    /// Handshake protocol version is not supported.
    pub const UNSUPPORTED_VERSION: Self = Self(-32000);
    /// The resource is locked while a conflict is being resolved.
    pub const RESOURCE_CONFLICT: Self = Self(-32001);

    /// Returns the raw integer value.
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Returns the symbolic name for well-known codes.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            -32700 => Some("ParseError"),
            -32600 => Some("InvalidRequest"),
            -32601 => Some("MethodNotFound"),
            -32602 => Some("InvalidParams"),
            -32603 => Some("InternalError"),
            -32000 => Some("UnsupportedVersion"),
            -32001 => Some("ResourceConflict"),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({name})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

// ============================================================================
// RpcError
// ============================================================================

/// Structured error object carried in an error response.
///
/// Handlers return this to refuse a request with a specific code; remote
/// refusals surface to callers as [`crate::Error::Remote`].
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct RpcError {
    /// Error code.
    pub code: ErrorCode,
    /// Human readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Creates an error with the given code and message.
    #[inline]
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured detail.
    #[inline]
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Creates a parse error.
    #[inline]
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PARSE_ERROR, message)
    }

    /// Creates an invalid request error.
    #[inline]
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_REQUEST, message)
    }

    /// Creates a method not found error.
    #[inline]
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    /// Creates an invalid params error.
    #[inline]
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message)
    }

    /// Creates an internal error.
    #[inline]
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message)
    }

    /// Creates an unsupported protocol version error.
    #[inline]
    #[must_use]
    pub fn unsupported_version(requested: u32, supported: u32) -> Self {
        Self::new(
            ErrorCode::UNSUPPORTED_VERSION,
            format!("Unsupported protocol version {requested} (supported: {supported})"),
        )
        .with_data(serde_json::json!({
            "requested": requested,
            "supported": supported,
        }))
    }

    /// Creates a resource conflict error.
    #[inline]
    #[must_use]
    pub fn resource_conflict(resource: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::RESOURCE_CONFLICT,
            format!("Resource {resource} has an unresolved conflict"),
        )
    }
}

impl From<crate::error::Error> for RpcError {
    fn from(err: crate::error::Error) -> Self {
        match err {
            crate::error::Error::Remote(inner) => inner,
            crate::error::Error::ConflictPending { resource } => Self::resource_conflict(resource),
            other => Self::internal(other.to_string()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
