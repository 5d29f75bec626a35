//! Error types for panel-bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use panel_bridge::{Bridge, Result};
//!
//! async fn example(bridge: &Bridge) -> Result<()> {
//!     let version: String = bridge.call("host/version", ()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::DuplicateHandler`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::Disposed`] |
//! | Protocol | [`Error::Protocol`], [`Error::Remote`] |
//! | Execution | [`Error::RequestTimeout`] |
//! | Document | [`Error::ConflictPending`], [`Error::Storage`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{RequestId, ResourceId};
use crate::protocol::{ErrorCode, RpcError};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Callers can tell a remote refusal ([`Error::Remote`]) apart from a local
/// timeout ([`Error::RequestTimeout`]) and a closed channel
/// ([`Error::ConnectionClosed`], [`Error::Disposed`]).
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when bridge options are invalid or setup is misordered.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// A request handler is already registered for this method.
    #[error("Handler already registered for method: {method}")]
    DuplicateHandler {
        /// The method registered twice.
        method: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport failure.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The transport closed while the call was pending.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The bridge was disposed while the call was pending.
    #[error("Bridge disposed")]
    Disposed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or local protocol limit.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The remote answered with an error response.
    #[error("Remote error: {0}")]
    Remote(RpcError),

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// No response arrived before the call's timeout elapsed.
    #[error("Request {request_id} ({method}) timed out after {elapsed_ms}ms")]
    RequestTimeout {
        /// The request id that timed out.
        request_id: RequestId,
        /// Method of the timed-out call.
        method: String,
        /// Milliseconds elapsed since the call was issued.
        elapsed_ms: u64,
    },

    // ========================================================================
    // Document Errors
    // ========================================================================
    /// The resource is locked by an unresolved conflict.
    #[error("Conflict pending for resource: {resource}")]
    ConflictPending {
        /// The locked resource.
        resource: ResourceId,
    },

    /// The persistence collaborator failed.
    #[error("Storage error for {resource}: {message}")]
    Storage {
        /// The resource being read or written.
        resource: ResourceId,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a duplicate handler error.
    #[inline]
    pub fn duplicate_handler(method: impl Into<String>) -> Self {
        Self::DuplicateHandler {
            method: method.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(
        request_id: RequestId,
        method: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self::RequestTimeout {
            request_id,
            method: method.into(),
            elapsed_ms,
        }
    }

    /// Creates a conflict pending error.
    #[inline]
    pub fn conflict_pending(resource: ResourceId) -> Self {
        Self::ConflictPending { resource }
    }

    /// Creates a storage error.
    #[inline]
    pub fn storage(resource: ResourceId, message: impl Into<String>) -> Self {
        Self::Storage {
            resource,
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::Disposed
                | Self::ChannelClosed(_)
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the remote explicitly refused the call.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Returns the wire error code of a remote refusal.
    #[inline]
    #[must_use]
    pub fn rpc_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Remote(error) => Some(error.code),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("pipe broken");
        assert_eq!(err.to_string(), "Connection failed: pipe broken");
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::request_timeout(RequestId::from(4), "slow", 10);
        assert_eq!(err.to_string(), "Request 4 (slow) timed out after 10ms");
        assert!(err.is_timeout());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("x").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::Disposed.is_connection_error());
        assert!(!Error::config("x").is_connection_error());
    }

    #[test]
    fn test_remote_code() {
        let err = Error::Remote(RpcError::method_not_found("nope"));
        assert!(err.is_remote());
        assert_eq!(err.rpc_code(), Some(ErrorCode::METHOD_NOT_FOUND));
        assert_eq!(Error::Disposed.rpc_code(), None);
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
