//! Wire protocol types.
//!
//! This module defines the message format exchanged between the host and
//! the embedded panel. Messages are JSON-RPC 2.0 shaped envelopes.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Either | Method call expecting one response |
//! | `Response` | Either | Result or error for a request id |
//! | `Notification` | Either | One-way message, never answered |
//!
//! # Method Naming
//!
//! Methods follow `area/methodName` format:
//!
//! - `initialize`
//! - `document/save`
//! - `document/externallyChanged`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Text encoding and typed decode failures |
//! | `envelope` | Request, Response and Notification types |
//! | `error_code` | Stable error codes and the error object |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope encoding and decoding.
pub mod codec;

/// Envelope message types.
pub mod envelope;

/// Error codes and the structured error object.
pub mod error_code;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{DecodeError, DecodeErrorKind, decode, encode};
pub use envelope::{Envelope, JSONRPC_VERSION, Notification, Outcome, Request, Response};
pub use error_code::{ErrorCode, RpcError};
