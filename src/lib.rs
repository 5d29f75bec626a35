//! Panel Bridge - typed request/response channel to an embedded panel.
//!
//! This library connects a host process to a sandboxed, web-rendered panel
//! that shares no memory with the host. Either side can call typed,
//! asynchronous methods on the other, receive correlated replies, and send
//! one-way notifications.
//!
//! # Architecture
//!
//! The bridge is symmetric: host and panel each run one [`Bridge`] over a
//! text transport.
//!
//! - **Outbound**: [`Bridge::call`] issues a request and awaits the reply
//! - **Inbound**: registered handlers answer requests, listeners observe
//!   notifications
//!
//! Key guarantees:
//!
//! - Every call settles exactly once: response, timeout, or teardown
//! - Every inbound request is answered, even if its handler panics
//! - Late responses after a timeout are dropped
//! - [`Bridge::dispose`] fails every pending call synchronously
//!
//! # Quick Start
//!
//! ```no_run
//! use panel_bridge::transport::ChannelTransport;
//! use panel_bridge::{Bridge, BridgeOptions, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (host_side, panel_side) = ChannelTransport::pair();
//!
//!     let panel = Bridge::new(panel_side, BridgeOptions::default())?;
//!     panel.register_handler("echo", |params: serde_json::Value| async move { Ok(params) })?;
//!     panel.initialize()?;
//!
//!     let host = Bridge::new(host_side, BridgeOptions::default())?;
//!     host.initialize()?;
//!
//!     let reply: serde_json::Value = host.call("echo", serde_json::json!({"v": 1})).await?;
//!     println!("{reply}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`document`] | Handshake and conflict resolution for a document panel |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Request and resource ids |
//! | [`protocol`] | Wire envelopes, codec and error codes |
//! | [`rpc`] | [`Bridge`], pending calls, registry, dispatcher |
//! | [`transport`] | Channel, framed and WebSocket transports |

// ============================================================================
// Modules
// ============================================================================

/// Document layer: handshake and conflict resolution.
///
/// - [`DocumentSession`] - Clean/Dirty state machine for one resource
/// - [`document::handshake`] - the `initialize` exchange
pub mod document;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Identifiers for requests and resources.
pub mod identifiers;

/// Wire protocol: envelopes, codec and error codes.
pub mod protocol;

/// Request/response correlation and dispatch.
///
/// Use [`Bridge::new`] to wrap a transport.
pub mod rpc;

/// Text transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Document types
pub use document::{
    ConflictPrompt, DocumentSession, DocumentState, Handshake, InitialStateProvider, Resolution,
    ResourceStore,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{RequestId, ResourceId};

// Protocol types
pub use protocol::{ErrorCode, RpcError};

// Bridge types
pub use rpc::{Bridge, BridgeOptions};
