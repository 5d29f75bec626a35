//! Request/response correlation and dispatch.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `bridge` | Public [`Bridge`] handle and event loop |
//! | `builtins` | `host/*` methods every host can expose |
//! | `dispatcher` | Classifies and routes inbound messages |
//! | `options` | [`BridgeOptions`] |
//! | `pending` | Outbound calls awaiting a response |
//! | `registry` | Handlers and listeners for inbound calls |

// ============================================================================
// Submodules
// ============================================================================

/// Bridge handle and event loop.
pub mod bridge;

/// Built-in host methods.
pub mod builtins;

/// Inbound message dispatch.
pub mod dispatcher;

/// Bridge configuration.
pub mod options;

/// Pending-call table.
pub mod pending;

/// Method registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::Bridge;
pub use dispatcher::{Dispatch, Dispatcher};
pub use options::BridgeOptions;
pub use pending::{CloseReason, PendingCalls, PendingReply};
pub use registry::{HandlerFuture, MethodRegistry};
