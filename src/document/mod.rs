//! Document layer built on the bridge.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `collaborators` | Traits the host implements: storage, prompt, initial state |
//! | `conflict` | Clean/Dirty state machine and conflict resolution |
//! | `handshake` | The `initialize` exchange |

// ============================================================================
// Submodules
// ============================================================================

/// Host-provided capabilities.
pub mod collaborators;

/// Conflict resolution state machine.
pub mod conflict;

/// Handshake protocol.
pub mod handshake;

// ============================================================================
// Re-exports
// ============================================================================

pub use collaborators::{ConflictPrompt, InitialStateProvider, Resolution, ResourceStore};
pub use conflict::{
    ConflictSession, DocumentContent, DocumentSession, DocumentState, ExternalChange,
    ExternalChangeOutcome,
};
pub use handshake::{
    Handshake, HandshakeStatus, InitialState, InitializeParams, InitializeResult, PROTOCOL_VERSION,
    PanelConfig, ResourceMetadata, StoreStateProvider,
};
