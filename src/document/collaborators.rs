//! Capabilities the document layer consumes from the host application.
//!
//! File I/O, change detection and dialogs live outside this crate; the host
//! provides them through these traits.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identifiers::ResourceId;

use super::handshake::{InitialState, InitializeParams};

// ============================================================================
// Resolution
// ============================================================================

/// How a conflict between local edits and an external change is settled.
///
/// There is no option to keep editing: memory and storage must agree again
/// before further local edits are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "camelCase")]
pub enum Resolution {
    /// Discard local edits and show the external version.
    Reload,
    /// Persist local edits over the external version.
    Overwrite,
    /// Persist local edits to another resource, then reload the original.
    SaveAs(ResourceId),
}

// ============================================================================
// Traits
// ============================================================================

/// Persistence for the backing resource.
#[async_trait]
pub trait ResourceStore: Send + Sync + 'static {
    /// Loads the current content of `resource`.
    async fn load(&self, resource: &ResourceId) -> Result<String>;

    /// Replaces the content of `resource`.
    async fn save(&self, resource: &ResourceId, content: &str) -> Result<()>;
}

/// Asks the user how to settle a conflict.
#[async_trait]
pub trait ConflictPrompt: Send + Sync + 'static {
    /// Returns exactly one resolution for `resource`.
    async fn choose(&self, resource: &ResourceId) -> Resolution;
}

/// Produces the state sent in the handshake response.
#[async_trait]
pub trait InitialStateProvider: Send + Sync + 'static {
    /// Returns the content, metadata and configuration for the panel.
    ///
    /// Only called after the protocol version was accepted.
    async fn initial_state(&self, params: &InitializeParams) -> Result<InitialState>;
}

// ============================================================================
// Tests
// ============================================================================
