//! Conflict resolution for a single document.
//!
//! # States
//!
//! ```text
//!            document/didChange               external change
//!   Clean ───────────────────────► Dirty ─────────────────────► Resolving
//!     ▲                              │                              │
//!     └──────── successful save ─────┘                              │
//!     ▲                                                             │
//!     └────────────── Reload / Overwrite / SaveAs ──────────────────┘
//! ```
//!
//! While `Resolving`, mutations are refused: the panel's `document/save`
//! is answered with `RESOURCE_CONFLICT` and [`DocumentSession::save`]
//! returns [`Error::ConflictPending`]. Further external changes are
//! coalesced into the open session. If persisting the chosen resolution
//! fails, the session is dropped and the document is `Dirty` again.
//!
//! Nothing moves before the [`Handshake`] is accepted. Panel requests are
//! refused with the handshake's error, `document/didChange` is ignored, and
//! the host-side operations return [`Error::Protocol`].
//!
//! # Methods
//!
//! | Method | Direction | Kind |
//! |--------|-----------|------|
//! | `document/didChange` | panel → host | notification |
//! | `document/save` | panel → host | request |
//! | `document/load` | panel → host | request |
//! | `document/getContent` | host → panel | request |
//! | `document/externallyChanged` | host → panel | notification |

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::ResourceId;
use crate::protocol::RpcError;
use crate::rpc::Bridge;

use super::collaborators::{ConflictPrompt, Resolution, ResourceStore};
use super::handshake::Handshake;

// ============================================================================
// Constants
// ============================================================================

/// Panel reports a local edit.
pub const METHOD_DID_CHANGE: &str = "document/didChange";

/// Panel asks the host to persist its content.
pub const METHOD_SAVE: &str = "document/save";

/// Panel asks for the persisted content.
pub const METHOD_LOAD: &str = "document/load";

/// Host asks the panel for its current content.
pub const METHOD_GET_CONTENT: &str = "document/getContent";

/// Host tells the panel the resource changed on storage.
pub const METHOD_EXTERNALLY_CHANGED: &str = "document/externallyChanged";

// ============================================================================
// Types
// ============================================================================

/// Edit state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentState {
    /// Memory matches storage.
    Clean,
    /// Memory has unsaved edits.
    Dirty,
    /// A conflict session is open; mutations are refused.
    Resolving,
}

/// Document content on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContent {
    /// Full text of the document.
    pub content: String,
}

/// Params of `document/externallyChanged`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalChange {
    /// The resource that changed.
    pub resource: ResourceId,
}

/// An open conflict between local edits and an external change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSession {
    /// The contested resource.
    pub resource: ResourceId,
    /// Whether local edits were pending when the conflict opened.
    pub dirty: bool,
    /// External changes merged into this session after it opened.
    pub coalesced: u32,
    /// The resolution, once chosen.
    pub resolution: Option<Resolution>,
}

impl ConflictSession {
    fn open(resource: ResourceId) -> Self {
        Self {
            resource,
            dirty: true,
            coalesced: 0,
            resolution: None,
        }
    }
}

/// What [`DocumentSession::external_change`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalChangeOutcome {
    /// The document was clean; the panel was told to reload.
    Notified,
    /// A session was already open; the change was merged into it.
    Coalesced,
    /// A conflict was settled with this resolution.
    Resolved(Resolution),
}

struct SessionState {
    document: DocumentState,
    /// Bumped on every local edit; a save only cleans the revision it saw.
    revision: u64,
    conflict: Option<ConflictSession>,
}

struct SessionInner {
    resource: ResourceId,
    bridge: Bridge,
    store: Arc<dyn ResourceStore>,
    prompt: Arc<dyn ConflictPrompt>,
    handshake: Handshake,
    state: Mutex<SessionState>,
    /// Serializes saves and resolutions.
    ops: tokio::sync::Mutex<()>,
}

// ============================================================================
// DocumentSession
// ============================================================================

/// Host-side state of one document shown in a panel.
///
/// Attach before [`Bridge::initialize`]; the session registers its
/// `document/*` methods on the bridge. External changes are reported by
/// calling [`external_change`](Self::external_change).
#[derive(Clone)]
pub struct DocumentSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSession")
            .field("resource", &self.inner.resource)
            .field("state", &self.state())
            .finish()
    }
}

impl DocumentSession {
    /// Creates a session and registers its methods on `bridge`.
    ///
    /// `handshake` is the value returned by
    /// [`handshake::install`](super::handshake::install) on the same bridge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateHandler`] if the `document/*` methods are
    /// already registered, or [`Error::Config`] after the bridge was
    /// initialized.
    pub fn attach(
        bridge: &Bridge,
        handshake: &Handshake,
        resource: impl Into<ResourceId>,
        store: Arc<dyn ResourceStore>,
        prompt: Arc<dyn ConflictPrompt>,
    ) -> Result<Self> {
        let inner = Arc::new(SessionInner {
            resource: resource.into(),
            bridge: bridge.clone(),
            store,
            prompt,
            handshake: handshake.clone(),
            state: Mutex::new(SessionState {
                document: DocumentState::Clean,
                revision: 0,
                conflict: None,
            }),
            ops: tokio::sync::Mutex::new(()),
        });

        let weak = Arc::downgrade(&inner);
        bridge.register_listener(METHOD_DID_CHANGE, move |_: IgnoredAny| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.handshake.is_accepted() {
                inner.mark_dirty();
            } else {
                debug!(resource = %inner.resource, "Ignoring edit before handshake");
            }
        })?;

        let weak = Arc::downgrade(&inner);
        bridge.register_handler(METHOD_SAVE, move |params: DocumentContent| {
            let weak = weak.clone();
            async move {
                let inner = upgrade(&weak)?;
                inner.persist(Some(params.content)).await?;
                Ok(())
            }
        })?;

        let weak = Arc::downgrade(&inner);
        bridge.register_handler(METHOD_LOAD, move |(): ()| {
            let weak = weak.clone();
            async move {
                let inner = upgrade(&weak)?;
                let content = inner.store.load(&inner.resource).await?;
                Ok(DocumentContent { content })
            }
        })?;

        debug!(resource = %inner.resource, "Document session attached");

        Ok(Self { inner })
    }

    /// Returns the resource this session edits.
    #[inline]
    #[must_use]
    pub fn resource(&self) -> &ResourceId {
        &self.inner.resource
    }

    /// Returns the current edit state.
    #[must_use]
    pub fn state(&self) -> DocumentState {
        self.inner.state.lock().document
    }

    /// Returns the open conflict session, if any.
    #[must_use]
    pub fn conflict(&self) -> Option<ConflictSession> {
        self.inner.state.lock().conflict.clone()
    }

    /// Saves the panel's current content.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] unless the handshake was accepted
    /// - [`Error::ConflictPending`] while a conflict is open
    /// - [`Error::Storage`] if persisting fails
    /// - any error of [`Bridge::call`] while fetching the content
    pub async fn save(&self) -> Result<()> {
        self.inner.persist(None).await
    }

    /// Reports that the resource changed on storage.
    ///
    /// Clean documents only notify the panel. Dirty documents open a
    /// conflict session, ask the [`ConflictPrompt`] for a resolution and
    /// apply it. Returns once the change is handled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] unless the handshake was accepted.
    /// Returns the persistence or transport error if applying the
    /// resolution fails; the document is `Dirty` again afterwards.
    pub async fn external_change(&self) -> Result<ExternalChangeOutcome> {
        let inner = &self.inner;
        inner.handshake.ensure_accepted()?;

        if inner.coalesce() {
            return Ok(ExternalChangeOutcome::Coalesced);
        }

        let _guard = inner.ops.lock().await;

        let conflicted = {
            let mut state = inner.state.lock();
            let current = state.document;
            match current {
                DocumentState::Clean => false,
                DocumentState::Dirty => {
                    state.document = DocumentState::Resolving;
                    state.conflict = Some(ConflictSession::open(inner.resource.clone()));
                    true
                }
                DocumentState::Resolving => {
                    drop(state);
                    inner.coalesce();
                    return Ok(ExternalChangeOutcome::Coalesced);
                }
            }
        };

        if !conflicted {
            inner.notify_external()?;
            debug!(resource = %inner.resource, "External change on clean document");
            return Ok(ExternalChangeOutcome::Notified);
        }

        info!(resource = %inner.resource, "Conflict opened");

        let resolution = inner.prompt.choose(&inner.resource).await;
        if let Some(conflict) = inner.state.lock().conflict.as_mut() {
            conflict.resolution = Some(resolution.clone());
        }

        if let Err(e) = inner.apply(&resolution).await {
            let mut state = inner.state.lock();
            state.document = DocumentState::Dirty;
            state.conflict = None;
            warn!(resource = %inner.resource, ?resolution, error = %e, "Conflict resolution failed");
            return Err(e);
        }

        let session = {
            let mut state = inner.state.lock();
            state.document = DocumentState::Clean;
            state.conflict.take()
        };

        info!(
            resource = %inner.resource,
            ?resolution,
            coalesced = session.map_or(0, |s| s.coalesced),
            "Conflict resolved"
        );

        match resolution {
            Resolution::Reload | Resolution::SaveAs(_) => inner.notify_external()?,
            Resolution::Overwrite => {}
        }

        Ok(ExternalChangeOutcome::Resolved(resolution))
    }
}

/// Upgrades the session for a panel request that passed the handshake.
fn upgrade(weak: &Weak<SessionInner>) -> std::result::Result<Arc<SessionInner>, RpcError> {
    let inner = weak
        .upgrade()
        .ok_or_else(|| RpcError::internal("document session closed"))?;
    if let Some(refusal) = inner.handshake.refusal() {
        debug!(resource = %inner.resource, code = refusal.code.as_i32(), "Refusing document request");
        return Err(refusal);
    }
    Ok(inner)
}

// ============================================================================
// SessionInner
// ============================================================================

impl SessionInner {
    fn mark_dirty(&self) {
        let mut state = self.state.lock();
        state.revision += 1;

        match state.document {
            DocumentState::Clean => {
                state.document = DocumentState::Dirty;
                debug!(resource = %self.resource, "Document dirty");
            }
            DocumentState::Dirty => {}
            DocumentState::Resolving => {
                debug!(resource = %self.resource, "Edit reported while a conflict is open");
            }
        }
    }

    /// Merges an external change into the open session, if there is one.
    fn coalesce(&self) -> bool {
        match self.state.lock().conflict.as_mut() {
            Some(conflict) => {
                conflict.coalesced += 1;
                debug!(resource = %self.resource, coalesced = conflict.coalesced, "External change coalesced");
                true
            }
            None => false,
        }
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.state.lock().document == DocumentState::Resolving {
            return Err(Error::conflict_pending(self.resource.clone()));
        }
        Ok(())
    }

    /// Persists `content`, or the panel's current content when `None`.
    async fn persist(&self, content: Option<String>) -> Result<()> {
        self.handshake.ensure_accepted()?;
        self.ensure_unlocked()?;
        let _guard = self.ops.lock().await;
        self.ensure_unlocked()?;

        let revision = self.state.lock().revision;
        let content = match content {
            Some(content) => content,
            None => self.fetch_local().await?,
        };

        self.store.save(&self.resource, &content).await?;

        let mut state = self.state.lock();
        if state.revision == revision {
            state.document = DocumentState::Clean;
            debug!(resource = %self.resource, "Document saved");
        } else {
            debug!(resource = %self.resource, "Document saved, newer edits pending");
        }
        Ok(())
    }

    async fn apply(&self, resolution: &Resolution) -> Result<()> {
        match resolution {
            Resolution::Reload => Ok(()),
            Resolution::Overwrite => {
                let content = self.fetch_local().await?;
                self.store.save(&self.resource, &content).await
            }
            Resolution::SaveAs(target) => {
                let content = self.fetch_local().await?;
                self.store.save(target, &content).await
            }
        }
    }

    async fn fetch_local(&self) -> Result<String> {
        let local: DocumentContent = self.bridge.call(METHOD_GET_CONTENT, ()).await?;
        Ok(local.content)
    }

    fn notify_external(&self) -> Result<()> {
        self.bridge.notify(
            METHOD_EXTERNALLY_CHANGED,
            ExternalChange {
                resource: self.resource.clone(),
            },
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
