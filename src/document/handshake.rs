//! The `initialize` handshake.
//!
//! The panel's first request carries its protocol version. A version
//! mismatch is a hard stop (the panel is most likely running stale cached
//! code) and is rejected before any state is produced. On success a single
//! response carries everything the panel needs to render: content,
//! resource metadata and configuration.
//!
//! [`install`] returns a [`Handshake`] that tracks the outcome. Document
//! sessions attached with it refuse panel traffic until the handshake is
//! accepted, and for good once it was rejected.
//!
//! # Wire Format
//!
//! ```text
//! → {"jsonrpc":"2.0","method":"initialize","params":{"protocolVersion":1,"clientName":"panel"},"id":1}
//! ← {"jsonrpc":"2.0","result":{"protocolVersion":1,"content":"...","metadata":{...},"config":{...}},"id":1}
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::ResourceId;
use crate::protocol::RpcError;
use crate::rpc::Bridge;

use super::collaborators::{InitialStateProvider, ResourceStore};

// ============================================================================
// Constants
// ============================================================================

/// Protocol version spoken by this build.
pub const PROTOCOL_VERSION: u32 = 1;

/// Handshake method name.
pub const METHOD_INITIALIZE: &str = "initialize";

// ============================================================================
// Types
// ============================================================================

/// Params of the `initialize` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version the panel speaks.
    pub protocol_version: u32,
    /// Optional name of the panel, for logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

/// Describes the backing resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    /// Resource identity.
    pub resource: ResourceId,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Content type, e.g. `text/markdown`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Whether edits may be saved.
    #[serde(default)]
    pub read_only: bool,
}

impl ResourceMetadata {
    /// Creates metadata with only the resource identity set.
    #[must_use]
    pub fn new(resource: impl Into<ResourceId>) -> Self {
        Self {
            resource: resource.into(),
            name: None,
            content_type: None,
            read_only: false,
        }
    }
}

/// Panel configuration delivered with the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelConfig {
    /// Theme name, e.g. `dark`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    /// Locale tag, e.g. `en-US`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Localized strings keyed by id.
    #[serde(default)]
    pub strings: BTreeMap<String, String>,
}

/// State produced by an [`InitialStateProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialState {
    /// Initial document content.
    pub content: String,
    /// Resource metadata.
    pub metadata: ResourceMetadata,
    /// Panel configuration.
    pub config: PanelConfig,
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol version spoken by the host.
    pub protocol_version: u32,
    /// Initial document content.
    pub content: String,
    /// Resource metadata.
    pub metadata: ResourceMetadata,
    /// Panel configuration.
    pub config: PanelConfig,
}

impl InitializeResult {
    fn from_state(state: InitialState) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            content: state.content,
            metadata: state.metadata,
            config: state.config,
        }
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// Outcome of the handshake so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// No `initialize` has succeeded yet.
    Pending,
    /// The panel speaks [`PROTOCOL_VERSION`].
    Accepted,
    /// The panel asked for an unsupported version. Final.
    Rejected {
        /// The version the panel asked for.
        requested: u32,
    },
}

/// Shared handshake outcome for one panel connection.
///
/// Clones observe the same status.
#[derive(Debug, Clone)]
pub struct Handshake {
    status: Arc<Mutex<HandshakeStatus>>,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    /// Creates a pending handshake.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: Arc::new(Mutex::new(HandshakeStatus::Pending)),
        }
    }

    /// Returns the current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> HandshakeStatus {
        *self.status.lock()
    }

    /// Returns `true` once the handshake was accepted.
    #[inline]
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.status() == HandshakeStatus::Accepted
    }

    /// Returns the error to answer panel traffic with, if it must be refused.
    ///
    /// - `INVALID_REQUEST` before `initialize` succeeded
    /// - `UNSUPPORTED_VERSION` after a rejected handshake
    #[must_use]
    pub fn refusal(&self) -> Option<RpcError> {
        match self.status() {
            HandshakeStatus::Accepted => None,
            HandshakeStatus::Pending => Some(RpcError::invalid_request(
                "initialize must complete before document requests",
            )),
            HandshakeStatus::Rejected { requested } => {
                Some(RpcError::unsupported_version(requested, PROTOCOL_VERSION))
            }
        }
    }

    /// Local form of [`refusal`](Self::refusal).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] unless the handshake was accepted.
    pub fn ensure_accepted(&self) -> Result<()> {
        match self.refusal() {
            None => Ok(()),
            Some(refusal) => Err(Error::protocol(format!("Handshake not accepted: {}", refusal.message))),
        }
    }

    /// Records a rejection. Returns the version that was rejected first.
    fn reject(&self, requested: u32) -> u32 {
        let mut status = self.status.lock();
        match *status {
            HandshakeStatus::Rejected { requested: first } => first,
            _ => {
                *status = HandshakeStatus::Rejected { requested };
                requested
            }
        }
    }

    /// Marks the handshake accepted unless it was already rejected.
    fn accept(&self) -> std::result::Result<(), RpcError> {
        let mut status = self.status.lock();
        match *status {
            HandshakeStatus::Rejected { requested } => {
                Err(RpcError::unsupported_version(requested, PROTOCOL_VERSION))
            }
            _ => {
                *status = HandshakeStatus::Accepted;
                Ok(())
            }
        }
    }
}

// ============================================================================
// Host side
// ============================================================================

/// Registers the `initialize` handler on `bridge`.
///
/// Returns the [`Handshake`] to hand to
/// [`DocumentSession::attach`](super::DocumentSession::attach).
///
/// # Errors
///
/// Returns [`Error::DuplicateHandler`] if `initialize` is already handled,
/// or [`Error::Config`] after the bridge was initialized.
pub fn install(bridge: &Bridge, provider: Arc<dyn InitialStateProvider>) -> Result<Handshake> {
    let handshake = Handshake::new();
    let shared = handshake.clone();

    bridge.register_handler(METHOD_INITIALIZE, move |params: InitializeParams| {
        let provider = Arc::clone(&provider);
        let handshake = shared.clone();
        async move { handle_initialize(&handshake, provider.as_ref(), params).await }
    })?;

    Ok(handshake)
}

async fn handle_initialize(
    handshake: &Handshake,
    provider: &dyn InitialStateProvider,
    params: InitializeParams,
) -> std::result::Result<InitializeResult, RpcError> {
    let client = params.client_name.as_deref().unwrap_or("unknown");

    if params.protocol_version != PROTOCOL_VERSION {
        warn!(
            requested = params.protocol_version,
            supported = PROTOCOL_VERSION,
            client,
            "Rejecting handshake with unsupported protocol version"
        );
        let requested = handshake.reject(params.protocol_version);
        return Err(RpcError::unsupported_version(requested, PROTOCOL_VERSION));
    }

    if let HandshakeStatus::Rejected { requested } = handshake.status() {
        debug!(requested, client, "Handshake already rejected");
        return Err(RpcError::unsupported_version(requested, PROTOCOL_VERSION));
    }

    let state = provider.initial_state(&params).await?;
    handshake.accept()?;

    info!(client, resource = %state.metadata.resource, "Handshake completed");

    Ok(InitializeResult::from_state(state))
}

/// Serves the handshake from a [`ResourceStore`] with fixed metadata and
/// configuration.
pub struct StoreStateProvider {
    store: Arc<dyn ResourceStore>,
    metadata: ResourceMetadata,
    config: PanelConfig,
}

impl StoreStateProvider {
    /// Creates a provider loading `metadata.resource` from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ResourceStore>, metadata: ResourceMetadata, config: PanelConfig) -> Self {
        Self {
            store,
            metadata,
            config,
        }
    }
}

#[async_trait]
impl InitialStateProvider for StoreStateProvider {
    async fn initial_state(&self, _params: &InitializeParams) -> Result<InitialState> {
        let content = self.store.load(&self.metadata.resource).await?;
        Ok(InitialState {
            content,
            metadata: self.metadata.clone(),
            config: self.config.clone(),
        })
    }
}

// ============================================================================
// Panel side
// ============================================================================

/// Performs the handshake from the panel side.
///
/// # Errors
///
/// - [`Error::Remote`] with `UNSUPPORTED_VERSION` if the host rejects the
///   version
/// - [`Error::Protocol`] if the host answers with another version
/// - any error of [`Bridge::call`]
pub async fn initialize(bridge: &Bridge, client_name: Option<&str>) -> Result<InitializeResult> {
    let params = InitializeParams {
        protocol_version: PROTOCOL_VERSION,
        client_name: client_name.map(str::to_string),
    };

    let result: InitializeResult = bridge.call(METHOD_INITIALIZE, params).await?;

    if result.protocol_version != PROTOCOL_VERSION {
        return Err(Error::protocol(format!(
            "Host answered with protocol version {}, expected {PROTOCOL_VERSION}",
            result.protocol_version
        )));
    }

    Ok(result)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Value, json};

    use crate::protocol::ErrorCode;
    use crate::rpc::BridgeOptions;
    use crate::transport::ChannelTransport;

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InitialStateProvider for CountingProvider {
        async fn initial_state(&self, _params: &InitializeParams) -> Result<InitialState> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut config = PanelConfig {
                theme: Some("dark".into()),
                ..PanelConfig::default()
            };
            config.strings.insert("save".into(), "Save".into());

            Ok(InitialState {
                content: "# Notes".into(),
                metadata: ResourceMetadata::new("notes.md"),
                config,
            })
        }
    }

    fn connected(provider: Arc<CountingProvider>) -> (Bridge, Bridge, Handshake) {
        let (a, b) = ChannelTransport::pair();
        let host = Bridge::new(a, BridgeOptions::default()).expect("host");
        let panel = Bridge::new(b, BridgeOptions::default()).expect("panel");

        let handshake = install(&host, provider).expect("install");
        host.initialize().expect("init host");
        panel.initialize().expect("init panel");
        (host, panel, handshake)
    }

    #[tokio::test]
    async fn test_handshake_delivers_state_in_one_response() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let (_host, panel, handshake) = connected(Arc::clone(&provider));
        assert_eq!(handshake.status(), HandshakeStatus::Pending);

        let result = initialize(&panel, Some("editor")).await.expect("handshake");

        assert_eq!(result.protocol_version, PROTOCOL_VERSION);
        assert_eq!(result.content, "# Notes");
        assert_eq!(result.metadata.resource, ResourceId::new("notes.md"));
        assert_eq!(result.config.theme.as_deref(), Some("dark"));
        assert_eq!(result.config.strings.get("save").map(String::as_str), Some("Save"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(handshake.is_accepted());
        assert!(handshake.refusal().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_version_rejects_before_provider() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let (_host, panel, handshake) = connected(Arc::clone(&provider));

        let err = panel
            .call::<_, Value>(METHOD_INITIALIZE, json!({"protocolVersion": 99}))
            .await
            .unwrap_err();

        assert_eq!(err.rpc_code(), Some(ErrorCode::UNSUPPORTED_VERSION));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(handshake.status(), HandshakeStatus::Rejected { requested: 99 });
    }

    #[tokio::test]
    async fn test_rejection_is_final() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let (_host, panel, handshake) = connected(Arc::clone(&provider));

        let _ = panel
            .call::<_, Value>(METHOD_INITIALIZE, json!({"protocolVersion": 99}))
            .await
            .unwrap_err();
        let err = initialize(&panel, Some("retry")).await.unwrap_err();

        assert_eq!(err.rpc_code(), Some(ErrorCode::UNSUPPORTED_VERSION));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(handshake.status(), HandshakeStatus::Rejected { requested: 99 });
        assert_eq!(
            handshake.refusal().map(|e| e.code),
            Some(ErrorCode::UNSUPPORTED_VERSION)
        );
        assert!(matches!(handshake.ensure_accepted(), Err(Error::Protocol { .. })));
    }

    #[test]
    fn test_pending_handshake_refuses_with_invalid_request() {
        let handshake = Handshake::default();
        assert_eq!(handshake.refusal().map(|e| e.code), Some(ErrorCode::INVALID_REQUEST));
        assert!(handshake.ensure_accepted().is_err());
    }

    #[tokio::test]
    async fn test_missing_version_is_invalid_params() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let (_host, panel, handshake) = connected(Arc::clone(&provider));

        let err = panel
            .call::<_, Value>(METHOD_INITIALIZE, json!({"clientName": "old"}))
            .await
            .unwrap_err();

        assert_eq!(err.rpc_code(), Some(ErrorCode::INVALID_PARAMS));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(handshake.status(), HandshakeStatus::Pending);
    }

    #[test]
    fn test_params_omit_absent_client_name() {
        let params = InitializeParams {
            protocol_version: 1,
            client_name: None,
        };
        assert_eq!(serde_json::to_value(params).expect("ser"), json!({"protocolVersion": 1}));
    }
}
