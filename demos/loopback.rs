//! Host and panel bridges wired together in one process.
//!
//! Demonstrates:
//! - Built-in `host/*` methods
//! - The `initialize` handshake
//! - A local edit, an external change, and conflict resolution
//!
//! Usage:
//!   cargo run --example loopback
//!   cargo run --example loopback -- --debug
//!   RUST_LOG=panel_bridge=trace cargo run --example loopback

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing_subscriber::EnvFilter;

use panel_bridge::document::conflict::{
    DocumentContent, ExternalChange, METHOD_DID_CHANGE, METHOD_EXTERNALLY_CHANGED,
    METHOD_GET_CONTENT,
};
use panel_bridge::document::handshake;
use panel_bridge::document::{PanelConfig, ResourceMetadata, StoreStateProvider};
use panel_bridge::rpc::builtins::{self, LogLine, METHOD_LOG, METHOD_VERSION, VersionInfo};
use panel_bridge::transport::ChannelTransport;
use panel_bridge::{
    Bridge, BridgeOptions, ConflictPrompt, DocumentSession, Error, Resolution, ResourceId,
    ResourceStore, Result,
};

// ============================================================================
// Constants
// ============================================================================

const DOCUMENT: &str = "notes.md";

// ============================================================================
// Collaborators
// ============================================================================

#[derive(Default)]
struct MemoryStore {
    docs: Mutex<FxHashMap<ResourceId, String>>,
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn load(&self, resource: &ResourceId) -> Result<String> {
        self.docs
            .lock()
            .get(resource)
            .cloned()
            .ok_or_else(|| Error::storage(resource.clone(), "not found"))
    }

    async fn save(&self, resource: &ResourceId, content: &str) -> Result<()> {
        self.docs.lock().insert(resource.clone(), content.to_string());
        Ok(())
    }
}

struct AlwaysOverwrite;

#[async_trait]
impl ConflictPrompt for AlwaysOverwrite {
    async fn choose(&self, resource: &ResourceId) -> Resolution {
        println!("    [prompt] {resource} changed on disk; keeping local edits");
        Resolution::Overwrite
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|a| a == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if debug {
            "panel_bridge=debug".to_string()
        } else {
            "panel_bridge=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run() -> Result<()> {
    println!("=== Loopback ===\n");

    let (host_side, panel_side) = ChannelTransport::pair();

    // ========================================================================
    // Host
    // ========================================================================

    println!("[1] Setting up host...");

    let store = Arc::new(MemoryStore::default());
    store
        .docs
        .lock()
        .insert(ResourceId::new(DOCUMENT), "# Notes\n".to_string());

    let host = Bridge::new(host_side, BridgeOptions::from_env())?;
    builtins::install(&host)?;

    let metadata = ResourceMetadata {
        content_type: Some("text/markdown".into()),
        ..ResourceMetadata::new(DOCUMENT)
    };
    let config = PanelConfig {
        theme: Some("dark".into()),
        locale: Some("en-US".into()),
        ..PanelConfig::default()
    };
    let accepted = handshake::install(
        &host,
        Arc::new(StoreStateProvider::new(store.clone(), metadata, config)),
    )?;

    let session = DocumentSession::attach(
        &host,
        &accepted,
        DOCUMENT,
        store.clone(),
        Arc::new(AlwaysOverwrite),
    )?;
    host.initialize()?;

    println!("    ✓ Host ready\n");

    // ========================================================================
    // Panel
    // ========================================================================

    println!("[2] Setting up panel...");

    let panel = Bridge::new(panel_side, BridgeOptions::default())?;
    let buffer = Arc::new(Mutex::new(String::new()));

    let local = Arc::clone(&buffer);
    panel.register_handler(METHOD_GET_CONTENT, move |(): ()| {
        let content = local.lock().clone();
        async move { Ok(DocumentContent { content }) }
    })?;
    panel.register_listener(METHOD_EXTERNALLY_CHANGED, |change: ExternalChange| {
        println!("    [panel] {} changed externally, reloading", change.resource);
    })?;
    panel.initialize()?;

    println!("    ✓ Panel ready\n");

    // ========================================================================
    // Handshake
    // ========================================================================

    println!("[3] Handshake...");

    let init = handshake::initialize(&panel, Some("loopback-panel")).await?;
    *buffer.lock() = init.content.clone();

    println!("    protocol: v{}", init.protocol_version);
    println!("    content: {:?}", init.content);
    println!("    theme: {:?}\n", init.config.theme);

    let version: VersionInfo = panel.call(METHOD_VERSION, ()).await?;
    println!("    host: {} {}\n", version.name, version.version);

    panel.notify(
        METHOD_LOG,
        LogLine {
            level: "info".into(),
            message: "panel rendered".into(),
        },
    )?;

    // ========================================================================
    // Edit + external change
    // ========================================================================

    println!("[4] Editing in the panel...");

    buffer.lock().push_str("- buy milk\n");
    panel.notify(METHOD_DID_CHANGE, ())?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    println!("    state: {:?}\n", session.state());

    println!("[5] File changed on disk...");

    store
        .docs
        .lock()
        .insert(ResourceId::new(DOCUMENT), "# Notes (edited elsewhere)\n".to_string());
    let outcome = session.external_change().await?;

    println!("    outcome: {outcome:?}");
    println!("    state: {:?}", session.state());
    println!("    on disk: {:?}\n", store.load(&ResourceId::new(DOCUMENT)).await?);

    // ========================================================================
    // Teardown
    // ========================================================================

    println!("[6] Disposing...");

    panel.dispose();
    host.dispose();

    println!("    ✓ Done");

    Ok(())
}
