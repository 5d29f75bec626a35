//! Host and panel bridges over a real localhost WebSocket.
//!
//! Run with: `cargo test --test websocket_bridge`

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use panel_bridge::document::handshake::{self, InitialState, InitializeParams};
use panel_bridge::document::{PanelConfig, ResourceMetadata};
use panel_bridge::rpc::builtins::{self, METHOD_SYSTEM_INFO, SystemInfo};
use panel_bridge::transport::{PendingServer, WebSocketTransport};
use panel_bridge::{Bridge, BridgeOptions, Error, ErrorCode, InitialStateProvider};

struct StaticState;

#[async_trait]
impl InitialStateProvider for StaticState {
    async fn initial_state(&self, _params: &InitializeParams) -> panel_bridge::Result<InitialState> {
        Ok(InitialState {
            content: "hello".into(),
            metadata: ResourceMetadata::new("greeting.txt"),
            config: PanelConfig::default(),
        })
    }
}

async fn connect() -> Result<(Bridge, Bridge)> {
    let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
    let url = server.ws_url();

    let (accepted, connected) = tokio::join!(server.accept(), WebSocketTransport::connect(&url));

    let host = Bridge::new(accepted?, BridgeOptions::default())?;
    builtins::install(&host)?;
    handshake::install(&host, Arc::new(StaticState))?;
    host.initialize()?;

    let panel = Bridge::new(connected?, BridgeOptions::default())?;
    panel.register_handler("panel/echo", |params: Value| async move { Ok(params) })?;
    panel.initialize()?;

    Ok((host, panel))
}

#[tokio::test]
async fn handshake_and_calls_over_websocket() -> Result<()> {
    let (host, panel) = connect().await?;

    let init = handshake::initialize(&panel, Some("ws-test")).await?;
    assert_eq!(init.content, "hello");

    let system: SystemInfo = panel.call(METHOD_SYSTEM_INFO, ()).await?;
    assert_eq!(system.arch, std::env::consts::ARCH);

    let echoed: Value = host.call("panel/echo", json!({"v": 1})).await?;
    assert_eq!(echoed, json!({"v": 1}));

    host.dispose();
    panel.dispose();
    Ok(())
}

#[tokio::test]
async fn unknown_method_over_websocket() -> Result<()> {
    let (host, _panel) = connect().await?;

    let err = host.call::<_, Value>("panel/missing", ()).await.unwrap_err();
    assert_eq!(err.rpc_code(), Some(ErrorCode::METHOD_NOT_FOUND));
    Ok(())
}

#[tokio::test]
async fn host_dispose_closes_panel_side() -> Result<()> {
    let (host, panel) = connect().await?;

    host.dispose();

    let err = panel.call::<_, Value>(METHOD_SYSTEM_INFO, ()).await.unwrap_err();
    assert!(err.is_connection_error(), "unexpected error: {err}");
    assert!(!matches!(err, Error::RequestTimeout { .. }));
    Ok(())
}
