//! WebSocket server for panel connections.
//!
//! # Connection Flow
//!
//! 1. Host binds a WebSocket server to `localhost:0` (random port)
//! 2. Host loads the panel with the server URL
//! 3. Panel connects to the WebSocket server
//! 4. Host wraps the connection in a [`Bridge`](crate::Bridge)
//! 5. Panel sends the `initialize` request

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::WebSocketTransport;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for waiting for the panel to connect.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// PendingServer
// ============================================================================

/// A WebSocket server that is bound but not yet connected.
///
/// Represents the state between binding to a port and accepting the
/// panel's connection.
///
/// # Example
///
/// ```ignore
/// use std::net::{IpAddr, Ipv4Addr};
/// use panel_bridge::transport::PendingServer;
///
/// let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
/// let ws_url = server.ws_url();
///
/// // Load the panel with ws_url...
///
/// let transport = server.accept().await?;
/// ```
pub struct PendingServer {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Port the server is bound to.
    port: u16,
    /// How long `accept` waits.
    accept_timeout: Duration,
}

impl PendingServer {
    /// Binds a WebSocket server to the specified address and port.
    ///
    /// Use port 0 to let the OS assign a random available port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let addr = SocketAddr::new(ip, port);
        let listener = TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        debug!(port = actual_port, "WebSocket server bound");

        Ok(Self {
            listener,
            port: actual_port,
            accept_timeout: CONNECTION_TIMEOUT,
        })
    }

    /// Sets how long [`accept`](Self::accept) waits for the panel.
    #[inline]
    #[must_use]
    pub fn with_accept_timeout(mut self, accept_timeout: Duration) -> Self {
        self.accept_timeout = accept_timeout;
        self
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the WebSocket URL for this server.
    ///
    /// Format: `ws://127.0.0.1:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Returns the local socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), self.port)
    }

    /// Accepts the panel's connection.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the panel doesn't connect in time or the
    ///   WebSocket upgrade fails
    /// - [`Error::Io`] if accepting the TCP connection fails
    pub async fn accept(self) -> Result<WebSocketTransport> {
        let (stream, addr) = timeout(self.accept_timeout, self.listener.accept())
            .await
            .map_err(|_| {
                Error::connection(format!(
                    "Panel did not connect within {}ms",
                    self.accept_timeout.as_millis()
                ))
            })??;

        debug!(?addr, "TCP connection accepted");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        info!(port = self.port, "WebSocket connection established");

        Ok(WebSocketTransport::new(ws_stream))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;

    use crate::transport::{Transport, TransportReceiver, TransportSender};

    #[tokio::test]
    async fn test_server_bind_random_port() {
        let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .expect("bind should succeed");

        assert!(server.port() > 0);
        assert_eq!(server.ws_url(), format!("ws://127.0.0.1:{}", server.port()));
        assert_eq!(server.local_addr().port(), server.port());
    }

    #[tokio::test]
    async fn test_accept_times_out_without_client() {
        let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .expect("bind should succeed")
            .with_accept_timeout(Duration::from_millis(20));

        let result = server.accept().await;
        assert!(matches!(result, Err(Error::Connection { .. })));
    }

    #[tokio::test]
    async fn test_text_round_trip_over_websocket() {
        let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .expect("bind should succeed");
        let url = server.ws_url();

        let (host, panel) = tokio::join!(server.accept(), WebSocketTransport::connect(&url));
        let (mut host_tx, mut host_rx) = host.expect("accept").split();
        let (mut panel_tx, mut panel_rx) = panel.expect("connect").split();

        panel_tx.send("hello host".into()).await.expect("send");
        assert_eq!(host_rx.recv().await.expect("open").expect("ok"), "hello host");

        host_tx.send("hello panel".into()).await.expect("send");
        assert_eq!(panel_rx.recv().await.expect("open").expect("ok"), "hello panel");

        host_tx.close().await.expect("close");
        assert!(panel_rx.recv().await.is_none());
    }
}
