//! Transport layer.
//!
//! A transport moves whole text messages between the host and the panel.
//! The bridge only needs two capabilities: send one text, and receive the
//! next text. Transports split into a sender half and a receiver half so
//! the bridge can read and write concurrently.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Host (Rust)    │                              │  Panel          │
//! │                 │     channel / pipe / ws      │  (web content)  │
//! │  Bridge         │◄────────────────────────────►│                 │
//! │  → Transport    │        text messages         │  Bridge peer    │
//! │                 │                              │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | In-memory transport over tokio channels |
//! | `framed` | `Content-Length` framed transport over byte streams |
//! | `server` | WebSocket server binding and acceptance |
//! | `websocket` | WebSocket transport |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// In-memory channel transport.
pub mod channel;

/// Header-framed byte stream transport.
pub mod framed;

/// WebSocket server for panel connections.
pub mod server;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::ChannelTransport;
pub use framed::FramedTransport;
pub use server::PendingServer;
pub use websocket::WebSocketTransport;

// ============================================================================
// Traits
// ============================================================================

/// Sending half of a transport.
#[async_trait]
pub trait TransportSender: Send + 'static {
    /// Sends one text message.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Closes the sending side, signalling the peer where possible.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Receiving half of a transport.
///
/// `recv` does not need to be cancel-safe; the bridge drives it from a
/// dedicated task.
#[async_trait]
pub trait TransportReceiver: Send + 'static {
    /// Receives the next text message.
    ///
    /// Returns `None` once the channel is closed.
    async fn recv(&mut self) -> Option<Result<String>>;
}

/// A bidirectional text channel to a single remote endpoint.
pub trait Transport: Send + 'static {
    /// Sending half.
    type Sender: TransportSender;
    /// Receiving half.
    type Receiver: TransportReceiver;

    /// Splits the transport into its halves.
    fn split(self) -> (Self::Sender, Self::Receiver);
}
