//! In-memory transport over tokio channels.
//!
//! Used to connect two bridges in the same process, and to adapt
//! callback-style embedding APIs: the host pushes received text into an
//! `UnboundedSender<String>` and forwards outgoing text to the panel.
//!
//! # Example
//!
//! ```ignore
//! use panel_bridge::transport::ChannelTransport;
//!
//! let (host_side, panel_side) = ChannelTransport::pair();
//! ```

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};

use super::{Transport, TransportReceiver, TransportSender};

// ============================================================================
// ChannelTransport
// ============================================================================

/// Transport backed by a pair of unbounded channels.
#[derive(Debug)]
pub struct ChannelTransport {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<String>,
}

impl ChannelTransport {
    /// Creates a transport from raw channel ends.
    #[inline]
    #[must_use]
    pub fn new(
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self { outgoing, incoming }
    }

    /// Creates two connected transports.
    ///
    /// Text sent on one is received on the other.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, b_rx), Self::new(b_tx, a_rx))
    }
}

impl Transport for ChannelTransport {
    type Sender = ChannelSender;
    type Receiver = ChannelReceiver;

    fn split(self) -> (Self::Sender, Self::Receiver) {
        (
            ChannelSender {
                tx: Some(self.outgoing),
            },
            ChannelReceiver { rx: self.incoming },
        )
    }
}

// ============================================================================
// Halves
// ============================================================================

/// Sending half of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelSender {
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl TransportSender for ChannelSender {
    async fn send(&mut self, text: String) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::ConnectionClosed)?;
        trace!(bytes = text.len(), "Channel send");
        tx.send(text).map_err(|_| Error::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the sender ends the peer's receive stream.
        self.tx = None;
        Ok(())
    }
}

/// Receiving half of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl TransportReceiver for ChannelReceiver {
    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_is_connected_both_ways() {
        let (a, b) = ChannelTransport::pair();
        let (mut a_tx, mut a_rx) = a.split();
        let (mut b_tx, mut b_rx) = b.split();

        a_tx.send("ping".into()).await.expect("send");
        assert_eq!(b_rx.recv().await.expect("open").expect("ok"), "ping");

        b_tx.send("pong".into()).await.expect("send");
        assert_eq!(a_rx.recv().await.expect("open").expect("ok"), "pong");
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream() {
        let (a, b) = ChannelTransport::pair();
        let (mut a_tx, _a_rx) = a.split();
        let (_b_tx, mut b_rx) = b.split();

        a_tx.close().await.expect("close");
        assert!(b_rx.recv().await.is_none());
        assert!(matches!(a_tx.send("late".into()).await, Err(Error::ConnectionClosed)));
    }
}
