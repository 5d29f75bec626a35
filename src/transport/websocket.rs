//! WebSocket transport.
//!
//! Each WebSocket text message carries one envelope. Binary, ping and pong
//! frames are ignored; a close frame ends the receive stream.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::{Transport, TransportReceiver, TransportSender};

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Transport over an established WebSocket stream.
pub struct WebSocketTransport<S = TcpStream> {
    stream: WebSocketStream<S>,
}

impl<S> WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an established WebSocket stream.
    #[inline]
    #[must_use]
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

impl WebSocketTransport<MaybeTlsStream<TcpStream>> {
    /// Connects to a WebSocket server as a client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the handshake fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::connection(format!("WebSocket connect to {url} failed: {e}")))?;

        debug!(url, "WebSocket client connected");
        Ok(Self::new(stream))
    }
}

impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Sender = WebSocketSender<S>;
    type Receiver = WebSocketReceiver<S>;

    fn split(self) -> (Self::Sender, Self::Receiver) {
        let (sink, stream) = self.stream.split();
        (WebSocketSender { sink }, WebSocketReceiver { stream })
    }
}

// ============================================================================
// Halves
// ============================================================================

/// Sending half of a [`WebSocketTransport`].
pub struct WebSocketSender<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

#[async_trait]
impl<S> TransportSender for WebSocketSender<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, text: String) -> Result<()> {
        trace!(bytes = text.len(), "WebSocket send");
        self.sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await?;
        Ok(())
    }
}

/// Receiving half of a [`WebSocketTransport`].
pub struct WebSocketReceiver<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> TransportReceiver for WebSocketReceiver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.to_string())),

                Some(Ok(Message::Close(_))) => {
                    debug!("WebSocket closed by remote");
                    return None;
                }

                Some(Err(e)) => return Some(Err(e.into())),

                None => {
                    debug!("WebSocket stream ended");
                    return None;
                }

                // Ignore Binary, Ping, Pong, Frame
                Some(Ok(_)) => {}
            }
        }
    }
}
