//! Header-framed transport over byte streams.
//!
//! Each message is preceded by a `Content-Length` header block:
//!
//! ```text
//! Content-Length: 42\r\n
//! \r\n
//! {"jsonrpc":"2.0","method":"ping"}...
//! ```
//!
//! Works over any `AsyncRead`/`AsyncWrite` pair (pipes, stdio, sockets).
//! Other headers are ignored.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin,
    Stdout,
};
use tracing::{trace, warn};

use crate::error::{Error, Result};

use super::{Transport, TransportReceiver, TransportSender};

// ============================================================================
// Constants
// ============================================================================

/// Header carrying the body length in bytes.
const CONTENT_LENGTH: &str = "content-length";

/// Largest body accepted from the peer.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Longest header line accepted, terminator included.
pub const MAX_HEADER_LINE_BYTES: usize = 8 * 1024;

// ============================================================================
// FramedTransport
// ============================================================================

/// Transport framing messages with `Content-Length` headers.
#[derive(Debug)]
pub struct FramedTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> FramedTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a transport reading from `reader` and writing to `writer`.
    #[inline]
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl FramedTransport<Stdin, Stdout> {
    /// Creates a transport over the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> Transport for FramedTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Sender = FramedSender<W>;
    type Receiver = FramedReceiver<R>;

    fn split(self) -> (Self::Sender, Self::Receiver) {
        (
            FramedSender {
                writer: self.writer,
            },
            FramedReceiver {
                reader: BufReader::new(self.reader),
            },
        )
    }
}

// ============================================================================
// FramedSender
// ============================================================================

/// Sending half of a [`FramedTransport`].
#[derive(Debug)]
pub struct FramedSender<W> {
    writer: W,
}

#[async_trait]
impl<W> TransportSender for FramedSender<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, text: String) -> Result<()> {
        let body = text.as_bytes();
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(body).await?;
        self.writer.flush().await?;

        trace!(bytes = body.len(), "Frame written");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

// ============================================================================
// FramedReceiver
// ============================================================================

/// Receiving half of a [`FramedTransport`].
#[derive(Debug)]
pub struct FramedReceiver<R> {
    reader: BufReader<R>,
}

impl<R> FramedReceiver<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Reads the header block and returns the body length.
    ///
    /// Returns `Ok(None)` on a clean end of stream before any header byte.
    async fn read_headers(&mut self) -> Result<Option<usize>> {
        let mut content_length = None;
        let mut line = String::new();
        let mut first = true;

        loop {
            line.clear();
            let read = (&mut self.reader)
                .take(MAX_HEADER_LINE_BYTES as u64)
                .read_line(&mut line)
                .await?;

            if read == 0 {
                if first {
                    return Ok(None);
                }
                return Err(Error::connection("stream ended inside a frame header"));
            }
            first = false;

            if read == MAX_HEADER_LINE_BYTES && !line.ends_with('\n') {
                return Err(Error::protocol(format!(
                    "frame header line exceeds {MAX_HEADER_LINE_BYTES} bytes"
                )));
            }

            let header = line.trim_end_matches(['\r', '\n']);
            if header.is_empty() {
                break;
            }

            match header.split_once(':') {
                Some((name, value)) if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) => {
                    let length = value.trim().parse::<usize>().map_err(|_| {
                        Error::protocol(format!("invalid Content-Length: {}", value.trim()))
                    })?;
                    content_length = Some(length);
                }
                Some(_) => {}
                None => warn!(header, "Ignoring malformed frame header"),
            }
        }

        content_length
            .map(Some)
            .ok_or_else(|| Error::protocol("frame is missing Content-Length"))
    }
}

#[async_trait]
impl<R> TransportReceiver for FramedReceiver<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Option<Result<String>> {
        let length = match self.read_headers().await {
            Ok(Some(length)) => length,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };

        if length > MAX_FRAME_BYTES {
            return Some(Err(Error::protocol(format!(
                "frame of {length} bytes exceeds limit of {MAX_FRAME_BYTES}"
            ))));
        }

        let mut body = vec![0u8; length];
        if let Err(e) = self.reader.read_exact(&mut body).await {
            return Some(Err(e.into()));
        }

        trace!(bytes = length, "Frame read");

        Some(
            String::from_utf8(body)
                .map_err(|e| Error::protocol(format!("frame is not valid UTF-8: {e}"))),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
