//! NUL-separated message framing
//!
//! The wire format is a plain byte stream segmented by a single `\0` byte.
//! Payloads are UTF-8 JSON, which never contains a raw NUL, so the separator
//! is unambiguous. Buffering per connection is capped at [`MAX_FRAME_LEN`]
//! bytes so a hostile or broken peer cannot grow the buffer without bound.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{IpcError, IpcResult};

/// Frame separator byte
pub const FRAME_SEPARATOR: u8 = 0;

/// Hard cap on buffered bytes per connection (payload + separator)
pub const MAX_FRAME_LEN: usize = 4096;

const READ_CHUNK: usize = 4096;

/// A framed transport over a bidirectional byte stream.
///
/// Generic over the stream so tests can run against `tokio::io::duplex`
/// instead of a real socket.
pub struct FramedStream<S> {
    stream: S,
    buffer: Vec<u8>,
}

impl<S> FramedStream<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
        }
    }

    /// Write one frame: the payload followed by the separator.
    ///
    /// `write_all` retries short writes internally, so the frame is either
    /// fully flushed or the call fails.
    pub async fn send(&mut self, payload: &[u8]) -> IpcResult<()> {
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.extend_from_slice(payload);
        frame.push(FRAME_SEPARATOR);

        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read the next frame, with the separator stripped.
    ///
    /// Returns `Ok(None)` when the peer closed the stream before a complete
    /// frame arrived. Fails with [`IpcError::MessageTooLong`] when buffering
    /// the received bytes would exceed [`MAX_FRAME_LEN`]; the check runs
    /// before the bytes are stored, so a connection never holds more than
    /// the cap.
    pub async fn recv(&mut self) -> IpcResult<Option<Vec<u8>>> {
        loop {
            if let Some(i) = self.buffer.iter().position(|&b| b == FRAME_SEPARATOR) {
                let mut frame: Vec<u8> = self.buffer.drain(..=i).collect();
                frame.pop(); // separator
                return Ok(Some(frame));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            if self.buffer.len() + n > MAX_FRAME_LEN {
                return Err(IpcError::MessageTooLong);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Consume the transport, returning the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}
