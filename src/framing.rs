//! Pulls one MessagePack-framed value at a time off a raw byte stream.
//!
//! Unlike a WebSocket, a raw TCP stream doesn't hand us message boundaries
//! for free — MessagePack's own self-delimiting encoding is what tells us
//! where one frame ends and the next begins, so we buffer until a full
//! value parses and hand back exactly those bytes.

use std::io::Cursor;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Buffers partial reads until one top-level MessagePack value is
/// available, then returns its raw bytes (still encoded — callers decode
/// with the `ff_protocol` type they expect).
pub struct FrameReader<S> {
    stream: S,
    buf: Vec<u8>,
}

impl<S: AsyncRead + Unpin> FrameReader<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    pub async fn read_frame(&mut self) -> std::io::Result<Vec<u8>> {
        loop {
            if !self.buf.is_empty() {
                let mut cursor = Cursor::new(self.buf.as_slice());
                if rmpv::decode::read_value(&mut cursor).is_ok() {
                    let consumed = cursor.position() as usize;
                    let frame = self.buf[..consumed].to_vec();
                    self.buf.drain(..consumed);
                    return Ok(frame);
                }
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream closed before a full frame arrived",
                ));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Recovers the wrapped stream, e.g. to hand it off from the handshake
    /// to the session once ESTABLISHED.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Borrows the wrapped stream, e.g. to write a reply between two reads
    /// without giving up the reader's internal buffer.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}
