//! In-process byte pipe standing in for a socket, mirroring `rt-test-utils`'s
//! `MockWsServer`/`MockWsClient` pair but at the raw-stream layer this crate
//! operates on instead of WebSocket frames.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// One end of an in-memory duplex pipe. Implements the same `AsyncRead` +
/// `AsyncWrite` bounds a real `TcpStream` would, so it satisfies
/// `fluent_forward_client::Stream` without any adapter.
pub struct DuplexStream(tokio::io::DuplexStream);

impl DuplexStream {
    /// Creates a connected pair. `max_buf_size` bounds how much either side
    /// may write before the other end reads it off.
    pub fn pair(max_buf_size: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(max_buf_size);
        (Self(a), Self(b))
    }
}

impl AsyncRead for DuplexStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl AsyncWrite for DuplexStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().0).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_shutdown(cx)
    }
}
