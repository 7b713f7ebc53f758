//! The transport boundary the session core consumes.
//!
//! The core never depends on a concrete transport: callers plug in a TCP
//! dialer, a TLS configurator, or a WebSocket upgrader by implementing
//! [`StreamFactory`]. `ff-test-utils` is the only in-tree implementer,
//! backed by an in-process duplex pipe.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::FluentError;

/// A bidirectional byte stream. Any type implementing Tokio's async I/O
/// traits qualifies — `TcpStream`, a `rustls` `TlsStream`, or a WebSocket
/// adapter that exposes its frame payloads as a byte stream all work
/// without the core crate knowing which one it got.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// Produces a fresh, unauthenticated stream on demand. `Connect` and
/// `Reconnect` call this once per attempt; retry policy across attempts is
/// left to the caller (no automatic reconnection policy lives here).
#[async_trait]
pub trait StreamFactory: Send + Sync {
    async fn connect(&self) -> std::result::Result<Box<dyn Stream>, FactoryError>;
}

/// The stream could not be obtained. Carries a `retryable` bit derived from
/// the underlying transport's status code (e.g. the WebSocket upgrade HTTP
/// status) so callers can choose a backoff policy without branching on the
/// status themselves.
#[derive(Debug, Clone)]
pub struct FactoryError {
    pub message: String,
    retryable: bool,
}

/// HTTP statuses that never resolve by retrying the same request.
const NON_RETRYABLE_STATUS_CODES: &[u16] = &[400, 401, 403, 404, 405, 501, 505];

impl FactoryError {
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            retryable,
        }
    }

    /// Classifies a WebSocket upgrade failure by its HTTP status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: !NON_RETRYABLE_STATUS_CODES.contains(&status),
        }
    }

    pub fn retryable(&self) -> bool {
        self.retryable
    }
}

impl std::fmt::Display for FactoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (retryable={})", self.message, self.retryable)
    }
}

impl std::error::Error for FactoryError {}

impl From<FactoryError> for FluentError {
    fn from(e: FactoryError) -> Self {
        FluentError::FactoryError {
            message: e.message,
            retryable: e.retryable,
        }
    }
}
