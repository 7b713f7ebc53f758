use thiserror::Error;

/// Error taxonomy for the session layer.
#[derive(Debug, Error)]
pub enum FluentError {
    #[error(transparent)]
    Protocol(#[from] ff_protocol::ProtocolError),

    /// Registry insertion collision. Should never occur with freshly minted
    /// chunk IDs; surfaced rather than panicking so a misbehaving caller
    /// supplying its own chunk ID sees a clean error.
    #[error("duplicate chunk id: {0}")]
    DuplicateChunkId(String),

    #[error("no active session")]
    NoActiveSession,

    #[error("ack timed out")]
    Timeout,

    #[error("session closed: {0}")]
    SessionClosed(String),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("stream factory error (retryable={retryable}): {message}")]
    FactoryError { message: String, retryable: bool },

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("client is already connected; use reconnect()")]
    AlreadyConnected,
}

pub type Result<T> = std::result::Result<T, FluentError>;
