use thiserror::Error;

/// Failures the wire codec can report.
///
/// Mirrors the "structurally invalid" / "unsupported option value" split the
/// session layer needs to distinguish: the former means the peer sent
/// garbage, the latter means it sent something well-formed this codec
/// doesn't implement.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unsupported compression: {0}")]
    UnsupportedCompression(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
