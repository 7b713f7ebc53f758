//! Handshake state machine (C4).
//!
//! ```text
//!   INIT ── receive HELO ──► HELO_RECEIVED
//!        │                    │
//!        │                    └─ send PING ──► PING_SENT
//!        │                                     │
//!        │                                     └─ receive PONG(ok=true)  ──► ESTABLISHED
//!        │                                     └─ receive PONG(ok=false) ──► FAILED(reason)
//!        └─ receive any other frame ──► FAILED("unexpected frame")
//!   any state: stream read error ──► FAILED(stream_error)
//!   any state: deadline reached    ──► FAILED("handshake timeout")
//! ```

use std::time::Duration;

use ff_protocol::{Helo, Ping, Pong};
use sha2::{Digest, Sha512};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use crate::error::FluentError;
use crate::framing::FrameReader;
use crate::stream::Stream;

/// Credentials for the shared-key / optional user handshake. Derived values
/// (the two hex digests) are computed fresh per handshake and never
/// retained.
#[derive(Debug, Clone, Default)]
pub struct AuthInfo {
    pub shared_key_salt: Vec<u8>,
    pub shared_key: Vec<u8>,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn hexdigest_sha512(parts: &[&[u8]]) -> String {
    let mut hasher = Sha512::new();
    for p in parts {
        hasher.update(p);
    }
    hex::encode(hasher.finalize())
}

/// Drives HELO → PING → PONG over `stream` to ESTABLISHED, or returns
/// `HandshakeFailed`. On any failure the caller is responsible for closing
/// the stream (§4.4: "terminal states release the stream with Close").
pub async fn run<S>(
    mut stream: S,
    hostname: &str,
    auth: &AuthInfo,
    deadline: Duration,
) -> Result<S, FluentError>
where
    S: Stream,
{
    timeout(deadline, drive(&mut stream, hostname, auth))
        .await
        .map_err(|_elapsed| FluentError::HandshakeFailed("handshake timeout".into()))??;
    Ok(stream)
}

async fn drive<S>(stream: &mut S, hostname: &str, auth: &AuthInfo) -> Result<(), FluentError>
where
    S: Stream,
{
    let mut reader = FrameReader::new(stream);

    // INIT -> HELO_RECEIVED
    let frame = reader
        .read_frame()
        .await
        .map_err(|e| FluentError::HandshakeFailed(format!("stream error: {e}")))?;
    let helo = match Helo::unmarshal(&frame) {
        Ok((helo, _tail)) => helo,
        Err(_) => return Err(FluentError::HandshakeFailed("unexpected frame".into())),
    };

    // HELO_RECEIVED -> PING_SENT
    let shared_key_hexdigest = hexdigest_sha512(&[
        &auth.shared_key_salt,
        hostname.as_bytes(),
        &helo.nonce,
        &auth.shared_key,
    ]);
    let (username, password_hexdigest) = if helo.auth.is_empty() {
        (String::new(), String::new())
    } else {
        let username = auth.username.clone().unwrap_or_default();
        let password = auth.password.clone().unwrap_or_default();
        let digest = hexdigest_sha512(&[&helo.auth, username.as_bytes(), password.as_bytes()]);
        (username, digest)
    };
    let ping = Ping {
        hostname: hostname.to_owned(),
        shared_key_salt: auth.shared_key_salt.clone(),
        shared_key_hexdigest,
        username,
        password_hexdigest,
    };
    let mut buf = Vec::new();
    ping.marshal(&mut buf)?;
    reader
        .get_mut()
        .write_all(&buf)
        .await
        .map_err(|e| FluentError::HandshakeFailed(format!("stream error: {e}")))?;

    // PING_SENT -> ESTABLISHED | FAILED
    let frame = reader
        .read_frame()
        .await
        .map_err(|e| FluentError::HandshakeFailed(format!("stream error: {e}")))?;
    let pong = match Pong::unmarshal(&frame) {
        Ok((pong, _tail)) => pong,
        Err(_) => return Err(FluentError::HandshakeFailed("unexpected frame".into())),
    };

    let expected_server_digest = hexdigest_sha512(&[
        &auth.shared_key_salt,
        pong.server_hostname.as_bytes(),
        &helo.nonce,
        &auth.shared_key,
    ]);
    // Checked unconditionally, regardless of `ok`.
    if expected_server_digest != pong.shared_key_hexdigest {
        return Err(FluentError::HandshakeFailed("peer key mismatch".into()));
    }
    if !pong.ok {
        let reason = if pong.reason.is_empty() {
            "rejected".to_owned()
        } else {
            pong.reason
        };
        return Err(FluentError::HandshakeFailed(reason));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_manual_sha512_concatenation() {
        let salt = b"salt".to_vec();
        let host = b"host".to_vec();
        let nonce = b"nonce".to_vec();
        let key = b"key".to_vec();
        let got = hexdigest_sha512(&[&salt, &host, &nonce, &key]);

        let mut hasher = Sha512::new();
        hasher.update(&salt);
        hasher.update(&host);
        hasher.update(&nonce);
        hasher.update(&key);
        let want = hex::encode(hasher.finalize());
        assert_eq!(got, want);
    }
}
