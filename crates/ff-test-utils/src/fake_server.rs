//! A scripted peer that drives the server side of the HELO/PING/PONG
//! handshake and acks forwarded messages on request — the handshake/session
//! analogue of `rt-test-utils`'s `MockWsServer`, but speaking directly over
//! a [`crate::DuplexStream`] half instead of accepting real TCP connections.

use fluent_forward_client::FrameReader;
use ff_protocol::{Ack, Helo, Ping, Pong};
use sha2::{Digest, Sha512};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

fn hexdigest_sha512(parts: &[&[u8]]) -> String {
    let mut hasher = Sha512::new();
    for p in parts {
        hasher.update(p);
    }
    hex::encode(hasher.finalize())
}

/// Drives one side of a scripted Fluent Forward session against a
/// caller-supplied stream half — typically one end of a
/// [`crate::DuplexStream::pair`].
pub struct FakeForwardServer<S> {
    reader: FrameReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> FakeForwardServer<S> {
    pub fn new(stream: S) -> Self {
        Self {
            reader: FrameReader::new(stream),
        }
    }

    /// Sends the opening HELO frame the real handshake driver waits for.
    pub async fn send_helo(&mut self, nonce: &[u8], auth: &[u8], keepalive: bool) -> std::io::Result<()> {
        let helo = Helo {
            nonce: nonce.to_vec(),
            auth: auth.to_vec(),
            keepalive,
        };
        let mut buf = Vec::new();
        helo.marshal(&mut buf).expect("HELO always marshals");
        self.reader.get_mut().write_all(&buf).await
    }

    /// Reads the client's PING in response to the HELO just sent.
    pub async fn recv_ping(&mut self) -> Ping {
        let frame = self.reader.read_frame().await.expect("stream closed before PING");
        Ping::unmarshal(&frame).expect("expected a PING frame").0
    }

    /// Computes the digest a correctly-configured client's PING should
    /// carry, and the one a correctly-configured server's PONG should carry
    /// — both directions use the same formula, just with the two
    /// hostnames swapped.
    pub fn expected_digest(salt: &[u8], hostname: &[u8], nonce: &[u8], shared_key: &[u8]) -> String {
        hexdigest_sha512(&[salt, hostname, nonce, shared_key])
    }

    /// Sends a PONG. Callers build `shared_key_hexdigest` with
    /// [`Self::expected_digest`] (using the *server's* hostname) to produce
    /// a happy-path reply, or any other string to script a peer-key
    /// mismatch (S7).
    pub async fn send_pong(
        &mut self,
        ok: bool,
        reason: &str,
        server_hostname: &str,
        shared_key_hexdigest: &str,
    ) -> std::io::Result<()> {
        let pong = Pong {
            ok,
            reason: reason.to_owned(),
            server_hostname: server_hostname.to_owned(),
            shared_key_hexdigest: shared_key_hexdigest.to_owned(),
        };
        let mut buf = Vec::new();
        pong.marshal(&mut buf).expect("PONG always marshals");
        self.reader.get_mut().write_all(&buf).await
    }

    /// Reads one raw MessagePack frame off the stream — a forwarded
    /// message, a keepalive, or anything else the client wrote.
    pub async fn recv_frame(&mut self) -> Vec<u8> {
        self.reader.read_frame().await.expect("stream closed before a frame arrived")
    }

    /// Writes an ack frame `{"ack": chunk}` back to the client.
    pub async fn send_ack(&mut self, chunk: &str) -> std::io::Result<()> {
        let ack = Ack { chunk: chunk.to_owned() };
        let mut buf = Vec::new();
        ack.marshal(&mut buf).expect("ack always marshals");
        self.reader.get_mut().write_all(&buf).await
    }
}
