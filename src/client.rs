//! Client facade (C5): `Connect`/`Disconnect`/`Reconnect` plus
//! the high-level `send_*` helpers callers actually use.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::info;

use ff_protocol::{CompressedPackedForwardMessage, EntryListExt, ForwardMessage, Message, Record, Timestamp};

use crate::chunk::new_chunk_id;
use crate::error::FluentError;
use crate::handshake::{self, AuthInfo};
use crate::session::{Session, SessionTimeouts};
use crate::stream::StreamFactory;

/// Recognized construction fields for [`FluentClient`]. `factory` has no
/// sensible default, so [`ConnectionOptions::new`] takes it explicitly and
/// fills in the documented defaults for everything else: no ack
/// requirement, no timeouts besides `connection_timeout`/`ack_timeout`,
/// keepalive disabled, no credentials (see DESIGN.md).
pub struct ConnectionOptions {
    pub factory: Arc<dyn StreamFactory>,
    pub require_ack: bool,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub connection_timeout: Duration,
    pub ack_timeout: Duration,
    pub keepalive_interval: Option<Duration>,
    pub auth: Option<AuthInfo>,
    pub hostname: String,
}

impl ConnectionOptions {
    pub fn new(factory: Arc<dyn StreamFactory>) -> Self {
        Self {
            factory,
            require_ack: false,
            read_timeout: None,
            write_timeout: None,
            connection_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(30),
            keepalive_interval: None,
            auth: None,
            hostname: String::new(),
        }
    }
}

/// Entry point callers construct and keep around for the lifetime of a
/// logical connection. Holds at most one live [`Session`] at a time.
pub struct FluentClient {
    options: ConnectionOptions,
    session: RwLock<Option<Arc<Session>>>,
}

impl FluentClient {
    pub fn new(options: ConnectionOptions) -> Self {
        FluentClient {
            options,
            session: RwLock::new(None),
        }
    }

    /// Obtains a stream from the factory, drives the handshake if
    /// `AuthInfo` is configured, and installs the resulting session. Errors
    /// with `AlreadyConnected` if a session is already live — use
    /// [`Self::reconnect`] instead.
    pub async fn connect(&self) -> Result<(), FluentError> {
        if self.session.read().await.is_some() {
            return Err(FluentError::AlreadyConnected);
        }
        let session = self.establish().await?;
        *self.session.write().await = Some(Arc::new(session));
        info!("client connected");
        Ok(())
    }

    /// Disconnects any existing session (idempotent, tolerant of none),
    /// then connects fresh. Outstanding `Send`s on the prior session resolve
    /// with `SessionClosed` rather than being silently dropped.
    pub async fn reconnect(&self) -> Result<(), FluentError> {
        self.disconnect().await?;
        let session = self.establish().await?;
        *self.session.write().await = Some(Arc::new(session));
        info!("client reconnected");
        Ok(())
    }

    /// Idempotent; a no-op if no session is live.
    pub async fn disconnect(&self) -> Result<(), FluentError> {
        if let Some(session) = self.session.write().await.take() {
            session.disconnect().await?;
        }
        Ok(())
    }

    async fn establish(&self) -> Result<Session, FluentError> {
        let raw = self.options.factory.connect().await?;
        let stream = match &self.options.auth {
            Some(auth) => {
                handshake::run(raw, &self.options.hostname, auth, self.options.connection_timeout).await?
            }
            None => raw,
        };
        let timeouts = SessionTimeouts {
            read_timeout: self.options.read_timeout,
            write_timeout: self.options.write_timeout,
            ack_timeout: self.options.ack_timeout,
        };
        Ok(Session::new(stream, timeouts, self.options.keepalive_interval))
    }

    /// `Message` variant with an integer-seconds timestamp taken at call
    /// time.
    pub async fn send_message(&self, tag: impl Into<String>, record: Record) -> Result<(), FluentError> {
        let msg = Message {
            tag: tag.into(),
            timestamp: Timestamp::Seconds(now_seconds()),
            record,
            options: self.chunk_options(),
        };
        let mut buf = Vec::new();
        msg.marshal(&mut buf)?;
        self.dispatch(buf, msg.options.and_then(|o| o.chunk)).await
    }

    /// `Message` variant with a nanosecond-precision `EventTime` timestamp.
    pub async fn send_message_ext(&self, tag: impl Into<String>, record: Record) -> Result<(), FluentError> {
        let msg = Message {
            tag: tag.into(),
            timestamp: Timestamp::Ext(ff_protocol::EventTime::now()),
            record,
            options: self.chunk_options(),
        };
        let mut buf = Vec::new();
        msg.marshal(&mut buf)?;
        self.dispatch(buf, msg.options.and_then(|o| o.chunk)).await
    }

    /// `ForwardMessage` variant: an explicit array of `[timestamp, record]`
    /// entries.
    pub async fn send_forward(&self, tag: impl Into<String>, entries: EntryListExt) -> Result<(), FluentError> {
        let msg = ForwardMessage {
            tag: tag.into(),
            entries,
            options: self.chunk_options(),
        };
        let mut buf = Vec::new();
        msg.marshal(&mut buf)?;
        self.dispatch(buf, msg.options.and_then(|o| o.chunk)).await
    }

    /// `PackedForwardMessage` variant: entries streamed into one `bin`
    /// payload.
    pub async fn send_packed(&self, tag: impl Into<String>, entries: &EntryListExt) -> Result<(), FluentError> {
        let chunk = self.fresh_chunk();
        let msg = ff_protocol::PackedForwardMessage::from_entries(tag, entries, chunk.clone())?;
        let mut buf = Vec::new();
        msg.marshal(&mut buf)?;
        self.dispatch(buf, chunk).await
    }

    /// `CompressedPackedForwardMessage` variant: gzip-compressed packed
    /// entries.
    pub async fn send_compressed(&self, tag: impl Into<String>, entries: &EntryListExt) -> Result<(), FluentError> {
        let chunk = self.fresh_chunk();
        let msg = CompressedPackedForwardMessage::from_entries(tag, entries, chunk.clone())?;
        let mut buf = Vec::new();
        msg.marshal(&mut buf)?;
        self.dispatch(buf, chunk).await
    }

    fn fresh_chunk(&self) -> Option<String> {
        self.options.require_ack.then(new_chunk_id)
    }

    fn chunk_options(&self) -> Option<ff_protocol::MessageOptions> {
        self.fresh_chunk().map(|chunk| ff_protocol::MessageOptions {
            size: None,
            chunk: Some(chunk),
            compressed: None,
        })
    }

    /// Clones the current session handle out from under the lock before
    /// awaiting the send, so a slow or never-acked send can't hold up a
    /// concurrent `disconnect`/`reconnect` (see DESIGN.md on Disconnect liveness).
    async fn dispatch(&self, buf: Vec<u8>, chunk: Option<String>) -> Result<(), FluentError> {
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(FluentError::NoActiveSession)?;
        session.send(&buf, chunk).await
    }
}

fn now_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
