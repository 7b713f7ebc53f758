//! Session (C3): owns one live connection after the handshake
//! hands it over, runs the reader and optional keepalive tasks, and exposes
//! `send`/`send_raw`/`disconnect` to the client facade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{split, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ack::{AckOutcome, AckRegistry};
use crate::error::FluentError;
use crate::framing::FrameReader;
use crate::stream::Stream;
use ff_protocol::Ack;

type BoxedStream = Box<dyn Stream>;

/// A live Fluent Forward connection. Constructed by [`crate::client`] once
/// the handshake (if any) has completed; the caller never touches the
/// underlying stream again.
pub struct Session {
    writer: Arc<Mutex<WriteHalf<BoxedStream>>>,
    acks: Arc<AckRegistry>,
    reader: Mutex<Option<JoinHandle<()>>>,
    keepalive: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
    first_error: Arc<Mutex<Option<String>>>,
    ack_timeout: Duration,
    write_timeout: Option<Duration>,
}

/// Tuning knobs threaded down from `ConnectionOptions` at session creation.
/// `read_timeout`/`write_timeout` bound individual stream operations;
/// `ack_timeout` bounds how long a `Send` waits once bytes are on the wire.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub ack_timeout: Duration,
}

impl Session {
    /// Takes ownership of `stream`, splitting it into independent read and
    /// write halves so the reader task and caller writes never contend.
    /// `keepalive_interval = None` disables the keepalive task (the
    /// documented default).
    pub fn new(stream: BoxedStream, timeouts: SessionTimeouts, keepalive_interval: Option<Duration>) -> Self {
        let (read_half, write_half) = split(stream);
        let writer = Arc::new(Mutex::new(write_half));
        let acks = Arc::new(AckRegistry::new());
        let closed = Arc::new(AtomicBool::new(false));
        let first_error = Arc::new(Mutex::new(None));

        let reader = spawn_reader(
            read_half,
            acks.clone(),
            closed.clone(),
            first_error.clone(),
            timeouts.read_timeout,
        );
        let keepalive = keepalive_interval.map(|interval| spawn_keepalive(writer.clone(), closed.clone(), interval));

        Session {
            writer,
            acks,
            reader: Mutex::new(Some(reader)),
            keepalive: Mutex::new(keepalive),
            closed,
            first_error,
            ack_timeout: timeouts.ack_timeout,
            write_timeout: timeouts.write_timeout,
        }
    }

    /// Writes `bytes` through the single-writer lock, then — if
    /// `chunk_id` is `Some` — registers with the ack registry and blocks
    /// until the matching ack, a timeout, or session shutdown.
    pub async fn send(&self, bytes: &[u8], chunk_id: Option<String>) -> Result<(), FluentError> {
        let Some(chunk_id) = chunk_id else {
            return self.send_raw(bytes).await;
        };

        let rx = self.acks.register(chunk_id.clone())?;
        self.send_raw(bytes).await?;
        debug!(chunk = %chunk_id, "awaiting ack");
        match self.acks.wait(&chunk_id, rx, self.ack_timeout).await {
            AckOutcome::Acked => {
                debug!(chunk = %chunk_id, "ack received");
                Ok(())
            }
            AckOutcome::TimedOut => Err(FluentError::Timeout),
            AckOutcome::SessionClosed(reason) => Err(FluentError::SessionClosed(reason)),
        }
    }

    /// Writes pre-encoded bytes without registering for an ack. Used for
    /// keepalive frames and by callers that manage their own ack tracking.
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<(), FluentError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error().await);
        }
        let mut writer = self.writer.lock().await;
        let write = writer.write_all(bytes);
        let result = match self.write_timeout {
            Some(d) => tokio::time::timeout(d, write)
                .await
                .map_err(|_elapsed| std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out"))
                .and_then(std::convert::identity),
            None => write.await,
        };
        result.map_err(|e| FluentError::TransportError(e.to_string()))
    }

    /// Idempotent. Stops the reader and keepalive tasks, fails every
    /// outstanding ack handle, and shuts the stream down. Safe to call
    /// concurrently with in-flight `send`s — those observe `SessionClosed`.
    pub async fn disconnect(&self) -> Result<(), FluentError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("disconnecting session");

        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(handle) = self.keepalive.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }

        self.acks.fail_all("session disconnected");

        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        Ok(())
    }

    async fn closed_error(&self) -> FluentError {
        match self.first_error.lock().await.clone() {
            Some(reason) => FluentError::SessionClosed(reason),
            None => FluentError::NoActiveSession,
        }
    }
}

fn spawn_reader(
    mut read_half: ReadHalf<BoxedStream>,
    acks: Arc<AckRegistry>,
    closed: Arc<AtomicBool>,
    first_error: Arc<Mutex<Option<String>>>,
    read_timeout: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = read_loop(&mut read_half, &acks, read_timeout).await;
        if let Err(e) = result {
            let reason = e.to_string();
            warn!(error = %reason, "session reader terminated");
            *first_error.lock().await = Some(reason.clone());
            if !closed.swap(true, Ordering::AcqRel) {
                acks.fail_all(&reason);
            }
        }
    })
}

async fn read_loop(
    read_half: &mut ReadHalf<BoxedStream>,
    acks: &AckRegistry,
    read_timeout: Option<Duration>,
) -> std::io::Result<()> {
    let mut reader = FrameReader::new(read_half);
    loop {
        let frame = match read_timeout {
            Some(d) => tokio::time::timeout(d, reader.read_frame())
                .await
                .map_err(|_elapsed| std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out"))
                .and_then(std::convert::identity)?,
            None => reader.read_frame().await?,
        };
        match Ack::unmarshal(&frame) {
            Ok((ack, _tail)) => {
                let found = acks.complete(&ack.chunk);
                debug!(chunk = %ack.chunk, found, "ack frame received");
            }
            Err(_) => {
                debug!("unrecognized frame on session reader, ignoring");
            }
        }
    }
}

fn spawn_keepalive(
    writer: Arc<Mutex<WriteHalf<BoxedStream>>>,
    closed: Arc<AtomicBool>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            if closed.load(Ordering::Acquire) {
                return;
            }
            let keepalive = ff_protocol::Message {
                tag: String::new(),
                timestamp: ff_protocol::Timestamp::Seconds(
                    ff_protocol::EventTime::now().seconds as i64,
                ),
                record: rmpv::Value::Map(Vec::new()),
                options: None,
            };
            let mut buf = Vec::new();
            if keepalive.marshal(&mut buf).is_err() {
                continue;
            }
            let mut w = writer.lock().await;
            if w.write_all(&buf).await.is_err() {
                closed.store(true, Ordering::Release);
                return;
            }
            debug!("keepalive sent");
        }
    })
}

// End-to-end session scenarios (S1-S8) live in `tests/`, against
// `ff-test-utils`'s fake server — a real reader/writer task pair needs a
// real stream, which the unit tests in this module can't provide without
// depending back on ff-test-utils.
