//! Test harness for `fluent-forward-client`: an in-process duplex stream
//! and a scripted fake peer, so session- and handshake-level tests don't
//! need a real socket. Mirrors `rt-test-utils`'s `MockWsServer` /
//! `MockWsClient` split, adapted to the raw byte-stream transport this
//! crate's core depends on instead of a WebSocket.

mod duplex;
mod fake_server;

pub use duplex::DuplexStream;
pub use fake_server::FakeForwardServer;

use std::sync::Arc;

use async_trait::async_trait;
use fluent_forward_client::{FactoryError, Stream, StreamFactory};
use tokio::sync::Mutex;

/// A [`StreamFactory`] that hands out one pre-built [`DuplexStream`] half
/// per call, in order, then starts failing. Good enough for
/// `Connect`/`Reconnect` tests that want to control exactly what stream the
/// client receives without standing up a real listener.
pub struct ScriptedFactory {
    streams: Mutex<Vec<DuplexStream>>,
}

impl ScriptedFactory {
    pub fn new(streams: Vec<DuplexStream>) -> Self {
        Self {
            streams: Mutex::new(streams),
        }
    }

    pub fn single(stream: DuplexStream) -> Arc<Self> {
        Arc::new(Self::new(vec![stream]))
    }
}

#[async_trait]
impl StreamFactory for ScriptedFactory {
    async fn connect(&self) -> Result<Box<dyn Stream>, FactoryError> {
        let mut streams = self.streams.lock().await;
        if streams.is_empty() {
            return Err(FactoryError::new("scripted factory exhausted", false));
        }
        Ok(Box::new(streams.remove(0)))
    }
}
