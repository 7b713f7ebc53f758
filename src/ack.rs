//! Acknowledgement registry (C2).
//!
//! A small mutex-guarded map keyed by chunk ID, each entry a one-shot
//! completion channel — the simpler of two workable designs, and
//! the one this crate commits to (see DESIGN.md).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::FluentError;

/// Terminal outcome of a single `Send`'s wait on its ack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Acked,
    TimedOut,
    SessionClosed(String),
}

#[derive(Default)]
pub struct AckRegistry {
    inner: Mutex<HashMap<String, oneshot::Sender<AckOutcome>>>,
}

impl AckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new entry. Fails with `DuplicateChunkId` if one already
    /// exists — a bug, since chunk IDs are minted fresh per send.
    pub fn register(&self, chunk_id: String) -> Result<oneshot::Receiver<AckOutcome>, FluentError> {
        let (tx, rx) = oneshot::channel();
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(&chunk_id) {
            return Err(FluentError::DuplicateChunkId(chunk_id));
        }
        map.insert(chunk_id, tx);
        Ok(rx)
    }

    /// Delivers a success signal to the matching handle. Returns whether a
    /// handle was found; a concurrent `complete` for the same ID (or one
    /// that already timed out) observes `false` because the entry has
    /// already been removed under the lock — `remove` is the
    /// linearisation point.
    pub fn complete(&self, chunk_id: &str) -> bool {
        let tx = self.inner.lock().unwrap().remove(chunk_id);
        match tx {
            Some(tx) => {
                let _ = tx.send(AckOutcome::Acked);
                true
            }
            None => false,
        }
    }

    /// Awaits the handle's terminal outcome, racing it against `deadline`.
    /// On timeout the entry is dropped from the map so a late-arriving ack
    /// becomes a no-op `complete`.
    pub async fn wait(&self, chunk_id: &str, rx: oneshot::Receiver<AckOutcome>, deadline: Duration) -> AckOutcome {
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                // Sender dropped without sending: only fail_all or complete
                // ever send, and fail_all always sends before dropping, so
                // this means the registry itself was torn down mid-wait.
                AckOutcome::SessionClosed("registry dropped".into())
            }
            Err(_elapsed) => {
                self.inner.lock().unwrap().remove(chunk_id);
                AckOutcome::TimedOut
            }
        }
    }

    /// Resolves every outstanding handle to `SessionClosed`. Called exactly
    /// once, at session shutdown.
    pub fn fail_all(&self, reason: &str) {
        let mut map = self.inner.lock().unwrap();
        for (_, tx) in map.drain() {
            let _ = tx.send(AckOutcome::SessionClosed(reason.to_owned()));
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_complete_resolves_acked() {
        let reg = AckRegistry::new();
        let rx = reg.register("c1".into()).unwrap();
        assert!(reg.complete("c1"));
        let outcome = reg.wait("c1", rx, Duration::from_secs(5)).await;
        assert_eq!(outcome, AckOutcome::Acked);
    }

    #[tokio::test]
    async fn duplicate_register_is_rejected() {
        let reg = AckRegistry::new();
        let _rx = reg.register("dup".into()).unwrap();
        let err = reg.register("dup".into()).unwrap_err();
        assert!(matches!(err, FluentError::DuplicateChunkId(_)));
    }

    #[tokio::test]
    async fn unknown_complete_returns_false() {
        let reg = AckRegistry::new();
        assert!(!reg.complete("never-registered"));
    }

    #[tokio::test]
    async fn wait_times_out_and_cleans_up_entry() {
        let reg = AckRegistry::new();
        let rx = reg.register("slow".into()).unwrap();
        let outcome = reg.wait("slow", rx, Duration::from_millis(20)).await;
        assert_eq!(outcome, AckOutcome::TimedOut);
        assert_eq!(reg.len(), 0);
        // A late ack after timeout is a no-op, not a panic or a resurrection.
        assert!(!reg.complete("slow"));
    }

    #[tokio::test]
    async fn fail_all_resolves_every_outstanding_handle() {
        let reg = AckRegistry::new();
        let rx1 = reg.register("a".into()).unwrap();
        let rx2 = reg.register("b".into()).unwrap();
        reg.fail_all("disconnect");
        assert_eq!(
            reg.wait("a", rx1, Duration::from_secs(1)).await,
            AckOutcome::SessionClosed("disconnect".into())
        );
        assert_eq!(
            reg.wait("b", rx2, Duration::from_secs(1)).await,
            AckOutcome::SessionClosed("disconnect".into())
        );
    }

    #[tokio::test]
    async fn concurrent_complete_only_one_wins() {
        use std::sync::Arc;
        let reg = Arc::new(AckRegistry::new());
        let rx = reg.register("race".into()).unwrap();
        let r1 = reg.clone();
        let r2 = reg.clone();
        let (ok1, ok2) = tokio::join!(
            tokio::spawn(async move { r1.complete("race") }),
            tokio::spawn(async move { r2.complete("race") }),
        );
        let wins = [ok1.unwrap(), ok2.unwrap()].into_iter().filter(|b| *b).count();
        assert_eq!(wins, 1);
        assert_eq!(
            reg.wait("race", rx, Duration::from_secs(1)).await,
            AckOutcome::Acked
        );
    }
}
