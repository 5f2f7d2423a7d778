//! Spawn ↔ webhook rendezvous.
//!
//! A spawn call does not succeed when the OS process launches; it succeeds
//! when that process reports back through the webhook with its session id.
//! This module is the correlation table between the two: PID-keyed oneshot
//! senders, resolved exactly once by whichever of {webhook, child exit}
//! arrives first (the spawn side owns the timeout).

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

/// What resolved a pending spawn.
#[derive(Debug)]
pub enum SpawnSignal {
    /// The subprocess self-reported; carries its session id.
    WebhookConfirmed { session_id: String },
    /// The child died before reporting in.
    ChildExited {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

/// PID-keyed table of pending spawn awaiters.
pub struct SpawnAwaiters {
    inner: Mutex<HashMap<u32, oneshot::Sender<SpawnSignal>>>,
}

impl Default for SpawnAwaiters {
    fn default() -> Self {
        Self::new()
    }
}

impl SpawnAwaiters {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Register an awaiter for `pid`, replacing any stale one.
    pub fn register(&self, pid: u32) -> oneshot::Receiver<SpawnSignal> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(pid, tx);
        rx
    }

    /// Resolve the awaiter for `pid`, if one is still pending.
    ///
    /// The sender is removed before sending, so a second signal for the
    /// same PID has no observable effect on an already-resolved spawn.
    pub fn resolve(&self, pid: u32, signal: SpawnSignal) -> bool {
        let Some(tx) = self.lock().remove(&pid) else {
            return false;
        };
        tx.send(signal).is_ok()
    }

    /// Drop the awaiter for `pid` without resolving it (timeout path).
    pub fn cancel(&self, pid: u32) {
        self.lock().remove(&pid);
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, oneshot::Sender<SpawnSignal>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
