//! Per-session turn serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of async mutexes keyed by session id. Turns of one session
/// queue behind each other; different sessions never contend.
#[derive(Debug, Default)]
pub struct TurnLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the session's turn lock.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop the session's lock entry. Holders keep their guard.
    pub fn release(&self, session_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.remove(session_id);
    }

    /// Drop the entry once nobody holds or waits on it. Call after the
    /// turn's guard is dropped.
    pub fn release_idle(&self, session_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // The map's own handle is the only one left: no holder, no waiter.
        // Acquirers clone under this same mutex, so the check cannot race.
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(session_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}
