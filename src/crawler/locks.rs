//! Per-run mutual exclusion for orchestrated work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-run async locks.
///
/// Work on different runs proceeds in parallel; work on one run is serialized.
#[derive(Clone, Default)]
pub struct RunLocks {
    locks: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl RunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `run_id`.
    pub async fn acquire(&self, run_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(run_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the entry of a run nobody is holding or waiting on.
    pub fn forget(&self, run_id: i64) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = locks.get(&run_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&run_id);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_run_is_serialized() {
        let locks = RunLocks::new();
        let guard = locks.acquire(1).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(1).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_runs_do_not_block() {
        let locks = RunLocks::new();
        let _one = locks.acquire(1).await;
        tokio::time::timeout(Duration::from_secs(1), locks.acquire(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_forget_keeps_held_locks() {
        let locks = RunLocks::new();
        let guard = locks.acquire(7).await;
        locks.forget(7);
        assert!(locks.locks.lock().unwrap().contains_key(&7));

        drop(guard);
        locks.forget(7);
        assert!(locks.locks.lock().unwrap().is_empty());
    }
}
