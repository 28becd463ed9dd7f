//! Per-chain concurrency control.
//!
//! Continuations of the same conversation are serialized on the chain's
//! root execution id, so two turns never race to extend one chain. Turns
//! on different chains proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use ac_domain::execution::ExecutionId;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Maps each chain root to a `Semaphore(1)`. Hold the permit for the whole
/// turn; it releases on drop.
#[derive(Default)]
pub struct ChainLockMap {
    locks: Mutex<HashMap<ExecutionId, Arc<Semaphore>>>,
}

impl ChainLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other turn holds the chain rooted at `root`.
    pub async fn acquire(&self, root: ExecutionId) -> OwnedSemaphorePermit {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(root)
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        match sem.acquire_owned().await {
            Ok(permit) => permit,
            // Semaphores in this map are never closed.
            Err(_) => unreachable!("chain lock semaphore closed"),
        }
    }

    /// Number of tracked chains (for monitoring).
    pub fn chain_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Forget chains nobody is holding or waiting on. Permits and pending
    /// acquisitions each keep a clone of the semaphore alive.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| Arc::strong_count(sem) > 1);
    }
}
