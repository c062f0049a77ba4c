//! Per-transaction async locks
//!
//! Every state-changing operation on a transaction holds that transaction's
//! lock from guard evaluation through commit, so two requests for the same
//! transaction serialize and the second sees the first one's result.
//! Different transactions never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use tradeflow_core::TransactionId;

/// Held for the duration of one mutation on a transaction
#[derive(Debug)]
pub struct TransactionGuard {
    transaction_id: TransactionId,
    _guard: OwnedMutexGuard<()>,
}

impl TransactionGuard {
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }
}

/// Hands out one async mutex per transaction id
#[derive(Debug, Clone, Default)]
pub struct LockManager {
    locks: Arc<Mutex<HashMap<TransactionId, Arc<AsyncMutex<()>>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock of `transaction_id`
    pub async fn acquire(&self, transaction_id: TransactionId) -> TransactionGuard {
        let lock = self.lock_for(transaction_id);
        let guard = lock.lock_owned().await;
        debug!(transaction_id, "Transaction lock acquired");
        TransactionGuard {
            transaction_id,
            _guard: guard,
        }
    }

    fn lock_for(&self, transaction_id: TransactionId) -> Arc<AsyncMutex<()>> {
        // The map only holds plain Arcs; a poisoned guard is still usable
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());

        // Drop locks nobody holds or waits on
        locks.retain(|id, lock| *id == transaction_id || Arc::strong_count(lock) > 1);

        locks
            .entry(transaction_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Number of transactions with a live lock entry
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
