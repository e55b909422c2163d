//! Per-item writer locks.
//!
//! One adjustment per item at a time; different items never contend. The
//! registry hands out one mutex per (organization, item) and drops it again
//! once no caller holds or waits on it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use batchledger_core::{ItemId, OrganizationId};
use batchledger_inventory::{LedgerError, LedgerResult};

#[derive(Debug, Default)]
pub struct ItemLocks {
    locks: Mutex<HashMap<(OrganizationId, ItemId), Arc<Mutex<()>>>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, organization_id: OrganizationId, item_id: ItemId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry((organization_id, item_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` while holding the item's lock.
    ///
    /// Gives up with [`LedgerError::LockTimeout`] if the lock is not acquired
    /// within `timeout`. The lock is released when `f` returns, on both the
    /// success and error paths.
    pub fn with_lock<T>(
        &self,
        organization_id: OrganizationId,
        item_id: ItemId,
        timeout: Duration,
        f: impl FnOnce() -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let slot = self.slot(organization_id, item_id);
        let started = Instant::now();
        let result = match slot.try_lock_for(timeout) {
            Some(_guard) => f(),
            None => {
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(%item_id, waited_ms, "item lock acquisition timed out");
                Err(LedgerError::LockTimeout { item_id, waited_ms })
            }
        };
        self.release(organization_id, item_id, slot);
        result
    }

    /// Forget the slot when the map and `slot` are its only owners.
    ///
    /// Clones are only handed out under the map lock, so nobody can pick the
    /// slot up between the count check and the removal.
    fn release(&self, organization_id: OrganizationId, item_id: ItemId, slot: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        if Arc::strong_count(&slot) == 2 {
            locks.remove(&(organization_id, item_id));
        }
    }

    /// Number of items currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
