//! Persistence boundary for the ledger.
//!
//! A store holds three logical tables: `inventory_item`, `lot` and
//! `history_entry`. Ledger writes reach it only through a [`ChangeSet`], which
//! the store must apply all-or-nothing.

pub mod in_memory;

use std::sync::Arc;

use thiserror::Error;

use batchledger_core::{ExpectedVersion, ItemId, OrganizationId};
use batchledger_inventory::{HistoryEntry, InventoryItem, ItemRecord, LedgerError, Lot};

pub use in_memory::InMemoryLedgerStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("organization isolation violation: {0}")]
    OrganizationIsolation(String),

    #[error("item {0} not found")]
    NotFound(ItemId),

    #[error("item {0} already exists")]
    AlreadyExists(ItemId),

    /// The change set would rewrite history (original quantity, grown
    /// remaining quantity, foreign rows).
    #[error("invalid change: {0}")]
    InvalidChange(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => LedgerError::ItemNotFound(id),
            StoreError::Concurrency(msg) => LedgerError::Conflict(msg),
            other => LedgerError::Store(other.to_string()),
        }
    }
}

/// The staged writes of one ledger operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub item: ItemRecord,
    pub expected_version: ExpectedVersion,
    /// New or updated lots (full rows).
    pub lots: Vec<Lot>,
    pub history: Vec<HistoryEntry>,
}

impl ChangeSet {
    pub fn new(item: ItemRecord, expected_version: ExpectedVersion) -> Self {
        Self {
            item,
            expected_version,
            lots: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn upsert_lot(&mut self, lot: Lot) {
        match self.lots.iter_mut().find(|l| l.id() == lot.id()) {
            Some(existing) => *existing = lot,
            None => self.lots.push(lot),
        }
    }

    pub fn append_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }
}

/// Ledger persistence.
///
/// Reads return consistent snapshots; `commit` applies a change set
/// atomically and rejects it whole if any check fails.
pub trait LedgerStore: Send + Sync {
    fn insert_item(&self, item: ItemRecord) -> Result<(), StoreError>;

    /// The item with all of its lots, or `None`.
    fn load_item(
        &self,
        organization_id: OrganizationId,
        item_id: ItemId,
    ) -> Result<Option<InventoryItem>, StoreError>;

    fn list_items(&self, organization_id: OrganizationId) -> Result<Vec<ItemRecord>, StoreError>;

    /// History in append order (oldest first).
    fn history(
        &self,
        organization_id: OrganizationId,
        item_id: ItemId,
    ) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Append a single audit-only entry outside of an adjustment.
    fn append_history(
        &self,
        organization_id: OrganizationId,
        entry: HistoryEntry,
    ) -> Result<(), StoreError>;

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn insert_item(&self, item: ItemRecord) -> Result<(), StoreError> {
        (**self).insert_item(item)
    }

    fn load_item(
        &self,
        organization_id: OrganizationId,
        item_id: ItemId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        (**self).load_item(organization_id, item_id)
    }

    fn list_items(&self, organization_id: OrganizationId) -> Result<Vec<ItemRecord>, StoreError> {
        (**self).list_items(organization_id)
    }

    fn history(
        &self,
        organization_id: OrganizationId,
        item_id: ItemId,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        (**self).history(organization_id, item_id)
    }

    fn append_history(
        &self,
        organization_id: OrganizationId,
        entry: HistoryEntry,
    ) -> Result<(), StoreError> {
        (**self).append_history(organization_id, entry)
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        (**self).commit(changes)
    }
}

/// Scoped unit of atomicity for one ledger call.
///
/// Writes are staged in memory; nothing reaches the store until [`commit`].
/// Dropping an uncommitted transaction discards the staged writes.
///
/// [`commit`]: Transaction::commit
pub struct Transaction<'a, S: LedgerStore + ?Sized> {
    store: &'a S,
    changes: Option<ChangeSet>,
}

impl<'a, S: LedgerStore + ?Sized> Transaction<'a, S> {
    pub fn begin(store: &'a S, item: ItemRecord, expected_version: ExpectedVersion) -> Self {
        Self {
            store,
            changes: Some(ChangeSet::new(item, expected_version)),
        }
    }

    pub fn upsert_lot(&mut self, lot: Lot) {
        if let Some(changes) = self.changes.as_mut() {
            changes.upsert_lot(lot);
        }
    }

    pub fn append_history(&mut self, entry: HistoryEntry) {
        if let Some(changes) = self.changes.as_mut() {
            changes.append_history(entry);
        }
    }

    pub fn commit(mut self) -> Result<(), StoreError> {
        match self.changes.take() {
            Some(changes) => self.store.commit(changes),
            None => Ok(()),
        }
    }
}

impl<S: LedgerStore + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if let Some(changes) = &self.changes {
            tracing::debug!(
                item_id = %changes.item.id,
                lots = changes.lots.len(),
                history = changes.history.len(),
                "discarding uncommitted ledger transaction"
            );
        }
    }
}
