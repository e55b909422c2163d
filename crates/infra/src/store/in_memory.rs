//! In-process [`LedgerStore`] backed by a single `RwLock`.

use std::collections::HashMap;
use std::sync::RwLock;

use batchledger_core::{ItemId, LotId, OrganizationId};
use batchledger_inventory::{HistoryEntry, InventoryItem, ItemRecord, Lot};

use super::{ChangeSet, LedgerStore, StoreError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct ItemKey {
    organization_id: OrganizationId,
    item_id: ItemId,
}

#[derive(Debug, Default)]
struct Tables {
    items: HashMap<ItemKey, ItemRecord>,
    lots: HashMap<ItemKey, Vec<Lot>>,
    history: HashMap<ItemKey, Vec<HistoryEntry>>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. All three tables sit behind one lock, so a commit is
/// visible to readers entirely or not at all.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("lock poisoned".to_string())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn insert_item(&self, item: ItemRecord) -> Result<(), StoreError> {
        let key = ItemKey {
            organization_id: item.organization_id,
            item_id: item.id,
        };
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        if tables.items.values().any(|i| i.id == item.id) {
            return Err(StoreError::AlreadyExists(item.id));
        }
        tables.items.insert(key, item);
        tables.lots.entry(key).or_default();
        tables.history.entry(key).or_default();
        Ok(())
    }

    fn load_item(
        &self,
        organization_id: OrganizationId,
        item_id: ItemId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        let key = ItemKey {
            organization_id,
            item_id,
        };
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        let Some(record) = tables.items.get(&key) else {
            return Ok(None);
        };
        let lots = tables.lots.get(&key).cloned().unwrap_or_default();
        Ok(Some(InventoryItem::restore(record.clone(), lots)))
    }

    fn list_items(&self, organization_id: OrganizationId) -> Result<Vec<ItemRecord>, StoreError> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        let mut items: Vec<_> = tables
            .items
            .iter()
            .filter(|(k, _)| k.organization_id == organization_id)
            .map(|(_, v)| v.clone())
            .collect();
        items.sort_by_key(|i| i.id);
        Ok(items)
    }

    fn history(
        &self,
        organization_id: OrganizationId,
        item_id: ItemId,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let key = ItemKey {
            organization_id,
            item_id,
        };
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        if !tables.items.contains_key(&key) {
            return Err(StoreError::NotFound(item_id));
        }
        Ok(tables.history.get(&key).cloned().unwrap_or_default())
    }

    fn append_history(
        &self,
        organization_id: OrganizationId,
        entry: HistoryEntry,
    ) -> Result<(), StoreError> {
        let key = ItemKey {
            organization_id,
            item_id: entry.item_id,
        };
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        if !tables.items.contains_key(&key) {
            return Err(StoreError::NotFound(entry.item_id));
        }
        tables.history.entry(key).or_default().push(entry);
        Ok(())
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let item_id = changes.item.id;
        let key = ItemKey {
            organization_id: changes.item.organization_id,
            item_id,
        };

        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;

        // Validate everything before touching any table.
        let current = match tables.items.get(&key) {
            Some(current) => current,
            None if tables.items.values().any(|i| i.id == item_id) => {
                return Err(StoreError::OrganizationIsolation(format!(
                    "item {item_id} belongs to another organization"
                )));
            }
            None => return Err(StoreError::NotFound(item_id)),
        };

        if !changes.expected_version.matches(current.version) {
            return Err(StoreError::Concurrency(format!(
                "expected {:?}, found {}",
                changes.expected_version, current.version
            )));
        }

        let existing: HashMap<LotId, &Lot> = tables
            .lots
            .get(&key)
            .map(|lots| lots.iter().map(|l| (l.id(), l)).collect())
            .unwrap_or_default();

        for (idx, lot) in changes.lots.iter().enumerate() {
            if lot.item_id() != item_id {
                return Err(StoreError::InvalidChange(format!(
                    "lot at index {idx} belongs to another item"
                )));
            }
            if lot.remaining_quantity() < rust_decimal::Decimal::ZERO
                || lot.remaining_quantity() > lot.original_quantity()
            {
                return Err(StoreError::InvalidChange(format!(
                    "lot {} remaining {} outside 0..={}",
                    lot.id(),
                    lot.remaining_quantity(),
                    lot.original_quantity()
                )));
            }
            if let Some(stored) = existing.get(&lot.id()) {
                if stored.original_quantity() != lot.original_quantity() {
                    return Err(StoreError::InvalidChange(format!(
                        "original quantity of lot {} is immutable",
                        lot.id()
                    )));
                }
                if lot.remaining_quantity() > stored.remaining_quantity() {
                    return Err(StoreError::InvalidChange(format!(
                        "remaining quantity of lot {} cannot grow",
                        lot.id()
                    )));
                }
            }
        }

        for (idx, entry) in changes.history.iter().enumerate() {
            if entry.item_id != item_id {
                return Err(StoreError::InvalidChange(format!(
                    "history entry at index {idx} belongs to another item"
                )));
            }
        }

        // Apply (all checks passed).
        let ChangeSet {
            item, lots, history, ..
        } = changes;

        tables.items.insert(key, item);

        let stored_lots = tables.lots.entry(key).or_default();
        for lot in lots {
            match stored_lots.iter_mut().find(|l| l.id() == lot.id()) {
                Some(existing) => *existing = lot,
                None => stored_lots.push(lot),
            }
        }

        tables.history.entry(key).or_default().extend(history);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchledger_core::ExpectedVersion;
    use batchledger_inventory::{ChangeKind, NewItem};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn seeded() -> (InMemoryLedgerStore, ItemRecord) {
        let store = InMemoryLedgerStore::new();
        let item = InventoryItem::create(NewItem {
            organization_id: OrganizationId::new(),
            name: "Shea butter".into(),
            canonical_unit: "g".into(),
            density: None,
        })
        .unwrap();
        let record = item.record();
        store.insert_item(record.clone()).unwrap();
        (store, record)
    }

    fn lot(item: &ItemRecord, qty: rust_decimal::Decimal) -> Lot {
        Lot::receive(item.id, qty, "g", dec!(0), Utc::now(), None, 0)
    }

    #[test]
    fn commit_persists_item_lots_and_history() {
        let (store, mut record) = seeded();
        let lot = lot(&record, dec!(5));
        record.quantity = dec!(5);
        record.version = 1;

        let mut changes = ChangeSet::new(record.clone(), ExpectedVersion::Exact(0));
        changes.upsert_lot(lot.clone());
        changes.append_history(HistoryEntry::record(
            record.id,
            ChangeKind::Restock,
            dec!(5),
            None,
            None,
            Some(&lot),
            Utc::now(),
        ));
        store.commit(changes).unwrap();

        let loaded = store.load_item(record.organization_id, record.id).unwrap().unwrap();
        assert_eq!(loaded.quantity(), dec!(5));
        assert_eq!(loaded.lots().len(), 1);
        assert_eq!(store.history(record.organization_id, record.id).unwrap().len(), 1);
    }

    #[test]
    fn stale_version_rejects_whole_change_set() {
        let (store, record) = seeded();
        let mut changes = ChangeSet::new(record.clone(), ExpectedVersion::Exact(7));
        changes.upsert_lot(lot(&record, dec!(1)));

        let err = store.commit(changes).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
        let loaded = store.load_item(record.organization_id, record.id).unwrap().unwrap();
        assert!(loaded.lots().is_empty());
    }

    #[test]
    fn growing_a_lot_is_rejected() {
        let (store, mut record) = seeded();
        let original = lot(&record, dec!(5));
        record.quantity = dec!(5);
        record.version = 1;
        let mut first = ChangeSet::new(record.clone(), ExpectedVersion::Exact(0));
        first.upsert_lot(original.clone());
        store.commit(first).unwrap();

        // A lot with the same id but a bigger original quantity.
        let tampered: Lot = {
            let mut json = serde_json::to_value(&original).unwrap();
            json["original_quantity"] = serde_json::json!("9");
            json["remaining_quantity"] = serde_json::json!("9");
            serde_json::from_value(json).unwrap()
        };
        let mut second = ChangeSet::new(record.clone(), ExpectedVersion::Exact(1));
        second.upsert_lot(tampered);
        assert!(matches!(store.commit(second), Err(StoreError::InvalidChange(_))));
    }

    #[test]
    fn organizations_are_isolated() {
        let (store, record) = seeded();
        let other = OrganizationId::new();
        assert!(store.load_item(other, record.id).unwrap().is_none());

        let mut foreign = record.clone();
        foreign.organization_id = other;
        let err = store.commit(ChangeSet::new(foreign, ExpectedVersion::Any)).unwrap_err();
        assert!(matches!(err, StoreError::OrganizationIsolation(_)));
    }
}
