//! The inventory item aggregate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use batchledger_core::{AggregateRoot, DomainError, DomainResult, ItemId, OrganizationId};
use batchledger_units::normalize_unit_name;

use crate::lot::{lot_total, sort_fifo, Lot};

/// Input for creating an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub organization_id: OrganizationId,
    pub name: String,
    pub canonical_unit: String,
    /// Grams per millilitre, when the item can be measured both ways.
    pub density: Option<Decimal>,
}

/// Persisted `inventory_item` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub canonical_unit: String,
    pub quantity: Decimal,
    pub density: Option<Decimal>,
    pub version: u64,
}

/// Aggregate root: an inventory item and its lots.
///
/// `quantity` is a cache of the lots' remaining total; only ledger events
/// change either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    pub(crate) id: ItemId,
    pub(crate) organization_id: OrganizationId,
    pub(crate) name: String,
    pub(crate) canonical_unit: String,
    pub(crate) quantity: Decimal,
    pub(crate) density: Option<Decimal>,
    /// Always in FIFO order.
    pub(crate) lots: Vec<Lot>,
    pub(crate) version: u64,
    pub(crate) next_sequence: u64,
}

impl InventoryItem {
    pub fn create(new: NewItem) -> DomainResult<Self> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let canonical_unit = normalize_unit_name(&new.canonical_unit);
        if canonical_unit.is_empty() {
            return Err(DomainError::validation("canonical unit cannot be empty"));
        }
        check_density(new.density)?;

        Ok(Self {
            id: ItemId::new(),
            organization_id: new.organization_id,
            name,
            canonical_unit,
            quantity: Decimal::ZERO,
            density: new.density,
            lots: Vec::new(),
            version: 0,
            next_sequence: 0,
        })
    }

    /// Rebuild from a stored row and its lots.
    pub fn restore(record: ItemRecord, mut lots: Vec<Lot>) -> Self {
        sort_fifo(&mut lots);
        let next_sequence = lots.iter().map(|l| l.sequence() + 1).max().unwrap_or(0);
        Self {
            id: record.id,
            organization_id: record.organization_id,
            name: record.name,
            canonical_unit: record.canonical_unit,
            quantity: record.quantity,
            density: record.density,
            lots,
            version: record.version,
            next_sequence,
        }
    }

    /// The row to persist for this item.
    pub fn record(&self) -> ItemRecord {
        ItemRecord {
            id: self.id,
            organization_id: self.organization_id,
            name: self.name.clone(),
            canonical_unit: self.canonical_unit.clone(),
            quantity: self.quantity,
            density: self.density,
            version: self.version,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn canonical_unit(&self) -> &str {
        &self.canonical_unit
    }

    /// Cached total.
    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn density(&self) -> Option<Decimal> {
        self.density
    }

    pub fn set_density(&mut self, density: Option<Decimal>) -> DomainResult<()> {
        check_density(density)?;
        self.density = density;
        Ok(())
    }

    /// All lots, oldest first.
    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    pub fn lot(&self, lot_id: batchledger_core::LotId) -> Option<&Lot> {
        self.lots.iter().find(|l| l.id() == lot_id)
    }

    /// Lots with remaining stock, oldest first.
    pub fn active_lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter().filter(|l| l.is_active())
    }

    /// Sum of remaining lot quantities (the source of truth for `quantity`).
    pub fn available(&self) -> Decimal {
        lot_total(&self.lots)
    }

    /// Lots with stock left whose expiry is at or before `as_of`.
    pub fn expired_lots(&self, as_of: DateTime<Utc>) -> Vec<&Lot> {
        self.active_lots().filter(|l| l.is_expired(as_of)).collect()
    }
}

impl AggregateRoot for InventoryItem {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

fn check_density(density: Option<Decimal>) -> DomainResult<()> {
    match density {
        Some(d) if d <= Decimal::ZERO => Err(DomainError::validation(format!(
            "density must be positive (got {d})"
        ))),
        _ => Ok(()),
    }
}
