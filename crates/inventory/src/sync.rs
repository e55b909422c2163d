//! Cached-total vs. lot-total consistency check.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use batchledger_core::quantity::within_tolerance;
use batchledger_core::{ItemId, SYNC_TOLERANCE};

use crate::item::InventoryItem;
use crate::lot::{lot_total, Lot};

/// Result of a sync check. Read-only; carries enough to explain a mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub item_id: ItemId,
    pub is_valid: bool,
    pub message: String,
    pub cached_quantity: Decimal,
    pub lot_total: Decimal,
}

impl SyncReport {
    pub fn drift(&self) -> Decimal {
        self.cached_quantity - self.lot_total
    }
}

/// Check an item with the default tolerance.
pub fn validate(item: &InventoryItem) -> SyncReport {
    validate_with_tolerance(item, SYNC_TOLERANCE)
}

pub fn validate_with_tolerance(item: &InventoryItem, tolerance: Decimal) -> SyncReport {
    validate_parts(item.id_typed(), item.quantity(), item.lots(), tolerance)
}

/// Check a cached total against a set of lots as loaded from storage.
pub fn validate_parts(
    item_id: ItemId,
    cached_quantity: Decimal,
    lots: &[Lot],
    tolerance: Decimal,
) -> SyncReport {
    let total = lot_total(lots);
    let is_valid = within_tolerance(cached_quantity, total, tolerance);
    let message = if is_valid {
        format!("in sync: {cached_quantity} across {} lot(s)", lots.len())
    } else {
        format!(
            "cached quantity {cached_quantity} differs from lot total {total} by {}",
            (cached_quantity - total).abs()
        )
    };

    SyncReport {
        item_id,
        is_valid,
        message,
        cached_quantity,
        lot_total: total,
    }
}
