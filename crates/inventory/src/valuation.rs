//! FIFO valuation of remaining stock.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use batchledger_core::ItemId;

use crate::item::InventoryItem;

/// Value of an item's remaining stock at each lot's own cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
    pub item_id: ItemId,
    pub quantity: Decimal,
    pub total_value: Decimal,
    /// `None` when nothing is in stock.
    pub average_unit_cost: Option<Decimal>,
    pub active_lots: usize,
}

impl Valuation {
    pub fn of(item: &InventoryItem) -> Self {
        let (quantity, total_value, active_lots) = item.active_lots().fold(
            (Decimal::ZERO, Decimal::ZERO, 0usize),
            |(q, v, n), lot| (q + lot.remaining_quantity(), v + lot.remaining_value(), n + 1),
        );
        let average_unit_cost = if quantity.is_zero() {
            None
        } else {
            Some(total_value / quantity)
        };

        Self {
            item_id: item.id_typed(),
            quantity,
            total_value,
            average_unit_cost,
            active_lots,
        }
    }
}
