//! Stock lots and FIFO ordering.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use batchledger_core::{ItemId, LotId};

/// A receipt of stock with its own cost and remaining quantity.
///
/// `original_quantity` is fixed at creation. `remaining_quantity` only ever
/// decreases, and a lot drawn down to zero is kept for history linkage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    id: LotId,
    item_id: ItemId,
    original_quantity: Decimal,
    remaining_quantity: Decimal,
    unit: String,
    unit_cost: Decimal,
    received_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    /// Insertion order within the item; breaks ties between equal `received_at`.
    sequence: u64,
}

impl Lot {
    pub fn receive(
        item_id: ItemId,
        quantity: Decimal,
        unit: impl Into<String>,
        unit_cost: Decimal,
        received_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        sequence: u64,
    ) -> Self {
        Self {
            id: LotId::new(),
            item_id,
            original_quantity: quantity,
            remaining_quantity: quantity,
            unit: unit.into(),
            unit_cost,
            received_at,
            expires_at,
            sequence,
        }
    }

    pub fn id(&self) -> LotId {
        self.id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn original_quantity(&self) -> Decimal {
        self.original_quantity
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.remaining_quantity
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn unit_cost(&self) -> Decimal {
        self.unit_cost
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Still has stock to draw from.
    pub fn is_active(&self) -> bool {
        self.remaining_quantity > Decimal::ZERO
    }

    pub fn is_expired(&self, as_of: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= as_of)
    }

    /// Value of what is left, at this lot's cost.
    pub fn remaining_value(&self) -> Decimal {
        self.remaining_quantity * self.unit_cost
    }

    /// FIFO ordering key: oldest receipt first, then insertion order.
    pub fn fifo_key(&self) -> (DateTime<Utc>, u64) {
        (self.received_at, self.sequence)
    }

    /// Take `amount` out of the lot. Callers guarantee `amount <= remaining`.
    pub(crate) fn draw(&mut self, amount: Decimal) {
        debug_assert!(amount <= self.remaining_quantity, "overdrawn lot {}", self.id);
        self.remaining_quantity -= amount;
    }
}

/// Sort lots into FIFO order (stable).
pub fn sort_fifo(lots: &mut [Lot]) {
    lots.sort_by_key(Lot::fifo_key);
}

/// Sum of remaining quantities.
pub fn lot_total<'a>(lots: impl IntoIterator<Item = &'a Lot>) -> Decimal {
    lots.into_iter().map(Lot::remaining_quantity).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn day(n: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, n, 9, 0, 0).unwrap()
    }

    #[test]
    fn drawing_keeps_original_quantity() {
        let mut lot = Lot::receive(ItemId::new(), dec!(10), "g", dec!(0.5), day(1), None, 0);
        lot.draw(dec!(4));
        assert_eq!(lot.original_quantity(), dec!(10));
        assert_eq!(lot.remaining_quantity(), dec!(6));
        assert_eq!(lot.remaining_value(), dec!(3));

        lot.draw(dec!(6));
        assert!(!lot.is_active());
    }

    #[test]
    fn fifo_sort_breaks_ties_by_sequence() {
        let item = ItemId::new();
        let mut lots = vec![
            Lot::receive(item, dec!(1), "g", dec!(0), day(3), None, 0),
            Lot::receive(item, dec!(1), "g", dec!(0), day(1), None, 2),
            Lot::receive(item, dec!(1), "g", dec!(0), day(1), None, 1),
        ];
        sort_fifo(&mut lots);
        let order: Vec<_> = lots.iter().map(|l| l.sequence()).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert_eq!(lot_total(&lots), dec!(3));
    }

    #[test]
    fn expiry_is_inclusive() {
        let lot = Lot::receive(ItemId::new(), dec!(1), "g", dec!(0), day(1), Some(day(5)), 0);
        assert!(!lot.is_expired(day(5) - Duration::seconds(1)));
        assert!(lot.is_expired(day(5)));
        let no_expiry = Lot::receive(ItemId::new(), dec!(1), "g", dec!(0), day(1), None, 1);
        assert!(!no_expiry.is_expired(day(28)));
    }
}
