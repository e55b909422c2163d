//! Append-only audit trail.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use batchledger_core::{HistoryEntryId, ItemId, LotId, UserId};

use crate::change_kind::ChangeKind;
use crate::lot::Lot;

/// One immutable audit record.
///
/// `quantity_delta` is the signed change to the item total for additive
/// entries and `0` for FIFO walk steps and audit-only notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub item_id: ItemId,
    pub lot_id: Option<LotId>,
    pub change_kind: ChangeKind,
    pub quantity_delta: Decimal,
    /// Remaining quantity on `lot_id` right after this entry.
    pub remaining_after: Option<Decimal>,
    /// Quantity moved times the lot's unit cost.
    pub cost_impact: Option<Decimal>,
    pub note: Option<String>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Build an entry. Pure; no business rules are evaluated here.
    pub fn record(
        item_id: ItemId,
        change_kind: ChangeKind,
        quantity_delta: Decimal,
        note: Option<String>,
        actor: Option<UserId>,
        lot: Option<&Lot>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryEntryId::new(),
            item_id,
            lot_id: lot.map(Lot::id),
            change_kind,
            quantity_delta,
            remaining_after: lot.map(Lot::remaining_quantity),
            cost_impact: None,
            note,
            actor,
            occurred_at,
        }
    }

    pub fn with_cost_impact(mut self, cost: Decimal) -> Self {
        self.cost_impact = Some(cost);
        self
    }

    /// True for entries that do not change the item total.
    pub fn is_audit_only(&self) -> bool {
        self.quantity_delta.is_zero()
    }
}

/// One page of history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    /// 1-based page number.
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

impl HistoryPage {
    /// Slice an already newest-first list.
    pub fn paginate(newest_first: Vec<HistoryEntry>, page: usize, page_size: usize) -> Self {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let total = newest_first.len();
        let entries = newest_first
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();
        Self {
            entries,
            page,
            page_size,
            total,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.page_size)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entries(n: usize) -> Vec<HistoryEntry> {
        let item = ItemId::new();
        (0..n)
            .map(|i| {
                HistoryEntry::record(
                    item,
                    ChangeKind::Restock,
                    Decimal::from(i as u64),
                    None,
                    None,
                    None,
                    Utc::now(),
                )
            })
            .collect()
    }

    #[test]
    fn pagination_slices_and_counts() {
        let page = HistoryPage::paginate(entries(5), 2, 2);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].quantity_delta, dec!(2));
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());

        let last = HistoryPage::paginate(entries(5), 3, 2);
        assert_eq!(last.entries.len(), 1);
        assert!(!last.has_next());
    }

    #[test]
    fn page_zero_is_treated_as_first_page() {
        let page = HistoryPage::paginate(entries(3), 0, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 1);
        assert_eq!(page.entries.len(), 1);
    }

    #[test]
    fn entry_copies_lot_reference() {
        let lot = Lot::receive(ItemId::new(), dec!(8), "g", dec!(2), Utc::now(), None, 0);
        let entry = HistoryEntry::record(
            lot.item_id(),
            ChangeKind::Use,
            Decimal::ZERO,
            Some("drew 2".into()),
            None,
            Some(&lot),
            Utc::now(),
        )
        .with_cost_impact(dec!(4));
        assert_eq!(entry.lot_id, Some(lot.id()));
        assert_eq!(entry.remaining_after, Some(dec!(8)));
        assert!(entry.is_audit_only());
    }
}
