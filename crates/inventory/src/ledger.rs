//! FIFO ledger decisions and state transitions.
//!
//! `handle` turns a [`LedgerCommand`] into events without touching state;
//! `apply` evolves the item. Every failure (bad amount, insufficient stock) is
//! detected in `handle`, so a rejected command never leaves a partially
//! drawn lot behind.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use batchledger_core::{Aggregate, ItemId, LotId, UserId};

use crate::change_kind::{ChangeFamily, ChangeKind};
use crate::error::LedgerError;
use crate::history::HistoryEntry;
use crate::item::InventoryItem;
use crate::lot::{sort_fifo, Lot};

/// An adjustment already expressed in the item's canonical unit.
///
/// For additive and deductive kinds `quantity` is a positive magnitude; for
/// [`ChangeKind::Recount`] it is the absolute target total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCommand {
    pub change_kind: ChangeKind,
    pub quantity: Decimal,
    pub note: Option<String>,
    pub actor: Option<UserId>,
    /// Cost per canonical unit for lots created by this command.
    pub unit_cost: Option<Decimal>,
    pub expires_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

impl LedgerCommand {
    pub fn new(change_kind: ChangeKind, quantity: Decimal, occurred_at: DateTime<Utc>) -> Self {
        Self {
            change_kind,
            quantity,
            note: None,
            actor: None,
            unit_cost: None,
            expires_at: None,
            occurred_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// A new lot entered the item.
    LotReceived {
        lot: Lot,
        change_kind: ChangeKind,
        note: Option<String>,
        actor: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
    /// Part of a FIFO walk: `amount` left `lot_id`.
    LotDrawn {
        lot_id: LotId,
        amount: Decimal,
        remaining_after: Decimal,
        unit_cost: Decimal,
        change_kind: ChangeKind,
        note: Option<String>,
        actor: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
    /// Recount finalizer: the cached total becomes exactly `quantity`.
    QuantitySet {
        quantity: Decimal,
        occurred_at: DateTime<Utc>,
    },
}

impl LedgerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::LotReceived { .. } => "inventory.lot.received",
            LedgerEvent::LotDrawn { .. } => "inventory.lot.drawn",
            LedgerEvent::QuantitySet { .. } => "inventory.item.quantity_set",
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::LotReceived { occurred_at, .. }
            | LedgerEvent::LotDrawn { occurred_at, .. }
            | LedgerEvent::QuantitySet { occurred_at, .. } => *occurred_at,
        }
    }

    /// Change to the item total carried by this event, if it is relative.
    pub fn quantity_delta(&self) -> Option<Decimal> {
        match self {
            LedgerEvent::LotReceived { lot, .. } => Some(lot.original_quantity()),
            LedgerEvent::LotDrawn { amount, .. } => Some(-*amount),
            LedgerEvent::QuantitySet { .. } => None,
        }
    }

    /// The audit entry this event leaves behind.
    ///
    /// Receipts carry the signed delta; each walk step is a zero-delta entry
    /// naming what was drawn. `QuantitySet` is bookkeeping only.
    pub fn history_entry(&self, item_id: ItemId, unit: &str) -> Option<HistoryEntry> {
        match self {
            LedgerEvent::LotReceived {
                lot,
                change_kind,
                note,
                actor,
                occurred_at,
            } => Some(
                HistoryEntry::record(
                    item_id,
                    *change_kind,
                    lot.original_quantity(),
                    note.clone(),
                    *actor,
                    Some(lot),
                    *occurred_at,
                )
                .with_cost_impact(lot.original_quantity() * lot.unit_cost()),
            ),
            LedgerEvent::LotDrawn {
                lot_id,
                amount,
                remaining_after,
                unit_cost,
                change_kind,
                note,
                actor,
                occurred_at,
            } => {
                let step = format!("drew {amount} {unit} from lot {lot_id}");
                let note = match note {
                    Some(n) => format!("{step}; {n}"),
                    None => step,
                };
                let mut entry = HistoryEntry::record(
                    item_id,
                    *change_kind,
                    Decimal::ZERO,
                    Some(note),
                    *actor,
                    None,
                    *occurred_at,
                )
                .with_cost_impact(*amount * *unit_cost);
                entry.lot_id = Some(*lot_id);
                entry.remaining_after = Some(*remaining_after);
                Some(entry)
            }
            LedgerEvent::QuantitySet { .. } => None,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::LotReceived { lot, .. } => {
                self.next_sequence = self.next_sequence.max(lot.sequence() + 1);
                self.quantity += lot.original_quantity();
                self.lots.push(lot.clone());
                sort_fifo(&mut self.lots);
            }
            LedgerEvent::LotDrawn { lot_id, amount, .. } => {
                let lot = self.lots.iter_mut().find(|l| l.id() == *lot_id);
                debug_assert!(lot.is_some(), "draw from unknown lot {lot_id}");
                if let Some(lot) = lot {
                    lot.draw(*amount);
                }
                self.quantity -= *amount;
            }
            LedgerEvent::QuantitySet { quantity, .. } => {
                self.quantity = *quantity;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command.change_kind.family() {
            ChangeFamily::Additive => {
                require_positive(command.quantity)?;
                Ok(vec![self.decide_receipt(command, command.quantity)?])
            }
            ChangeFamily::Deductive => {
                require_positive(command.quantity)?;
                self.decide_draw(command, command.quantity)
            }
            ChangeFamily::Recount => self.decide_recount(command),
        }
    }
}

impl InventoryItem {
    fn decide_receipt(&self, cmd: &LedgerCommand, quantity: Decimal) -> Result<LedgerEvent, LedgerError> {
        let unit_cost = cmd.unit_cost.unwrap_or(Decimal::ZERO);
        if unit_cost < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "unit cost cannot be negative (got {unit_cost})"
            )));
        }

        let lot = Lot::receive(
            self.id,
            quantity,
            self.canonical_unit.clone(),
            unit_cost,
            cmd.occurred_at,
            cmd.expires_at,
            self.next_sequence,
        );

        Ok(LedgerEvent::LotReceived {
            lot,
            change_kind: cmd.change_kind,
            note: cmd.note.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })
    }

    fn decide_draw(&self, cmd: &LedgerCommand, quantity: Decimal) -> Result<Vec<LedgerEvent>, LedgerError> {
        let available = self.available();
        if quantity > available {
            return Err(LedgerError::InsufficientStock {
                requested: quantity,
                available,
            });
        }

        let mut needed = quantity;
        let mut events = Vec::new();
        for lot in self.active_lots() {
            if needed.is_zero() {
                break;
            }
            let take = needed.min(lot.remaining_quantity());
            needed -= take;
            events.push(LedgerEvent::LotDrawn {
                lot_id: lot.id(),
                amount: take,
                remaining_after: lot.remaining_quantity() - take,
                unit_cost: lot.unit_cost(),
                change_kind: cmd.change_kind,
                note: cmd.note.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            });
        }

        Ok(events)
    }

    fn decide_recount(&self, cmd: &LedgerCommand) -> Result<Vec<LedgerEvent>, LedgerError> {
        let target = cmd.quantity;
        if target < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "recount target cannot be negative (got {target})"
            )));
        }

        let delta = target - self.quantity;
        let mut events = if delta > Decimal::ZERO {
            // Increases always become a real lot, never a bump to an old one.
            vec![self.decide_receipt(cmd, delta)?]
        } else if delta < Decimal::ZERO {
            // A cache that drifted above the lots must not ask for stock the
            // lots do not hold; QuantitySet pins whatever is left over.
            self.decide_draw(cmd, (-delta).min(self.available()))?
        } else {
            return Ok(vec![]);
        };

        events.push(LedgerEvent::QuantitySet {
            quantity: target,
            occurred_at: cmd.occurred_at,
        });
        Ok(events)
    }
}

fn require_positive(quantity: Decimal) -> Result<(), LedgerError> {
    if quantity > Decimal::ZERO {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(format!(
            "quantity must be positive (got {quantity})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchledger_core::{AggregateRoot, OrganizationId};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use crate::item::NewItem;
    use crate::sync;

    fn day(n: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, n, 12, 0, 0).unwrap()
    }

    fn item() -> InventoryItem {
        InventoryItem::create(NewItem {
            organization_id: OrganizationId::new(),
            name: "Coconut oil".to_string(),
            canonical_unit: "g".to_string(),
            density: Some(dec!(0.92)),
        })
        .unwrap()
    }

    fn run(item: &mut InventoryItem, cmd: LedgerCommand) -> Result<Vec<LedgerEvent>, LedgerError> {
        let events = item.handle(&cmd)?;
        for e in &events {
            item.apply(e);
        }
        Ok(events)
    }

    fn restock(item: &mut InventoryItem, qty: Decimal, at: DateTime<Utc>) {
        run(item, LedgerCommand::new(ChangeKind::Restock, qty, at)).unwrap();
    }

    #[test]
    fn receipt_creates_lot_and_bumps_total() {
        let mut item = item();
        let mut cmd = LedgerCommand::new(ChangeKind::Restock, dec!(500), day(1));
        cmd.unit_cost = Some(dec!(0.02));
        let events = run(&mut item, cmd).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(item.quantity(), dec!(500));
        assert_eq!(item.lots().len(), 1);
        assert_eq!(item.lots()[0].original_quantity(), dec!(500));
        assert_eq!(item.lots()[0].unit_cost(), dec!(0.02));

        let entry = events[0].history_entry(item.id_typed(), "g").unwrap();
        assert_eq!(entry.quantity_delta, dec!(500));
        assert_eq!(entry.lot_id, Some(item.lots()[0].id()));
        assert_eq!(entry.cost_impact, Some(dec!(10)));
    }

    #[test]
    fn non_positive_magnitudes_are_rejected() {
        let item = item();
        for kind in [ChangeKind::Restock, ChangeKind::Sale] {
            for qty in [Decimal::ZERO, dec!(-3)] {
                let err = item.handle(&LedgerCommand::new(kind, qty, day(1))).unwrap_err();
                assert!(matches!(err, LedgerError::InvalidAmount(_)));
            }
        }
        let mut cmd = LedgerCommand::new(ChangeKind::Restock, dec!(1), day(1));
        cmd.unit_cost = Some(dec!(-1));
        assert!(matches!(item.handle(&cmd), Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn deduction_walks_lots_oldest_first() {
        let mut item = item();
        restock(&mut item, dec!(5), day(1));
        restock(&mut item, dec!(10), day(3));

        let events = run(&mut item, LedgerCommand::new(ChangeKind::Use, dec!(7), day(4))).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(item.lots()[0].remaining_quantity(), dec!(0));
        assert_eq!(item.lots()[1].remaining_quantity(), dec!(8));
        assert_eq!(item.quantity(), dec!(8));

        let entries: Vec<_> = events
            .iter()
            .filter_map(|e| e.history_entry(item.id_typed(), "g"))
            .collect();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.quantity_delta.is_zero()));
        assert!(entries[0].note.as_deref().unwrap().starts_with("drew 5 g"));
        assert!(entries[1].note.as_deref().unwrap().starts_with("drew 2 g"));
        assert_eq!(entries[1].remaining_after, Some(dec!(8)));
    }

    #[test]
    fn backdated_lot_is_consumed_first() {
        let mut item = item();
        restock(&mut item, dec!(4), day(10));
        restock(&mut item, dec!(4), day(2));

        run(&mut item, LedgerCommand::new(ChangeKind::Sale, dec!(3), day(11))).unwrap();
        let day2 = item.lots().iter().find(|l| l.received_at() == day(2)).unwrap();
        let day10 = item.lots().iter().find(|l| l.received_at() == day(10)).unwrap();
        assert_eq!(day2.remaining_quantity(), dec!(1));
        assert_eq!(day10.remaining_quantity(), dec!(4));
    }

    #[test]
    fn insufficient_stock_decides_nothing() {
        let mut item = item();
        restock(&mut item, dec!(10), day(1));
        restock(&mut item, dec!(20), day(2));
        let before = item.clone();

        let err = item
            .handle(&LedgerCommand::new(ChangeKind::Use, dec!(50), day(3)))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                requested: dec!(50),
                available: dec!(30)
            }
        );
        assert_eq!(item, before);
    }

    #[test]
    fn recount_down_walks_and_pins_exact_target() {
        let mut item = item();
        restock(&mut item, dec!(5.4), day(1));
        restock(&mut item, dec!(7), day(2));
        assert_eq!(item.quantity(), dec!(12.4));

        let events = run(&mut item, LedgerCommand::new(ChangeKind::Recount, dec!(9.0), day(3))).unwrap();

        let drawn: Decimal = events
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::LotDrawn { amount, change_kind, .. } => {
                    assert_eq!(*change_kind, ChangeKind::Recount);
                    Some(*amount)
                }
                _ => None,
            })
            .sum();
        assert_eq!(drawn, dec!(3.4));
        assert_eq!(item.lots()[0].remaining_quantity(), dec!(2.0));
        assert_eq!(item.lots()[1].remaining_quantity(), dec!(7));
        assert_eq!(item.quantity(), dec!(9.0));
        assert!(matches!(events.last(), Some(LedgerEvent::QuantitySet { .. })));
    }

    #[test]
    fn recount_up_creates_new_lot() {
        let mut item = item();
        restock(&mut item, dec!(3), day(1));

        run(&mut item, LedgerCommand::new(ChangeKind::Recount, dec!(8), day(2))).unwrap();
        assert_eq!(item.lots().len(), 2);
        assert_eq!(item.lots()[0].remaining_quantity(), dec!(3));
        assert_eq!(item.lots()[1].original_quantity(), dec!(5));
        assert_eq!(item.quantity(), dec!(8));
    }

    #[test]
    fn recount_to_current_total_is_a_no_op() {
        let mut item = item();
        restock(&mut item, dec!(3), day(1));
        let version = item.version();
        let events = run(&mut item, LedgerCommand::new(ChangeKind::Recount, dec!(3), day(2))).unwrap();
        assert!(events.is_empty());
        assert_eq!(item.version(), version);
    }

    #[test]
    fn recount_pins_target_despite_cached_drift() {
        let mut item = item();
        restock(&mut item, dec!(10), day(1));
        // Simulate drift within tolerance between cache and lots.
        item.quantity = dec!(10.0004);

        run(&mut item, LedgerCommand::new(ChangeKind::Recount, dec!(4), day(2))).unwrap();
        assert_eq!(item.quantity(), dec!(4));
        assert!(sync::validate(&item).is_valid);
    }

    #[test]
    fn recount_to_zero_with_cache_above_lots() {
        let mut item = item();
        restock(&mut item, dec!(10), day(1));
        item.quantity = dec!(10.0004);
        assert!(sync::validate(&item).is_valid);

        let events = run(&mut item, LedgerCommand::new(ChangeKind::Recount, dec!(0), day(2))).unwrap();

        let drawn: Decimal = events
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::LotDrawn { amount, .. } => Some(*amount),
                _ => None,
            })
            .sum();
        assert_eq!(drawn, dec!(10));
        assert_eq!(item.quantity(), dec!(0));
        assert_eq!(item.available(), dec!(0));
        assert!(sync::validate(&item).is_valid);
    }

    #[test]
    fn recount_with_empty_lots_only_pins_target() {
        let mut item = item();
        restock(&mut item, dec!(2), day(1));
        run(&mut item, LedgerCommand::new(ChangeKind::Use, dec!(2), day(2))).unwrap();
        item.quantity = dec!(0.0003);

        let events = run(&mut item, LedgerCommand::new(ChangeKind::Recount, dec!(0), day(3))).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], LedgerEvent::QuantitySet { .. }));
        assert_eq!(item.quantity(), dec!(0));
    }

    #[test]
    #[should_panic(expected = "draw from unknown lot")]
    #[cfg(debug_assertions)]
    fn drawing_from_unknown_lot_panics_in_debug() {
        let mut item = item();
        restock(&mut item, dec!(2), day(1));
        item.apply(&LedgerEvent::LotDrawn {
            lot_id: LotId::new(),
            amount: dec!(1),
            remaining_after: dec!(1),
            unit_cost: Decimal::ZERO,
            change_kind: ChangeKind::Use,
            note: None,
            actor: None,
            occurred_at: day(2),
        });
    }

    #[test]
    fn negative_recount_target_is_rejected() {
        let item = item();
        let err = item
            .handle(&LedgerCommand::new(ChangeKind::Recount, dec!(-1), day(1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(i64, u32),
        Take(i64),
        Recount(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..50_000, 1u32..28).prop_map(|(q, d)| Op::Add(q, d)),
            (1i64..80_000).prop_map(Op::Take),
            (0i64..120_000).prop_map(Op::Recount),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of operations the cache matches the
        /// lots, originals never change, and remaining never grows.
        #[test]
        fn ledger_invariants_hold(ops in prop::collection::vec(op(), 1..40)) {
            let mut item = item();
            let mut originals: std::collections::HashMap<LotId, Decimal> = Default::default();
            let mut remaining: std::collections::HashMap<LotId, Decimal> = Default::default();

            for op in ops {
                let cmd = match op {
                    Op::Add(q, d) => LedgerCommand::new(ChangeKind::Restock, Decimal::new(q, 3), day(d)),
                    Op::Take(q) => LedgerCommand::new(ChangeKind::Use, Decimal::new(q, 3), day(28)),
                    Op::Recount(q) => LedgerCommand::new(ChangeKind::Recount, Decimal::new(q, 3), day(28)),
                };
                let before = item.clone();
                match run(&mut item, cmd) {
                    Ok(_) => {}
                    Err(LedgerError::InsufficientStock { .. }) => prop_assert_eq!(&item, &before),
                    Err(e) => prop_assert!(false, "unexpected error {:?}", e),
                }

                prop_assert!(sync::validate(&item).is_valid);
                for lot in item.lots() {
                    let orig = *originals.entry(lot.id()).or_insert(lot.original_quantity());
                    prop_assert_eq!(orig, lot.original_quantity());
                    let prev = remaining.insert(lot.id(), lot.remaining_quantity());
                    if let Some(prev) = prev {
                        prop_assert!(lot.remaining_quantity() <= prev);
                    }
                }
            }
        }

        /// Property: a deduction never reduces a newer lot while an older lot
        /// still has stock.
        #[test]
        fn fifo_order_is_respected(
            lots in prop::collection::vec((1i64..10_000, 1u32..28), 2..8),
            take in 1i64..40_000,
        ) {
            let mut item = item();
            for (q, d) in &lots {
                restock(&mut item, Decimal::new(*q, 2), day(*d));
            }
            let before = item.clone();
            if run(&mut item, LedgerCommand::new(ChangeKind::Use, Decimal::new(take, 2), day(28))).is_ok() {
                let mut older_has_stock = false;
                for (old, new) in before.lots().iter().zip(item.lots()) {
                    if new.remaining_quantity() < old.remaining_quantity() {
                        prop_assert!(!older_has_stock, "newer lot drawn while older lot still had stock");
                    }
                    if new.is_active() {
                        older_has_stock = true;
                    }
                }
            }
        }
    }
}
