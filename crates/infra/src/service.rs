//! Ledger service: the application-level entry point.
//!
//! Every adjustment runs the same pipeline under the item lock:
//!
//! ```text
//! Adjustment
//!   ↓
//! 1. Load item + lots (organization-scoped)
//!   ↓
//! 2. Convert the magnitude (and unit cost) to the item's canonical unit
//!   ↓
//! 3. Decide ledger events (pure, no mutation)
//!   ↓
//! 4. Apply to a copy and check cached total == lot total
//!   ↓
//! 5. Stage lots + item + history in one transaction and commit
//!   ↓
//! 6. Reload and re-check; a mismatch here is fatal
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use batchledger_core::quantity::round_to;
use batchledger_core::{
    Aggregate, AggregateRoot, ExpectedVersion, HistoryEntryId, ItemId, LotId, OrganizationId,
    UserId,
};
use batchledger_inventory::sync::validate_with_tolerance;
use batchledger_inventory::{
    ChangeKind, HistoryEntry, HistoryPage, InventoryItem, ItemRecord, LedgerCommand, LedgerError,
    LedgerEvent, LedgerResult, Lot, NewItem, SyncReport, Valuation,
};
use batchledger_units::{
    parse_amount, ConversionEngine, ConversionLog, ConversionRequest, ConversionResult,
    CustomUnitMapping, Unit, UnitCatalog,
};

use crate::config::LedgerConfig;
use crate::locks::ItemLocks;
use crate::store::{LedgerStore, Transaction};

/// Decimal places kept on a unit cost after converting it to the canonical unit.
const UNIT_COST_SCALE: u32 = 6;

/// A requested change to one item's stock.
///
/// `quantity` is a positive magnitude for additive and deductive kinds and the
/// absolute target for [`ChangeKind::Recount`]. Without `unit` it is taken to
/// be in the item's canonical unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub organization_id: OrganizationId,
    pub item_id: ItemId,
    pub change_kind: ChangeKind,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub note: Option<String>,
    pub actor: Option<UserId>,
    /// Cost per `unit` (or per canonical unit when `unit` is absent).
    pub unit_cost: Option<Decimal>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Receipt timestamp; defaults to now. Backdating reorders FIFO.
    pub occurred_at: Option<DateTime<Utc>>,
}

impl Adjustment {
    pub fn new(
        organization_id: OrganizationId,
        item_id: ItemId,
        change_kind: ChangeKind,
        quantity: Decimal,
    ) -> Self {
        Self {
            organization_id,
            item_id,
            change_kind,
            quantity,
            unit: None,
            note: None,
            actor: None,
            unit_cost: None,
            expires_at: None,
            occurred_at: None,
        }
    }

    /// Build from raw text, as received from a form or import file.
    pub fn parse(
        organization_id: OrganizationId,
        item_id: ItemId,
        change_kind: &str,
        quantity: &str,
    ) -> LedgerResult<Self> {
        let change_kind = change_kind.parse::<ChangeKind>()?;
        let quantity = parse_amount(quantity)?;
        Ok(Self::new(organization_id, item_id, change_kind, quantity))
    }

    pub fn in_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn by(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }
}

/// One step of a FIFO walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: LotId,
    pub amount: Decimal,
    pub remaining_after: Decimal,
    pub unit_cost: Decimal,
}

/// What a committed adjustment did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentReceipt {
    pub item_id: ItemId,
    pub change_kind: ChangeKind,
    /// Magnitude (or recount target) in the canonical unit.
    pub quantity: Decimal,
    pub unit: String,
    pub quantity_delta: Decimal,
    pub resulting_quantity: Decimal,
    pub lots_created: Vec<LotId>,
    pub lots_drawn: Vec<LotDraw>,
    /// FIFO cost of everything drawn.
    pub cost_of_goods: Decimal,
    pub conversion: Option<ConversionResult>,
    pub history: Vec<HistoryEntryId>,
}

impl AdjustmentReceipt {
    pub fn is_noop(&self) -> bool {
        self.lots_created.is_empty() && self.lots_drawn.is_empty() && self.history.is_empty()
    }
}

/// Facade over the store, unit catalog, converter and item locks.
pub struct LedgerService<S> {
    store: S,
    catalog: Arc<UnitCatalog>,
    converter: ConversionEngine,
    locks: ItemLocks,
    config: LedgerConfig,
}

impl<S: core::fmt::Debug> core::fmt::Debug for LedgerService<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LedgerService")
            .field("store", &self.store)
            .field("converter", &self.converter)
            .field("config", &self.config)
            .finish()
    }
}

impl<S: LedgerStore> LedgerService<S> {
    pub fn new(store: S, catalog: Arc<UnitCatalog>, config: LedgerConfig) -> Self {
        let converter = ConversionEngine::new(catalog.clone()).with_scale(config.quantity_scale);
        Self {
            store,
            catalog,
            converter,
            locks: ItemLocks::new(),
            config,
        }
    }

    /// Record every conversion in `log` (ignored when conversion logging is
    /// switched off in the config).
    pub fn with_conversion_log(mut self, log: Arc<dyn ConversionLog>) -> Self {
        if self.config.log_conversions {
            self.converter = ConversionEngine::new(self.catalog.clone())
                .with_scale(self.config.quantity_scale)
                .with_log(log);
        } else {
            tracing::debug!("conversion logging disabled; log sink ignored");
        }
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &UnitCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn create_item(
        &self,
        organization_id: OrganizationId,
        name: impl Into<String>,
        canonical_unit: &str,
        density: Option<Decimal>,
    ) -> LedgerResult<ItemRecord> {
        let unit = self
            .catalog
            .resolve(Some(organization_id), canonical_unit)
            .ok_or_else(|| LedgerError::UnknownUnit(canonical_unit.to_string()))?;

        let item = InventoryItem::create(NewItem {
            organization_id,
            name: name.into(),
            canonical_unit: unit.name().to_string(),
            density,
        })?;
        let record = item.record();
        self.store.insert_item(record.clone())?;

        tracing::info!(item_id = %record.id, unit = %record.canonical_unit, "inventory item created");
        Ok(record)
    }

    pub fn set_density(
        &self,
        organization_id: OrganizationId,
        item_id: ItemId,
        density: Option<Decimal>,
    ) -> LedgerResult<ItemRecord> {
        self.locks
            .with_lock(organization_id, item_id, self.config.lock_timeout, || {
                let mut item = self.load(organization_id, item_id)?;
                let expected = ExpectedVersion::Exact(item.version());
                item.set_density(density)?;
                let record = item.record();
                Transaction::begin(&self.store, record.clone(), expected).commit()?;
                Ok(record)
            })
    }

    pub fn register_custom_unit(&self, organization_id: OrganizationId, unit: Unit) -> LedgerResult<()> {
        self.catalog.register_custom_unit(organization_id, unit)?;
        Ok(())
    }

    pub fn register_custom_mapping(&self, mapping: CustomUnitMapping) -> LedgerResult<()> {
        self.catalog.register_mapping(mapping)?;
        Ok(())
    }

    pub fn item(&self, organization_id: OrganizationId, item_id: ItemId) -> LedgerResult<InventoryItem> {
        self.load(organization_id, item_id)
    }

    pub fn list_items(&self, organization_id: OrganizationId) -> LedgerResult<Vec<ItemRecord>> {
        Ok(self.store.list_items(organization_id)?)
    }

    /// Apply one adjustment atomically under the item lock.
    pub fn apply_adjustment(&self, adjustment: Adjustment) -> LedgerResult<AdjustmentReceipt> {
        let organization_id = adjustment.organization_id;
        let item_id = adjustment.item_id;
        let change_kind = adjustment.change_kind;

        let result = self
            .locks
            .with_lock(organization_id, item_id, self.config.lock_timeout, || {
                self.adjust_locked(&adjustment)
            });

        match &result {
            Ok(receipt) => tracing::info!(
                %item_id,
                %change_kind,
                quantity = %receipt.quantity,
                delta = %receipt.quantity_delta,
                resulting = %receipt.resulting_quantity,
                history = receipt.history.len(),
                "adjustment committed"
            ),
            // Committed sync faults are reported at error level where detected.
            Err(err) if err.is_fatal() => {}
            Err(err) => tracing::warn!(%item_id, %change_kind, error = %err, "adjustment rejected"),
        }
        result
    }

    fn adjust_locked(&self, adjustment: &Adjustment) -> LedgerResult<AdjustmentReceipt> {
        let organization_id = adjustment.organization_id;
        let item = self.load(organization_id, adjustment.item_id)?;
        let item_id = item.id_typed();
        let canonical_unit = item.canonical_unit().to_string();

        let (quantity, conversion) = self.to_canonical(&item, adjustment)?;
        let unit_cost = canonical_unit_cost(adjustment, conversion.as_ref())?;

        let command = LedgerCommand {
            change_kind: adjustment.change_kind,
            quantity,
            note: adjustment.note.clone(),
            actor: adjustment.actor,
            unit_cost,
            expires_at: adjustment.expires_at,
            occurred_at: adjustment.occurred_at.unwrap_or_else(Utc::now),
        };

        let events = item.handle(&command)?;
        if events.is_empty() {
            return Ok(AdjustmentReceipt {
                item_id,
                change_kind: adjustment.change_kind,
                quantity,
                unit: canonical_unit,
                quantity_delta: Decimal::ZERO,
                resulting_quantity: item.quantity(),
                lots_created: Vec::new(),
                lots_drawn: Vec::new(),
                cost_of_goods: Decimal::ZERO,
                conversion,
                history: Vec::new(),
            });
        }

        let mut next = item.clone();
        for event in &events {
            next.apply(event);
        }

        let report = validate_with_tolerance(&next, self.config.sync_tolerance);
        if !report.is_valid {
            tracing::warn!(%item_id, message = %report.message, "adjustment would leave item out of sync");
            return Err(sync_fault(&report, false));
        }

        let mut tx = Transaction::begin(
            &self.store,
            next.record(),
            ExpectedVersion::Exact(item.version()),
        );
        let mut lots_created = Vec::new();
        let mut lots_drawn = Vec::new();
        let mut cost_of_goods = Decimal::ZERO;
        let mut history = Vec::new();

        for event in &events {
            match event {
                LedgerEvent::LotReceived { lot, .. } => {
                    lots_created.push(lot.id());
                    if let Some(lot) = next.lot(lot.id()) {
                        tx.upsert_lot(lot.clone());
                    }
                }
                LedgerEvent::LotDrawn {
                    lot_id,
                    amount,
                    remaining_after,
                    unit_cost,
                    ..
                } => {
                    tracing::debug!(%item_id, %lot_id, %amount, %remaining_after, "fifo draw");
                    cost_of_goods += *amount * *unit_cost;
                    lots_drawn.push(LotDraw {
                        lot_id: *lot_id,
                        amount: *amount,
                        remaining_after: *remaining_after,
                        unit_cost: *unit_cost,
                    });
                    if let Some(lot) = next.lot(*lot_id) {
                        tx.upsert_lot(lot.clone());
                    }
                }
                LedgerEvent::QuantitySet { .. } => {}
            }

            if let Some(entry) = event.history_entry(item_id, &canonical_unit) {
                history.push(entry.id);
                tx.append_history(entry);
            }
        }

        tx.commit()?;

        let stored = self.load(organization_id, item_id)?;
        let report = validate_with_tolerance(&stored, self.config.sync_tolerance);
        if !report.is_valid {
            tracing::error!(
                critical = true,
                %item_id,
                cached = %report.cached_quantity,
                lots = %report.lot_total,
                "ledger out of sync after commit"
            );
            return Err(sync_fault(&report, true));
        }

        Ok(AdjustmentReceipt {
            item_id,
            change_kind: adjustment.change_kind,
            quantity,
            unit: canonical_unit,
            quantity_delta: stored.quantity() - item.quantity(),
            resulting_quantity: stored.quantity(),
            lots_created,
            lots_drawn,
            cost_of_goods,
            conversion,
            history,
        })
    }

    fn to_canonical(
        &self,
        item: &InventoryItem,
        adjustment: &Adjustment,
    ) -> LedgerResult<(Decimal, Option<ConversionResult>)> {
        let Some(unit) = adjustment.unit.as_deref() else {
            return Ok((round_to(adjustment.quantity, self.config.quantity_scale), None));
        };

        let request = ConversionRequest::new(adjustment.quantity, unit, item.canonical_unit())
            .for_organization(adjustment.organization_id)
            .for_item(item.id_typed(), item.density());
        let result = self.converter.convert(&request)?;
        Ok((result.value, Some(result)))
    }

    /// Convert an amount between units, optionally using an item's density.
    pub fn convert(
        &self,
        organization_id: OrganizationId,
        amount: Decimal,
        from_unit: &str,
        to_unit: &str,
        item_id: Option<ItemId>,
        density: Option<Decimal>,
    ) -> LedgerResult<ConversionResult> {
        let mut request =
            ConversionRequest::new(amount, from_unit, to_unit).for_organization(organization_id);
        if let Some(item_id) = item_id {
            let item = self.load(organization_id, item_id)?;
            request = request.for_item(item_id, item.density());
        }
        if let Some(density) = density {
            request = request.with_density(density);
        }
        Ok(self.converter.convert(&request)?)
    }

    pub fn validate_sync(
        &self,
        organization_id: OrganizationId,
        item_id: ItemId,
    ) -> LedgerResult<SyncReport> {
        let item = self.load(organization_id, item_id)?;
        Ok(validate_with_tolerance(&item, self.config.sync_tolerance))
    }

    /// One report per item in the organization.
    pub fn validate_all(&self, organization_id: OrganizationId) -> LedgerResult<Vec<SyncReport>> {
        let mut reports = Vec::new();
        for record in self.store.list_items(organization_id)? {
            let report = self.validate_sync(organization_id, record.id)?;
            if !report.is_valid {
                tracing::warn!(item_id = %record.id, message = %report.message, "item out of sync");
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// Lots oldest first; `active_only` keeps lots with stock left.
    pub fn get_lots(
        &self,
        organization_id: OrganizationId,
        item_id: ItemId,
        active_only: bool,
    ) -> LedgerResult<Vec<Lot>> {
        let item = self.load(organization_id, item_id)?;
        Ok(item
            .lots()
            .iter()
            .filter(|lot| !active_only || lot.is_active())
            .cloned()
            .collect())
    }

    /// History newest first. `page` is 1-based; `page_size` is clamped to
    /// `1..=max_page_size`.
    pub fn get_history(
        &self,
        organization_id: OrganizationId,
        item_id: ItemId,
        page: usize,
        page_size: usize,
    ) -> LedgerResult<HistoryPage> {
        let mut entries = self.store.history(organization_id, item_id)?;
        entries.reverse();
        let page_size = page_size.min(self.config.max_page_size).max(1);
        Ok(HistoryPage::paginate(entries, page, page_size))
    }

    /// Full history as a JSON array, oldest first.
    pub fn export_history(&self, organization_id: OrganizationId, item_id: ItemId) -> LedgerResult<String> {
        let entries = self.store.history(organization_id, item_id)?;
        serde_json::to_string(&entries).map_err(|e| LedgerError::Store(e.to_string()))
    }

    /// Append an audit-only (zero-delta) history entry.
    pub fn record_audit(
        &self,
        organization_id: OrganizationId,
        item_id: ItemId,
        change_kind: ChangeKind,
        note: impl Into<String>,
        actor: Option<UserId>,
    ) -> LedgerResult<HistoryEntry> {
        let note = note.into();
        self.locks
            .with_lock(organization_id, item_id, self.config.lock_timeout, || {
                let item = self.load(organization_id, item_id)?;
                let entry = HistoryEntry::record(
                    item.id_typed(),
                    change_kind,
                    Decimal::ZERO,
                    Some(note),
                    actor,
                    None,
                    Utc::now(),
                );
                self.store.append_history(organization_id, entry.clone())?;
                Ok(entry)
            })
    }

    /// Lots with stock left that expire at or before `as_of`, oldest first.
    pub fn expired_lots(
        &self,
        organization_id: OrganizationId,
        item_id: ItemId,
        as_of: DateTime<Utc>,
    ) -> LedgerResult<Vec<Lot>> {
        let item = self.load(organization_id, item_id)?;
        Ok(item.expired_lots(as_of).into_iter().cloned().collect())
    }

    pub fn valuation(&self, organization_id: OrganizationId, item_id: ItemId) -> LedgerResult<Valuation> {
        let item = self.load(organization_id, item_id)?;
        Ok(Valuation::of(&item))
    }

    fn load(&self, organization_id: OrganizationId, item_id: ItemId) -> LedgerResult<InventoryItem> {
        self.store
            .load_item(organization_id, item_id)?
            .ok_or(LedgerError::ItemNotFound(item_id))
    }
}

/// Unit cost per canonical unit: the total cost is preserved across the
/// conversion.
fn canonical_unit_cost(
    adjustment: &Adjustment,
    conversion: Option<&ConversionResult>,
) -> LedgerResult<Option<Decimal>> {
    let (Some(cost), Some(conversion)) = (adjustment.unit_cost, conversion) else {
        return Ok(adjustment.unit_cost);
    };
    if conversion.value.is_zero() {
        return Ok(Some(cost));
    }
    cost.checked_mul(adjustment.quantity)
        .and_then(|total| total.checked_div(conversion.value))
        .map(|per_unit| Some(round_to(per_unit, UNIT_COST_SCALE)))
        .ok_or_else(|| LedgerError::InvalidAmount(format!("unit cost {cost} is out of range")))
}

fn sync_fault(report: &SyncReport, committed: bool) -> LedgerError {
    LedgerError::SyncFault {
        item_id: report.item_id,
        cached_quantity: report.cached_quantity,
        lot_total: report.lot_total,
        committed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchledger_units::ConversionKind;
    use rust_decimal_macros::dec;

    fn conversion(value: Decimal) -> ConversionResult {
        ConversionResult {
            value,
            kind: ConversionKind::Direct,
            density_used: None,
            from_unit: "kg".into(),
            to_unit: "g".into(),
        }
    }

    #[test]
    fn parse_reads_kind_and_amount() {
        let (org, item) = (OrganizationId::new(), ItemId::new());
        let adj = Adjustment::parse(org, item, "sale", " 2.5 ").unwrap();
        assert_eq!(adj.change_kind, ChangeKind::Sale);
        assert_eq!(adj.quantity, dec!(2.5));

        assert!(matches!(
            Adjustment::parse(org, item, "borrowed", "1"),
            Err(LedgerError::UnknownChangeKind(_))
        ));
        assert!(matches!(
            Adjustment::parse(org, item, "use", "a few"),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn unit_cost_follows_the_conversion() {
        let adj = Adjustment::new(OrganizationId::new(), ItemId::new(), ChangeKind::Restock, dec!(2))
            .in_unit("kg")
            .with_unit_cost(dec!(12));
        // 2 kg at 12/kg = 24 total, spread over 2000 g.
        let cost = canonical_unit_cost(&adj, Some(&conversion(dec!(2000)))).unwrap();
        assert_eq!(cost, Some(dec!(0.012)));

        let no_unit = Adjustment::new(OrganizationId::new(), ItemId::new(), ChangeKind::Restock, dec!(2))
            .with_unit_cost(dec!(3));
        assert_eq!(canonical_unit_cost(&no_unit, None).unwrap(), Some(dec!(3)));
    }
}
