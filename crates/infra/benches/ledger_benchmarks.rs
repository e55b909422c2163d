use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use batchledger_core::{Aggregate, OrganizationId};
use batchledger_infra::{Adjustment, InMemoryLedgerStore, LedgerConfig, LedgerService};
use batchledger_inventory::{ChangeKind, InventoryItem, LedgerCommand, NewItem};
use batchledger_units::{ConversionEngine, ConversionRequest, UnitCatalog};

/// An item holding `lots` lots of 10 g each, one day apart.
fn item_with_lots(lots: usize) -> InventoryItem {
    let mut item = InventoryItem::create(NewItem {
        organization_id: OrganizationId::new(),
        name: "Beeswax".to_string(),
        canonical_unit: "g".to_string(),
        density: Some(dec!(0.96)),
    })
    .unwrap();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for i in 0..lots {
        let mut cmd = LedgerCommand::new(ChangeKind::Restock, dec!(10), start + Duration::days(i as i64));
        cmd.unit_cost = Some(dec!(0.04));
        for event in item.handle(&cmd).unwrap() {
            item.apply(&event);
        }
    }
    item
}

fn bench_fifo_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("fifo_decision");

    for lots in [10usize, 100, 1_000] {
        let item = item_with_lots(lots);
        // Draw across half of the lots.
        let take = Decimal::from(lots as u64 * 5);
        let cmd = LedgerCommand::new(ChangeKind::Use, take, Utc::now());

        group.throughput(Throughput::Elements(lots as u64 / 2));
        group.bench_with_input(BenchmarkId::new("decide_draw", lots), &lots, |b, _| {
            b.iter(|| black_box(item.handle(black_box(&cmd)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decide_and_apply", lots), &lots, |b, _| {
            b.iter(|| {
                let mut next = item.clone();
                for event in item.handle(&cmd).unwrap() {
                    next.apply(&event);
                }
                black_box(next)
            });
        });
    }

    group.finish();
}

fn bench_service_adjustment(c: &mut Criterion) {
    let mut group = c.benchmark_group("service_adjustment");

    group.bench_function("restock_then_use", |b| {
        let service = LedgerService::new(
            InMemoryLedgerStore::new(),
            Arc::new(UnitCatalog::standard()),
            LedgerConfig::default(),
        );
        let org = OrganizationId::new();
        let item = service.create_item(org, "Beeswax", "g", None).unwrap().id;

        b.iter(|| {
            service
                .apply_adjustment(Adjustment::new(org, item, ChangeKind::Restock, black_box(dec!(10))))
                .unwrap();
            service
                .apply_adjustment(Adjustment::new(org, item, ChangeKind::Use, black_box(dec!(10))))
                .unwrap();
        });
    });

    group.bench_function("deduct_in_kg_across_lots", |b| {
        let service = LedgerService::new(
            InMemoryLedgerStore::new(),
            Arc::new(UnitCatalog::standard()),
            LedgerConfig::default(),
        );
        let org = OrganizationId::new();
        let item = service.create_item(org, "Shea butter", "g", None).unwrap().id;

        b.iter(|| {
            for _ in 0..4 {
                service
                    .apply_adjustment(Adjustment::new(org, item, ChangeKind::Restock, dec!(250)))
                    .unwrap();
            }
            service
                .apply_adjustment(Adjustment::new(org, item, ChangeKind::Batch, dec!(1)).in_unit("kg"))
                .unwrap();
        });
    });

    group.finish();
}

fn bench_conversion(c: &mut Criterion) {
    let engine = ConversionEngine::new(Arc::new(UnitCatalog::standard()));
    let mut group = c.benchmark_group("conversion");

    group.bench_function("same_dimension", |b| {
        let req = ConversionRequest::new(dec!(3.5), "lb", "g");
        b.iter(|| black_box(engine.convert(black_box(&req)).unwrap()));
    });
    group.bench_function("through_density", |b| {
        let req = ConversionRequest::new(dec!(250), "ml", "oz").with_density(dec!(0.92));
        b.iter(|| black_box(engine.convert(black_box(&req)).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_fifo_decision, bench_service_adjustment, bench_conversion);
criterion_main!(benches);
