//! Benchmarks C2 snapshot application and point-in-time snapshot
//! publication through `BookManager`.

use arb_core::book::manager::BookManager;
use arb_core::book::{Asset, BookLevel, Venue};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn levels(depth: usize, base: Decimal, step: Decimal) -> Vec<BookLevel> {
    (0..depth)
        .map(|i| BookLevel::new(base - step * Decimal::from(i as i64), dec!(100)))
        .collect()
}

fn bench_apply_snapshot(c: &mut Criterion) {
    let manager = BookManager::new(20);
    let asset = Asset::new("BENCH-YES", Venue::CentralizedClob);
    let bids = levels(20, dec!(0.49), dec!(0.001));
    let asks = levels(20, dec!(0.51), dec!(-0.001));

    c.bench_function("apply_snapshot_depth_20", |b| {
        b.iter(|| {
            manager.apply_snapshot(black_box(&asset), black_box(bids.clone()), black_box(asks.clone()), 0);
        });
    });
}

fn bench_snapshot_read(c: &mut Criterion) {
    let manager = BookManager::new(20);
    let asset = Asset::new("BENCH-YES", Venue::CentralizedClob);
    manager.apply_snapshot(&asset, levels(20, dec!(0.49), dec!(0.001)), levels(20, dec!(0.51), dec!(-0.001)), 0);

    c.bench_function("read_only_snapshot", |b| {
        b.iter(|| black_box(manager.snapshot(black_box(&asset), Some(20))));
    });
}

criterion_group!(benches, bench_apply_snapshot, bench_snapshot_read);
criterion_main!(benches);
