//! Benchmarks the C3 VWAP greedy walk over a range of book depths.

use arb_core::book::{Asset, BookLevel, TradeSide, Venue};
use arb_core::vwap::compute_vwap;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn synthetic_book(depth: usize) -> arb_core::book::ReadOnlyBook {
    let asset = Asset::new("BENCH-YES", Venue::CentralizedClob);
    let mut asks = Vec::with_capacity(depth);
    let mut bids = Vec::with_capacity(depth);
    for i in 0..depth {
        let step = Decimal::new(i as i64, 3);
        asks.push(BookLevel::new(dec!(0.50) + step, dec!(100)));
        bids.push(BookLevel::new(dec!(0.49) - step, dec!(100)));
    }
    arb_core::book::ReadOnlyBook {
        asset,
        bids,
        asks,
        timestamp_ms: 0,
        fingerprint: 0,
    }
}

fn bench_vwap(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_vwap");
    for depth in [5usize, 20, 100] {
        let book = synthetic_book(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| compute_vwap(black_box(&book), TradeSide::Buy, black_box(dec!(250))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_vwap);
criterion_main!(benches);
