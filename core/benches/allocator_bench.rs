//! Benchmarks the C4 Frank-Wolfe allocator solve over a range of opportunity
//! set sizes.

use arb_core::allocator::{solve, Leg, Opportunity};
use arb_core::book::{Asset, Outcome, Venue};
use arb_core::config::AllocatorConfig;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn synthetic_opportunities(n: usize) -> Vec<Opportunity> {
    (0..n)
        .map(|i| {
            let price = dec!(0.40) + Decimal::new(i as i64 % 20, 3);
            Opportunity {
                id: format!("opp-{i}"),
                legs: vec![
                    Leg {
                        asset: Asset::new(format!("EVT-{i}-YES"), Venue::CentralizedClob),
                        outcome: Outcome::Yes,
                        target_price: price,
                        max_liquidity: dec!(500),
                    },
                    Leg {
                        asset: Asset::new(format!("EVT-{i}-NO"), Venue::BlockchainClob),
                        outcome: Outcome::No,
                        target_price: dec!(0.99) - price,
                        max_liquidity: dec!(500),
                    },
                ],
                expected_edge_per_contract: dec!(0.01) + Decimal::new(i as i64 % 5, 3),
                complement_id: None,
            }
        })
        .collect()
}

fn bench_solve(c: &mut Criterion) {
    let cfg = AllocatorConfig::default();
    let mut group = c.benchmark_group("allocator_solve");
    for n in [5usize, 25, 100] {
        let opportunities = synthetic_opportunities(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| solve(black_box(&opportunities), black_box(dec!(10_000)), black_box(&cfg)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_solve);
criterion_main!(benches);
