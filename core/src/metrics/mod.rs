//! Prometheus metrics, ported from `monitoring::metrics::MetricsRegistry`
//! and scaled down to this system's five components instead of a single
//! market maker's trading/performance/risk/system split.

pub mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    feed: Arc<FeedMetrics>,
    book: Arc<BookMetrics>,
    allocator: Arc<AllocatorMetrics>,
    executor: Arc<ExecutorMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());
        let feed = Arc::new(FeedMetrics::new(&registry)?);
        let book = Arc::new(BookMetrics::new(&registry)?);
        let allocator = Arc::new(AllocatorMetrics::new(&registry)?);
        let executor = Arc::new(ExecutorMetrics::new(&registry)?);
        info!("metrics registry initialized");
        Ok(Self { registry, feed, book, allocator, executor })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn feed(&self) -> &FeedMetrics {
        &self.feed
    }

    pub fn book(&self) -> &BookMetrics {
        &self.book
    }

    pub fn allocator(&self) -> &AllocatorMetrics {
        &self.allocator
    }

    pub fn executor(&self) -> &ExecutorMetrics {
        &self.executor
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            tracing::error!("FATAL: failed to create metrics registry: {e}");
            panic!("cannot create metrics registry")
        })
    }
}

/// C1 feed client metrics.
pub struct FeedMetrics {
    pub reconnects_total: IntCounterVec,
    pub events_total: IntCounterVec,
    pub connected: IntGauge,
}

impl FeedMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let reconnects_total = IntCounterVec::new(
            Opts::new("feed_reconnects_total", "Total reconnect attempts").namespace("arb"),
            &["venue"],
        )?;
        registry.register(Box::new(reconnects_total.clone()))?;

        let events_total = IntCounterVec::new(
            Opts::new("feed_events_total", "Total feed events processed").namespace("arb"),
            &["venue", "kind"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let connected = IntGauge::new("arb_feed_connected", "Number of currently connected venues")?;
        registry.register(Box::new(connected.clone()))?;

        Ok(Self { reconnects_total, events_total, connected })
    }
}

/// C2 book manager metrics.
pub struct BookMetrics {
    pub desync_total: IntCounter,
    pub crossed_book_total: IntCounterVec,
}

impl BookMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let desync_total = IntCounter::new("arb_book_desync_total", "Total desync events detected")?;
        registry.register(Box::new(desync_total.clone()))?;

        let crossed_book_total = IntCounterVec::new(
            Opts::new("book_crossed_total", "Total crossed-book observations").namespace("arb"),
            &["asset"],
        )?;
        registry.register(Box::new(crossed_book_total.clone()))?;

        Ok(Self { desync_total, crossed_book_total })
    }
}

/// C4 allocator metrics.
pub struct AllocatorMetrics {
    pub solve_latency_ms: Histogram,
    pub plans_approximate_total: IntCounter,
    pub legs_planned: IntGauge,
}

impl AllocatorMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let solve_latency_ms = Histogram::with_opts(
            HistogramOpts::new("arb_allocator_solve_latency_ms", "Allocator solve wall-clock time")
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        )?;
        registry.register(Box::new(solve_latency_ms.clone()))?;

        let plans_approximate_total = IntCounter::new(
            "arb_allocator_plans_approximate_total",
            "Total plans returned early due to the solve budget",
        )?;
        registry.register(Box::new(plans_approximate_total.clone()))?;

        let legs_planned = IntGauge::new("arb_allocator_legs_planned", "Legs in the most recent plan")?;
        registry.register(Box::new(legs_planned.clone()))?;

        Ok(Self { solve_latency_ms, plans_approximate_total, legs_planned })
    }
}

/// C5 atomic executor metrics.
pub struct ExecutorMetrics {
    pub trades_committed_total: IntCounter,
    pub trades_rolled_back_total: IntCounter,
    pub execution_latency_ms: Histogram,
    pub slippage_guard_trips_total: IntCounter,
}

impl ExecutorMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let trades_committed_total = IntCounter::new("arb_executor_trades_committed_total", "Total committed multi-leg trades")?;
        registry.register(Box::new(trades_committed_total.clone()))?;

        let trades_rolled_back_total = IntCounter::new("arb_executor_trades_rolled_back_total", "Total rolled-back multi-leg trades")?;
        registry.register(Box::new(trades_rolled_back_total.clone()))?;

        let execution_latency_ms = Histogram::with_opts(
            HistogramOpts::new("arb_executor_execution_latency_ms", "End-to-end trade execution latency")
                .buckets(vec![5.0, 10.0, 20.0, 30.0, 50.0, 75.0, 100.0, 150.0]),
        )?;
        registry.register(Box::new(execution_latency_ms.clone()))?;

        let slippage_guard_trips_total = IntCounter::new("arb_executor_slippage_guard_trips_total", "Total legs failed by the slippage guard")?;
        registry.register(Box::new(slippage_guard_trips_total.clone()))?;

        Ok(Self {
            trades_committed_total,
            trades_rolled_back_total,
            execution_latency_ms,
            slippage_guard_trips_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_registers_all_groups() {
        let registry = MetricsRegistry::new().unwrap();
        registry.feed().connected.set(2);
        registry.book().desync_total.inc();
        registry.allocator().legs_planned.set(3);
        registry.executor().trades_committed_total.inc();
        assert!(!registry.registry().gather().is_empty());
    }
}
