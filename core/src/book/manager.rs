//! Per-asset book ownership, update application, and publication.
//!
//! Grounded on `orderbook::depth` for the level math and on
//! `risk::RiskManager`'s layered-validation idiom for the
//! snapshot-before-delta / fingerprint-check ordering. `DashMap` gives each
//! asset its own lock (as the teacher uses it for order tracking in
//! `execution/production.rs`); `ArcSwap` publishes a point-in-time
//! [`ReadOnlyBook`] so C3/C4 never block C2's writer and a later update can
//! never retroactively mutate a snapshot already handed out.

use super::{Asset, BookLevel, BookSide, OrderBook, ReadOnlyBook, TradeEvent};
use crate::alerts::{Alert, AlertCategory, AlertManager, AlertSeverity};
use crate::cache::{self, Cache};
use crate::errors::{ArbError, Result};
use crate::metrics::MetricsRegistry;
use crate::vwap::VwapResult;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type Subscriber = Box<dyn Fn(&ReadOnlyBook) + Send + Sync>;

struct AssetState {
    book: Mutex<OrderBook>,
    published: ArcSwap<Option<ReadOnlyBook>>,
    subscribers: Mutex<Vec<Subscriber>>,
    /// Set when the book is known crossed; cleared by the next clean
    /// snapshot. Gates [`BookManager::snapshot`] so C3/C4 never see a book
    /// known to be in a bad state (§4.2).
    unhealthy: AtomicBool,
    trade_history: Mutex<VecDeque<TradeEvent>>,
}

/// Owns every per-asset [`OrderBook`] and is the sole mutator of book state
/// (§3 Ownership). C3/C4 only ever see [`ReadOnlyBook`] snapshots obtained
/// through [`BookManager::snapshot`].
pub struct BookManager {
    assets: DashMap<Asset, Arc<AssetState>>,
    default_depth_k: usize,
    trade_history_len: usize,
    cache: Option<Arc<Cache>>,
    metrics: Option<Arc<MetricsRegistry>>,
    alerts: Option<Arc<AlertManager>>,
    desync_count: AtomicU64,
}

impl BookManager {
    pub fn new(default_depth_k: usize) -> Self {
        Self {
            assets: DashMap::new(),
            default_depth_k,
            trade_history_len: 100,
            cache: None,
            metrics: None,
            alerts: None,
            desync_count: AtomicU64::new(0),
        }
    }

    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_alerts(mut self, alerts: Arc<AlertManager>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn with_trade_history_len(mut self, len: usize) -> Self {
        self.trade_history_len = len;
        self
    }

    pub fn desync_count(&self) -> u64 {
        self.desync_count.load(Ordering::Relaxed)
    }

    fn state_for(&self, asset: &Asset) -> Arc<AssetState> {
        self.assets
            .entry(asset.clone())
            .or_insert_with(|| {
                Arc::new(AssetState {
                    book: Mutex::new(OrderBook::new(asset.clone())),
                    published: ArcSwap::from_pointee(None),
                    subscribers: Mutex::new(Vec::new()),
                    unhealthy: AtomicBool::new(false),
                    trade_history: Mutex::new(VecDeque::new()),
                })
            })
            .clone()
    }

    /// Replace both sides of `asset`'s book. Always legal; used for initial
    /// load, reconnect, and desync recovery. A snapshot that is itself
    /// crossed leaves the asset unhealthy; otherwise this is the "next
    /// clean snapshot" that clears a prior unhealthy mark (§4.2).
    pub fn apply_snapshot(
        &self,
        asset: &Asset,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
        timestamp_ms: u64,
    ) {
        let state = self.state_for(asset);
        let crossed = {
            let mut book = state.book.lock();
            book.apply_snapshot(bids, asks, timestamp_ms);
            book.is_crossed()
        };
        state.unhealthy.store(crossed, Ordering::Relaxed);
        if crossed {
            self.record_crossed(asset, &state);
        }
        self.publish(asset, &state);
    }

    /// Apply a single level change. Discards the delta and raises
    /// [`ArbError::Desync`] if no snapshot has ever been applied for this
    /// asset, per §4.2. If the book is crossed after the update, the asset
    /// is marked unhealthy and [`ArbError::CrossedBook`] is returned without
    /// publishing the bad snapshot; it stays suppressed from
    /// [`BookManager::snapshot`] until the next clean [`apply_snapshot`].
    pub fn apply_delta(
        &self,
        asset: &Asset,
        side: BookSide,
        price: rust_decimal::Decimal,
        new_size: rust_decimal::Decimal,
        timestamp_ms: u64,
    ) -> Result<()> {
        let state = self.state_for(asset);
        let crossed = {
            let mut book = state.book.lock();
            if !book.has_snapshot() {
                self.desync_count.fetch_add(1, Ordering::Relaxed);
                warn!(%asset, "delta arrived before any snapshot, discarding");
                return Err(ArbError::Desync {
                    asset: asset.clone(),
                    reason: "delta before snapshot".to_string(),
                });
            }
            book.apply_level(side, price, new_size, timestamp_ms);
            if book.is_crossed() {
                let (b, a) = (book.best_bid().unwrap(), book.best_ask().unwrap());
                Some((b.price, a.price))
            } else {
                None
            }
        };

        if let Some((bid, ask)) = crossed {
            state.unhealthy.store(true, Ordering::Relaxed);
            warn!(%asset, %bid, %ask, "book crossed after delta, suppressing until next clean snapshot");
            self.record_crossed(asset, &state);
            return Err(ArbError::CrossedBook { asset: asset.clone(), bid, ask });
        }

        self.publish(asset, &state);
        Ok(())
    }

    /// Recompute the local fingerprint and compare against a venue-supplied
    /// one. Mismatch raises [`ArbError::Desync`] and the caller (C1) should
    /// request a fresh snapshot.
    pub fn verify_fingerprint(&self, asset: &Asset, venue_fingerprint: u64) -> Result<()> {
        let state = self.state_for(asset);
        let local = state.book.lock().fingerprint();
        if local != venue_fingerprint {
            self.desync_count.fetch_add(1, Ordering::Relaxed);
            if let Some(metrics) = &self.metrics {
                metrics.book().desync_total.inc();
            }
            if let Some(alerts) = &self.alerts {
                let _ = alerts.send(
                    Alert::new(AlertCategory::BookDesync, asset.id.clone(), AlertSeverity::Warning, "fingerprint mismatch")
                        .with_detail("local", format!("{local:#x}"))
                        .with_detail("venue", format!("{venue_fingerprint:#x}")),
                );
            }
            return Err(ArbError::Desync {
                asset: asset.clone(),
                reason: format!("fingerprint mismatch: local={local:#x} venue={venue_fingerprint:#x}"),
            });
        }
        Ok(())
    }

    fn record_crossed(&self, asset: &Asset, state: &Arc<AssetState>) {
        let _ = state;
        if let Some(metrics) = &self.metrics {
            metrics.book().crossed_book_total.with_label_values(&[&asset.id]).inc();
        }
        if let Some(alerts) = &self.alerts {
            let _ = alerts.send(Alert::new(
                AlertCategory::BookDesync,
                asset.id.clone(),
                AlertSeverity::Error,
                "book crossed",
            ));
        }
    }

    /// A read-only, point-in-time copy of the top-K levels. Safe to hold
    /// across suspension points; never mutated by a later `apply_*` call.
    /// Returns `None` while the asset is marked unhealthy (§4.2), suppressing
    /// it from VWAP/allocator callers until the next clean snapshot.
    pub fn snapshot(&self, asset: &Asset, depth_k: Option<usize>) -> Option<ReadOnlyBook> {
        let depth_k = depth_k.unwrap_or(self.default_depth_k);
        let entry = self.assets.get(asset)?;
        if entry.unhealthy.load(Ordering::Relaxed) {
            return None;
        }
        let book = entry.book.lock();
        if !book.has_snapshot() {
            return None;
        }
        Some(book.snapshot(depth_k))
    }

    /// Whether `asset` is currently suppressed due to a crossed book.
    pub fn is_unhealthy(&self, asset: &Asset) -> bool {
        self.assets.get(asset).map(|e| e.unhealthy.load(Ordering::Relaxed)).unwrap_or(false)
    }

    pub fn subscribe(&self, asset: &Asset, callback: Subscriber) {
        let state = self.state_for(asset);
        state.subscribers.lock().push(callback);
    }

    /// Record a normalized trade print for `asset`, bounded to the last
    /// `trade_history_len` entries, and publish it to the trade channel
    /// cache (§6) if a cache is attached.
    pub fn record_trade(&self, event: TradeEvent) {
        let asset = event.asset.clone();
        let state = self.state_for(&asset);
        {
            let mut history = state.trade_history.lock();
            history.push_back(event.clone());
            while history.len() > self.trade_history_len {
                history.pop_front();
            }
        }
        if let Some(cache) = &self.cache {
            if let Ok(json) = serde_json::to_string(&event) {
                cache.publish(cache::keys::trade_channel(&asset.id), json);
            }
        }
    }

    /// The bounded trade print history retained for `asset`, oldest first.
    pub fn trade_history(&self, asset: &Asset) -> Vec<TradeEvent> {
        self.assets
            .get(asset)
            .map(|e| e.trade_history.lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    fn publish(&self, asset: &Asset, state: &Arc<AssetState>) {
        let snap = {
            let book = state.book.lock();
            book.snapshot(self.default_depth_k)
        };
        state.published.store(Arc::new(Some(snap.clone())));
        for cb in state.subscribers.lock().iter() {
            cb(&snap);
        }
        if self.cache.is_some() {
            self.publish_cache_inner(asset, &snap);
        }
    }

    fn publish_cache_inner(&self, asset: &Asset, snap: &ReadOnlyBook) {
        if let Some(cache) = &self.cache {
            if let Ok(json) = serde_json::to_string(snap) {
                cache.put_with_ttl(
                    cache::keys::orderbook(&asset.venue.to_string(), &asset.id),
                    json,
                    Duration::from_secs(5),
                );
            }
        }
        debug!(%asset, "book published to cache");
    }

    /// Publish a computed VWAP result under `vwap:<asset>:<depth_usd>` for
    /// external observers (§6). Callers own `vwap::compute_vwap` itself —
    /// this only handles the cache side effect, keeping the VWAP engine
    /// free of any I/O.
    pub fn publish_vwap(&self, asset: &Asset, depth_usd: &str, result: &VwapResult) {
        let Some(cache) = &self.cache else { return };
        if let Ok(json) = serde_json::to_string(result) {
            cache.put_with_ttl(cache::keys::vwap(&asset.id, depth_usd), json, Duration::from_secs(5));
        }
    }

    /// Force a cache republish of the last known snapshot without waiting
    /// for the next `apply_*` call.
    pub fn publish_cache(&self, asset: &Asset) {
        if let Some(entry) = self.assets.get(asset) {
            if let Some(snap) = entry.published.load().as_ref() {
                self.publish_cache_inner(asset, snap);
            }
        }
    }
}

impl Default for BookManager {
    fn default() -> Self {
        Self::new(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{TradeSide, Venue};
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;

    fn asset() -> Asset {
        Asset::new("EVENT-YES", Venue::CentralizedClob)
    }

    #[test]
    fn delta_before_snapshot_is_desync() {
        let mgr = BookManager::default();
        let err = mgr
            .apply_delta(&asset(), BookSide::Bid, dec!(0.5), dec!(10), 1)
            .unwrap_err();
        assert!(matches!(err, ArbError::Desync { .. }));
        assert_eq!(mgr.desync_count(), 1);
    }

    #[test]
    fn snapshot_then_delta_applies_cleanly() {
        let mgr = BookManager::default();
        mgr.apply_snapshot(&asset(), vec![BookLevel::new(dec!(0.50), dec!(100))], vec![], 1);
        mgr.apply_delta(&asset(), BookSide::Bid, dec!(0.51), dec!(20), 2)
            .unwrap();
        let snap = mgr.snapshot(&asset(), None).unwrap();
        assert_eq!(snap.best_bid().unwrap().price, dec!(0.51));
    }

    #[test]
    fn subscribers_notified_on_apply() {
        let mgr = BookManager::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        mgr.subscribe(
            &asset(),
            Box::new(move |_snap| {
                calls2.fetch_add(1, Ordering::Relaxed);
            }),
        );
        mgr.apply_snapshot(&asset(), vec![], vec![], 1);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn fingerprint_mismatch_raises_desync() {
        let mgr = BookManager::default();
        mgr.apply_snapshot(&asset(), vec![BookLevel::new(dec!(0.5), dec!(1))], vec![], 1);
        let err = mgr.verify_fingerprint(&asset(), 0xdead_beef).unwrap_err();
        assert!(matches!(err, ArbError::Desync { .. }));
    }

    #[test]
    fn crossed_delta_returns_error_and_suppresses_snapshot() {
        let mgr = BookManager::default();
        mgr.apply_snapshot(&asset(), vec![BookLevel::new(dec!(0.49), dec!(10))], vec![BookLevel::new(dec!(0.51), dec!(10))], 1);
        let err = mgr
            .apply_delta(&asset(), BookSide::Bid, dec!(0.55), dec!(10), 2)
            .unwrap_err();
        assert!(matches!(err, ArbError::CrossedBook { .. }));
        assert!(mgr.is_unhealthy(&asset()));
        assert!(mgr.snapshot(&asset(), None).is_none());
    }

    #[test]
    fn clean_snapshot_clears_unhealthy_flag() {
        let mgr = BookManager::default();
        mgr.apply_snapshot(&asset(), vec![BookLevel::new(dec!(0.49), dec!(10))], vec![BookLevel::new(dec!(0.51), dec!(10))], 1);
        let _ = mgr.apply_delta(&asset(), BookSide::Bid, dec!(0.55), dec!(10), 2);
        assert!(mgr.is_unhealthy(&asset()));

        mgr.apply_snapshot(&asset(), vec![BookLevel::new(dec!(0.49), dec!(10))], vec![BookLevel::new(dec!(0.51), dec!(10))], 3);
        assert!(!mgr.is_unhealthy(&asset()));
        assert!(mgr.snapshot(&asset(), None).is_some());
    }

    #[test]
    fn publish_vwap_writes_cache_entry() {
        use crate::vwap::{compute_vwap, Quality};

        let cache = Cache::new();
        let mgr = BookManager::default().with_cache(cache.clone());
        let a = asset();
        mgr.apply_snapshot(&a, vec![], vec![BookLevel::new(dec!(0.52), dec!(200))], 1);
        let snap = mgr.snapshot(&a, None).unwrap();
        let result = compute_vwap(&snap, TradeSide::Buy, dec!(100));
        assert_eq!(result.quality, Quality::Excellent);
        mgr.publish_vwap(&a, "100", &result);
        assert!(cache.get(&cache::keys::vwap(&a.id, "100")).is_some());
    }

    #[test]
    fn record_trade_bounds_history() {
        let mgr = BookManager::default().with_trade_history_len(2);
        for i in 0..5u64 {
            mgr.record_trade(TradeEvent {
                asset: asset(),
                price: dec!(0.5),
                size: dec!(10),
                aggressor_side: TradeSide::Buy,
                timestamp_ms: i,
            });
        }
        let history = mgr.trade_history(&asset());
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].timestamp_ms, 3);
        assert_eq!(history[1].timestamp_ms, 4);
    }
}
