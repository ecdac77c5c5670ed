//! Reconnect/backoff/heartbeat supervision around a [`Feed`] implementation.
//!
//! Ported from `engine::generic::Engine::run`'s retry-until-valid-snapshot
//! loop and the teacher's backoff idiom in `resilience::backoff`. On
//! reconnect, the contract (§4.1) requires a fresh `BookSnapshot` for every
//! subscribed asset before any `BookDelta`; the supervisor enforces that by
//! re-subscribing through `Feed::connect` on every reconnect attempt.

use super::{ConnectionState, Feed, FeedEvent};
use crate::alerts::{Alert, AlertCategory, AlertManager, AlertSeverity};
use crate::book::{manager::BookManager, Asset, BookLevel, TradeEvent};
use crate::errors::ArbError;
use crate::metrics::MetricsRegistry;
use crate::risk::RiskGate;
use rand::Rng;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

fn state_to_u8(s: ConnectionState) -> u8 {
    match s {
        ConnectionState::Connected => 0,
        ConnectionState::Reconnecting => 1,
        ConnectionState::Disconnected => 2,
    }
}

fn u8_to_state(v: u8) -> ConnectionState {
    match v {
        0 => ConnectionState::Connected,
        1 => ConnectionState::Reconnecting,
        _ => ConnectionState::Disconnected,
    }
}

/// Drives one [`Feed`] against one [`BookManager`], applying every event it
/// yields and reconnecting with jittered exponential backoff on failure.
pub struct FeedSupervisor {
    assets: Vec<Asset>,
    backoff_schedule: Vec<Duration>,
    idle_timeout: Duration,
    state: Arc<AtomicU8>,
    metrics: Option<Arc<MetricsRegistry>>,
    alerts: Option<Arc<AlertManager>>,
    risk: Option<Arc<RiskGate>>,
}

impl FeedSupervisor {
    pub fn new(assets: Vec<Asset>, backoff_schedule_secs: &[u64], idle_timeout_secs: u64) -> Self {
        Self {
            assets,
            backoff_schedule: backoff_schedule_secs.iter().map(|s| Duration::from_secs(*s)).collect(),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
            state: Arc::new(AtomicU8::new(state_to_u8(ConnectionState::Disconnected))),
            metrics: None,
            alerts: None,
            risk: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_alerts(mut self, alerts: Arc<AlertManager>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn with_risk(mut self, risk: Arc<RiskGate>) -> Self {
        self.risk = Some(risk);
        self
    }

    pub fn state(&self) -> ConnectionState {
        u8_to_state(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, s: ConnectionState) {
        self.state.store(state_to_u8(s), Ordering::Release);
    }

    fn backoff_for_attempt(&self, attempt: usize) -> Duration {
        let base = self
            .backoff_schedule
            .get(attempt.min(self.backoff_schedule.len().saturating_sub(1)))
            .copied()
            .unwrap_or(Duration::from_secs(60));
        let jitter_ms = rand::thread_rng().gen_range(0..250);
        base + Duration::from_millis(jitter_ms)
    }

    /// Send a [`AlertCategory::VenueDisconnect`] alert for `venue`, escalated
    /// to `Critical` if no venue is left connected (§10.4).
    fn alert_disconnected(&self, venue: &str) {
        let Some(alerts) = &self.alerts else { return };
        let all_down = self.risk.as_ref().map(|r| r.connected_venue_count() == 0).unwrap_or(false);
        let (severity, message) = if all_down {
            (AlertSeverity::Critical, "all venues disconnected")
        } else {
            (AlertSeverity::Warning, "venue disconnected")
        };
        let _ = alerts.send(Alert::new(AlertCategory::VenueDisconnect, venue, severity, message));
    }

    /// Run forever (until `shutdown` is observed), applying events to
    /// `manager`. Intended to run on its own task per venue.
    pub async fn run(
        &self,
        mut feed: Box<dyn Feed>,
        manager: Arc<BookManager>,
        shutdown: Arc<std::sync::atomic::AtomicBool>,
    ) {
        let mut attempt = 0usize;
        let venue = feed.venue_name().to_string();

        while !shutdown.load(Ordering::Relaxed) {
            self.set_state(ConnectionState::Reconnecting);
            match feed.connect(&self.assets).await {
                Ok(()) => {
                    info!(venue = %venue, "feed connected");
                    self.set_state(ConnectionState::Connected);
                    attempt = 0;
                    if let Some(metrics) = &self.metrics {
                        metrics.feed().connected.inc();
                    }
                    if let Some(risk) = &self.risk {
                        risk.mark_venue_connected(&venue);
                    }
                }
                Err(e) => {
                    warn!(venue = %venue, error = %e, attempt, "feed connect failed");
                    if let Some(metrics) = &self.metrics {
                        metrics.feed().reconnects_total.with_label_values(&[&venue]).inc();
                    }
                    let delay = self.backoff_for_attempt(attempt);
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            loop {
                if shutdown.load(Ordering::Relaxed) {
                    return;
                }

                let next = tokio::time::timeout(self.idle_timeout, feed.next_event()).await;

                let event = match next {
                    Ok(Ok(event)) => event,
                    Ok(Err(e)) => {
                        error!(venue = %venue, error = %e, "feed event error, reconnecting");
                        break;
                    }
                    Err(_) => {
                        warn!(venue = %venue, "feed idle timeout, reconnecting");
                        break;
                    }
                };

                let Some(event) = event else { continue };
                if let Some(metrics) = &self.metrics {
                    metrics.feed().events_total.with_label_values(&[&venue, event.kind_label()]).inc();
                }
                self.apply_event(&manager, event);
            }

            self.set_state(ConnectionState::Disconnected);
            if let Some(metrics) = &self.metrics {
                metrics.feed().connected.dec();
            }
            if let Some(risk) = &self.risk {
                risk.mark_venue_disconnected(&venue);
            }
            self.alert_disconnected(&venue);
            let delay = self.backoff_for_attempt(attempt);
            attempt += 1;
            tokio::time::sleep(delay).await;
        }
    }

    fn apply_event(&self, manager: &Arc<BookManager>, event: FeedEvent) {
        match event {
            FeedEvent::BookSnapshot { asset, bids, asks, timestamp_ms, fingerprint } => {
                manager.apply_snapshot(&asset, bids, asks, timestamp_ms);
                if let Some(fp) = fingerprint {
                    if let Err(ArbError::Desync { reason, .. }) = manager.verify_fingerprint(&asset, fp) {
                        warn!(%asset, reason, "fingerprint check failed right after snapshot");
                    }
                }
            }
            FeedEvent::BookDelta { asset, changes, timestamp_ms } => {
                for change in changes {
                    if let Err(e) = manager.apply_delta(&asset, change.side, change.price, change.new_size, timestamp_ms) {
                        warn!(%asset, error = %e, "dropping delta");
                    }
                }
            }
            FeedEvent::TradePrint { asset, price, size, aggressor_side, timestamp_ms } => {
                manager.record_trade(TradeEvent { asset, price, size, aggressor_side, timestamp_ms });
            }
            FeedEvent::TickSizeChange { .. } | FeedEvent::TopOfBook { .. } => {
                // Counted via `FeedMetrics::events_total`; no book mutation needed.
            }
            FeedEvent::MarketCreated { asset } => {
                info!(%asset, "market created");
            }
            FeedEvent::MarketResolved { asset, winning_outcome } => {
                info!(%asset, ?winning_outcome, "market resolved");
            }
        }
    }
}

/// Helper used by tests and the demo binary to build an initial empty book
/// without routing through a real `Feed`.
pub fn seed_empty_book(manager: &BookManager, asset: &Asset) {
    manager.apply_snapshot(asset, Vec::<BookLevel>::new(), Vec::<BookLevel>::new(), 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Venue;

    #[test]
    fn backoff_schedule_grows_and_caps() {
        let sup = FeedSupervisor::new(vec![], &[1, 2, 5], 30);
        let d0 = sup.backoff_for_attempt(0);
        let d2 = sup.backoff_for_attempt(2);
        let d10 = sup.backoff_for_attempt(10);
        assert!(d0.as_millis() >= 1000);
        assert!(d2.as_millis() >= 5000);
        // attempt 10 clamps to the last bucket (same as attempt 2), plus jitter.
        assert!(d10.as_millis() >= 5000);
    }

    #[test]
    fn seed_empty_book_marks_has_snapshot() {
        let manager = BookManager::default();
        let asset = Asset::new("X", Venue::CentralizedClob);
        seed_empty_book(&manager, &asset);
        assert!(manager.snapshot(&asset, None).is_some());
    }

    #[test]
    fn trade_print_recorded_into_history() {
        use crate::book::TradeSide;
        use rust_decimal_macros::dec;

        let sup = FeedSupervisor::new(vec![], &[1], 30);
        let manager = Arc::new(BookManager::default());
        let asset = Asset::new("X", Venue::CentralizedClob);
        sup.apply_event(
            &manager,
            FeedEvent::TradePrint {
                asset: asset.clone(),
                price: dec!(0.5),
                size: dec!(10),
                aggressor_side: TradeSide::Buy,
                timestamp_ms: 1,
            },
        );
        assert_eq!(manager.trade_history(&asset).len(), 1);
    }

    #[test]
    fn disconnect_alert_escalates_when_all_venues_down() {
        use crate::risk::RiskGate;
        use rust_decimal_macros::dec;

        let risk = Arc::new(RiskGate::new(dec!(1000), dec!(1), 3));
        let alerts = Arc::new(AlertManager::new(crate::alerts::AlertManagerConfig::default()));
        let sup = FeedSupervisor::new(vec![], &[1], 30).with_risk(risk).with_alerts(alerts.clone());
        sup.alert_disconnected("centralized");
        assert_eq!(alerts.active_count(), 1);
    }
}
