//! Pre-flight risk gate and kill switch.
//!
//! The gate's layered-check structure (capital → position cap →
//! connectivity → time budget, cheapest/most-likely-to-reject first) is
//! grounded on `risk::RiskManager::validate_signal`'s defense-in-depth
//! ordering; the kill switch is ported from `resilience::kill_switch`.

pub mod kill_switch;

use crate::allocator::ExecutionPlan;
use crate::alerts::{Alert, AlertCategory, AlertManager, AlertSeverity};
use crate::errors::{ArbError, Result};
use crate::metrics::MetricsRegistry;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub use kill_switch::{KillSwitch, KillSwitchState};

/// Runtime state the gate checks an [`ExecutionPlan`] against before any
/// venue submission (§4.5 pre-flight checks).
pub struct RiskGate {
    available_capital: RwLock<Decimal>,
    per_market_position_cap: Decimal,
    connected_venues: RwLock<HashSet<String>>,
    consecutive_failures: AtomicU32,
    consecutive_failure_halt_n: u32,
    kill_switch: KillSwitch,
    metrics: Option<Arc<MetricsRegistry>>,
    alerts: Option<Arc<AlertManager>>,
}

/// Why a plan was rejected at pre-flight. Matches §4.5's "REJECTED(reason)".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    KillSwitchActive,
    InsufficientCapital,
    VenueDisconnected(String),
    PositionCapExceeded { opportunity_id: String },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::KillSwitchActive => write!(f, "kill switch active"),
            RejectReason::InsufficientCapital => write!(f, "insufficient available capital"),
            RejectReason::VenueDisconnected(v) => write!(f, "venue {v} disconnected"),
            RejectReason::PositionCapExceeded { opportunity_id } => {
                write!(f, "opportunity {opportunity_id} exceeds per-market position cap")
            }
        }
    }
}

impl RiskGate {
    pub fn new(available_capital: Decimal, per_market_position_cap: Decimal, consecutive_failure_halt_n: u32) -> Self {
        Self {
            available_capital: RwLock::new(available_capital),
            per_market_position_cap,
            connected_venues: RwLock::new(HashSet::new()),
            consecutive_failures: AtomicU32::new(0),
            consecutive_failure_halt_n,
            kill_switch: KillSwitch::new(),
            metrics: None,
            alerts: None,
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

    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    pub fn mark_venue_connected(&self, venue: &str) {
        self.connected_venues.write().insert(venue.to_string());
    }

    pub fn mark_venue_disconnected(&self, venue: &str) {
        self.connected_venues.write().remove(venue);
    }

    pub fn available_capital(&self) -> Decimal {
        *self.available_capital.read()
    }

    pub fn connected_venue_count(&self) -> usize {
        self.connected_venues.read().len()
    }

    /// Check the plan against every pre-flight gate, cheapest first.
    /// Returns the first violation found, or `Ok(())` if the plan may
    /// proceed to submission.
    pub fn check_plan(&self, plan: &ExecutionPlan, required_venues: &[&str]) -> std::result::Result<(), RejectReason> {
        if self.kill_switch.should_stop() {
            return Err(RejectReason::KillSwitchActive);
        }

        if plan.total_capital_committed > self.available_capital() {
            return Err(RejectReason::InsufficientCapital);
        }

        for leg in &plan.legs {
            if leg.cost > self.per_market_position_cap * self.available_capital() {
                return Err(RejectReason::PositionCapExceeded {
                    opportunity_id: leg.opportunity_id.clone(),
                });
            }
        }

        let connected = self.connected_venues.read();
        for venue in required_venues {
            if !connected.contains(*venue) {
                return Err(RejectReason::VenueDisconnected(venue.to_string()));
            }
        }

        Ok(())
    }

    /// Reserve capital for a plan about to be submitted. Returns an
    /// `InvariantViolation` if capital would go negative — this should
    /// never happen if `check_plan` was called first.
    pub fn reserve_capital(&self, amount: Decimal) -> Result<()> {
        let mut capital = self.available_capital.write();
        if amount > *capital {
            return Err(ArbError::InvariantViolation(format!(
                "attempted to reserve {amount} but only {capital} available"
            )));
        }
        *capital -= amount;
        Ok(())
    }

    pub fn release_capital(&self, amount: Decimal) {
        *self.available_capital.write() += amount;
    }

    /// Record a terminal trade outcome. A run of `consecutive_failure_halt_n`
    /// failed-to-commit trades trips the kill switch (§7).
    pub fn record_trade_outcome(&self, committed: bool) {
        if let Some(metrics) = &self.metrics {
            if committed {
                metrics.executor().trades_committed_total.inc();
            } else {
                metrics.executor().trades_rolled_back_total.inc();
            }
        }
        if committed {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return;
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.consecutive_failure_halt_n {
            let reason = format!(
                "{failures} consecutive execution failures (threshold {})",
                self.consecutive_failure_halt_n
            );
            self.kill_switch.emergency_stop(&reason);
            if let Some(alerts) = &self.alerts {
                let _ = alerts.send(Alert::new(
                    AlertCategory::ExecutionFailures,
                    "kill_switch",
                    AlertSeverity::Critical,
                    reason,
                ));
            }
        }
    }
}
