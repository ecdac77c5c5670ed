//! Atomic multi-leg trade execution (component C5).
//!
//! Grounded on `execution::production::ProductionExecutor`: the same
//! journal-backed, poll-driven order lifecycle, generalized from a single
//! resting order per cycle to a commit-or-rollback group of legs spanning
//! both venues (§4.5).

pub mod journal;
pub mod venue;

use crate::allocator::{ExecutionPlan, Opportunity, PlannedLeg};
use crate::book::{Asset, Outcome};
use crate::cache::{self, Cache};
use crate::config::ExecutorConfig;
use crate::errors::{ArbError, Result};
use crate::metrics::MetricsRegistry;
use crate::risk::RiskGate;
use journal::Journal;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, warn};
pub use venue::{OrderKind, OrderSide, Venue, VenueOrderHandle, VenueOrderRequest, VenueOrderState, VenueOrderStatus};

pub type TradeId = String;

/// Per-leg lifecycle, §4.5: `Pending -> Submitted -> {Filled, PartiallyFilled,
/// Cancelled, Failed}`, with `PartiallyFilled -> {Filled, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegState {
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Failed,
}

impl LegState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LegState::Filled | LegState::Cancelled | LegState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegExecutionState {
    pub leg_id: usize,
    pub asset: Asset,
    pub outcome: Outcome,
    pub side: OrderSide,
    pub target_price: Decimal,
    pub quantity: Decimal,
    pub order_id: Option<String>,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub state: LegState,
}

impl LegExecutionState {
    fn new(leg_id: usize, asset: Asset, outcome: Outcome, target_price: Decimal, quantity: Decimal) -> Self {
        Self {
            leg_id,
            asset,
            outcome,
            side: OrderSide::Buy,
            target_price,
            quantity,
            order_id: None,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            state: LegState::Pending,
        }
    }

    /// Realized slippage against the planned price, sign-agnostic.
    fn slippage_fraction(&self) -> Decimal {
        match self.avg_fill_price {
            Some(p) if self.target_price > Decimal::ZERO => ((p - self.target_price) / self.target_price).abs(),
            _ => Decimal::ZERO,
        }
    }

    #[cfg(test)]
    pub fn new_for_test() -> Self {
        use crate::book::Venue as BookVenue;
        let mut leg = Self::new(0, Asset::new("TEST", BookVenue::CentralizedClob), Outcome::Yes, Decimal::ONE, Decimal::ONE);
        leg.state = LegState::Filled;
        leg.filled_quantity = Decimal::ONE;
        leg.avg_fill_price = Some(Decimal::ONE);
        leg
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallState {
    Executing,
    Committed,
    RolledBack,
    /// Pre-flight rejected before any venue submission (§4.5), carrying the
    /// [`crate::risk::RejectReason`] as text.
    Rejected(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiLegTrade {
    pub id: TradeId,
    pub legs: Vec<LegExecutionState>,
    pub overall_state: OverallState,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub realized_profit: Decimal,
}

impl MultiLegTrade {
    pub fn execution_time_ms(&self) -> u64 {
        self.end_time_ms.saturating_sub(self.start_time_ms)
    }
}

/// Which order type(s) a leg is submitted with, §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Market,
    Limit,
    /// Rest at the limit price for `hybrid_fallback_ms`, then market the
    /// remainder.
    Hybrid,
}

/// External gas-price input for the blockchain venue (§6). A trait seam:
/// the executor only needs a current estimate, bounded by `max_gas_gwei`.
#[async_trait::async_trait]
pub trait GasOracle: Send + Sync {
    async fn gas_price_gwei(&self) -> Result<u64>;
}

/// Drives a single [`MultiLegTrade`] from submission to commit or rollback.
pub struct Executor {
    venues: HashMap<String, Arc<dyn Venue>>,
    risk: Arc<RiskGate>,
    journal: Journal,
    config: ExecutorConfig,
    gas_oracle: Option<Arc<dyn GasOracle>>,
    metrics: Option<Arc<MetricsRegistry>>,
    cache: Option<Arc<Cache>>,
}

impl Executor {
    pub fn new(config: ExecutorConfig, risk: Arc<RiskGate>) -> Self {
        let journal = Journal::new(config.journal_path.clone().into(), config.enable_journal);
        Self {
            venues: HashMap::new(),
            risk,
            journal,
            config,
            gas_oracle: None,
            metrics: None,
            cache: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn register_venue(&mut self, name: impl Into<String>, venue: Arc<dyn Venue>) {
        self.venues.insert(name.into(), venue);
    }

    pub fn set_gas_oracle(&mut self, oracle: Arc<dyn GasOracle>) {
        self.gas_oracle = Some(oracle);
    }

    /// Recover trades from a prior run's journal (§4.5, §6 recovery).
    pub fn recover(&self) -> Result<journal::RecoveryStats> {
        if !self.config.recover_on_startup {
            return Ok(journal::RecoveryStats::default());
        }
        let path = std::path::PathBuf::from(&self.config.journal_path);
        if !path.exists() {
            return Ok(journal::RecoveryStats::default());
        }
        match Journal::recover(&path) {
            Ok((trades, stats)) => {
                info!(recovered = stats.trades_recovered, errors = stats.errors, "journal recovery complete");
                for t in &trades {
                    if t.overall_state == OverallState::Executing {
                        warn!(trade_id = %t.id, "recovered trade left mid-flight, treating as needing manual reconciliation");
                    }
                }
                Ok(stats)
            }
            Err(e) => {
                warn!("journal recovery failed: {e}");
                Ok(journal::RecoveryStats::default())
            }
        }
    }

    fn venue_for(&self, asset: &Asset) -> Result<&Arc<dyn Venue>> {
        self.venues.get(&asset.venue.to_string()).ok_or_else(|| {
            ArbError::ConfigError(format!("no venue client registered for {}", asset.venue))
        })
    }

    /// Execute one allocator-sized opportunity as an atomic multi-leg trade.
    ///
    /// Runs the §4.5 pre-flight gate (kill switch, capital, position cap,
    /// venue connectivity) against a synthetic single-leg plan before
    /// touching any venue. A pre-flight failure returns a trade in
    /// [`OverallState::Rejected`] with nothing submitted.
    pub async fn execute(
        &self,
        trade_id: TradeId,
        plan_leg: &PlannedLeg,
        opportunity: &Opportunity,
        strategy: ExecutionStrategy,
    ) -> Result<MultiLegTrade> {
        let start_time_ms = crate::util::time::now_ms();
        self.journal.record_start(&trade_id);

        let legs: Vec<LegExecutionState> = opportunity
            .legs
            .iter()
            .enumerate()
            .map(|(i, l)| LegExecutionState::new(i, l.asset.clone(), l.outcome, l.target_price, plan_leg.quantity))
            .collect();

        let required_venues: HashSet<String> = opportunity.legs.iter().map(|l| l.asset.venue.to_string()).collect();
        let required_venues: Vec<&str> = required_venues.iter().map(String::as_str).collect();
        let preflight_plan = ExecutionPlan {
            legs: vec![plan_leg.clone()],
            total_capital_committed: plan_leg.cost,
            expected_net_profit: plan_leg.expected_net_profit,
            approximate: false,
        };

        if let Err(reason) = self.risk.check_plan(&preflight_plan, &required_venues) {
            warn!(%trade_id, %reason, "pre-flight check rejected trade, submitting nothing");
            let trade = MultiLegTrade {
                id: trade_id,
                legs,
                overall_state: OverallState::Rejected(reason.to_string()),
                start_time_ms,
                end_time_ms: crate::util::time::now_ms(),
                realized_profit: Decimal::ZERO,
            };
            self.journal.record_terminal(&trade);
            return Ok(trade);
        }

        self.risk.reserve_capital(plan_leg.cost)?;

        let mut legs = legs;
        let execution_deadline = Instant::now() + Duration::from_millis(self.config.execution_budget_ms);

        match strategy {
            ExecutionStrategy::Market => {
                self.submit_all(&mut legs, OrderKind::Market).await;
                self.poll_until(&mut legs, execution_deadline).await;
            }
            ExecutionStrategy::Limit => {
                self.submit_all(&mut legs, OrderKind::Limit).await;
                self.poll_until(&mut legs, execution_deadline).await;
            }
            ExecutionStrategy::Hybrid => {
                self.submit_all(&mut legs, OrderKind::Limit).await;
                let phase1_deadline = Instant::now() + Duration::from_millis(self.config.hybrid_fallback_ms);
                self.poll_until(&mut legs, phase1_deadline.min(execution_deadline)).await;

                for leg in legs.iter_mut() {
                    if !leg.state.is_terminal() {
                        if let Some(order_id) = leg.order_id.clone() {
                            let _ = self.cancel_leg(leg, &order_id).await;
                        }
                        leg.state = LegState::Pending;
                        leg.order_id = None;
                    }
                }
                self.submit_all(&mut legs, OrderKind::Market).await;
                self.poll_until(&mut legs, execution_deadline).await;
            }
        }

        self.apply_slippage_guard(&mut legs);

        let all_filled = legs.iter().all(|l| l.state == LegState::Filled);
        let overall_state = if all_filled {
            OverallState::Committed
        } else {
            self.rollback(&mut legs).await;
            OverallState::RolledBack
        };

        self.risk.record_trade_outcome(overall_state == OverallState::Committed);

        let realized_profit = self.realized_profit(&legs, plan_leg, overall_state.clone());

        if overall_state == OverallState::RolledBack {
            self.risk.release_capital(plan_leg.cost + realized_profit);
        }

        let end_time_ms = crate::util::time::now_ms();
        let trade = MultiLegTrade {
            id: trade_id,
            legs,
            overall_state,
            start_time_ms,
            end_time_ms,
            realized_profit,
        };
        if let Some(metrics) = &self.metrics {
            metrics.executor().execution_latency_ms.observe(trade.execution_time_ms() as f64);
        }
        if let Some(cache) = &self.cache {
            if let Ok(json) = serde_json::to_string(&trade) {
                cache.publish(cache::keys::fill_channel(&trade.id), json);
            }
        }
        self.journal.record_terminal(&trade);
        Ok(trade)
    }

    async fn submit_all(&self, legs: &mut [LegExecutionState], kind: OrderKind) {
        for leg in legs.iter_mut() {
            if leg.state.is_terminal() {
                continue;
            }
            let request = VenueOrderRequest {
                asset: leg.asset.clone(),
                side: leg.side,
                kind,
                quantity: leg.quantity - leg.filled_quantity,
                price: match kind {
                    OrderKind::Limit => Some(leg.target_price),
                    OrderKind::Market => None,
                },
            };
            match self.venue_for(&leg.asset) {
                Ok(venue) => match self.with_retry(|| venue.place_order(request.clone())).await {
                    Ok(handle) => {
                        leg.order_id = Some(handle.order_id);
                        leg.state = LegState::Submitted;
                    }
                    Err(e) => {
                        warn!(asset = %leg.asset, "leg submission failed: {e}");
                        leg.state = LegState::Failed;
                    }
                },
                Err(e) => {
                    warn!("{e}");
                    leg.state = LegState::Failed;
                }
            }
        }
    }

    async fn poll_until(&self, legs: &mut [LegExecutionState], deadline: Instant) {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            if legs.iter().all(|l| l.state.is_terminal()) {
                return;
            }
            if Instant::now() >= deadline {
                return;
            }
            for leg in legs.iter_mut() {
                if leg.state.is_terminal() {
                    continue;
                }
                let Some(order_id) = leg.order_id.clone() else { continue };
                let Ok(venue) = self.venue_for(&leg.asset) else { continue };
                match venue.get_order_status(&order_id).await {
                    Ok(status) => {
                        leg.filled_quantity = status.filled_quantity;
                        leg.avg_fill_price = status.avg_fill_price;
                        leg.state = match status.status {
                            VenueOrderStatus::Filled => LegState::Filled,
                            VenueOrderStatus::PartiallyFilled => LegState::PartiallyFilled,
                            VenueOrderStatus::Cancelled => LegState::Cancelled,
                            VenueOrderStatus::Rejected | VenueOrderStatus::Failed => LegState::Failed,
                            VenueOrderStatus::Resting => leg.state,
                        };
                    }
                    Err(e) if e.is_retryable() => continue,
                    Err(_) => leg.state = LegState::Failed,
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn cancel_leg(&self, leg: &LegExecutionState, order_id: &str) -> Result<()> {
        let venue = self.venue_for(&leg.asset)?;
        venue.cancel_order(order_id).await
    }

    /// Marks a filled-but-too-slipped leg `Failed` for commit purposes even
    /// though the venue reports it filled (§4.5 slippage guard).
    fn apply_slippage_guard(&self, legs: &mut [LegExecutionState]) {
        for leg in legs.iter_mut() {
            if leg.state == LegState::Filled && leg.slippage_fraction() > self.config.max_slippage_fraction {
                warn!(asset = %leg.asset, slippage = %leg.slippage_fraction(), "leg exceeded slippage guard");
                leg.state = LegState::Failed;
                if let Some(metrics) = &self.metrics {
                    metrics.executor().slippage_guard_trips_total.inc();
                }
            }
        }
    }

    /// Unwind a failed group: cancel anything still resting, market-reverse
    /// anything already (partially) filled. Per the Open Question
    /// resolution, reversing orders are always `OrderKind::Market` — there
    /// is no time budget left to rest a limit order during a rollback.
    async fn rollback(&self, legs: &mut [LegExecutionState]) {
        let deadline = Instant::now() + Duration::from_millis(self.config.rollback_budget_ms);
        for leg in legs.iter_mut() {
            if !leg.state.is_terminal() {
                if let Some(order_id) = leg.order_id.clone() {
                    let _ = timeout(deadline.saturating_duration_since(Instant::now()), self.cancel_leg(leg, &order_id)).await;
                }
                leg.state = LegState::Cancelled;
            }

            if leg.filled_quantity > Decimal::ZERO {
                let reverse = VenueOrderRequest {
                    asset: leg.asset.clone(),
                    side: OrderSide::Sell,
                    kind: OrderKind::Market,
                    quantity: leg.filled_quantity,
                    price: None,
                };
                if let Ok(venue) = self.venue_for(&leg.asset) {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if timeout(remaining, venue.place_order(reverse)).await.is_err() {
                        warn!(asset = %leg.asset, "rollback reversal for filled leg did not confirm within budget");
                    }
                }
            }
        }
    }

    fn realized_profit(&self, legs: &[LegExecutionState], plan_leg: &PlannedLeg, state: OverallState) -> Decimal {
        if state != OverallState::Committed {
            // Two-sided crossing of the spread to unwind is a pure cost.
            let unwind_cost: Decimal = legs
                .iter()
                .filter(|l| l.filled_quantity > Decimal::ZERO)
                .map(|l| l.filled_quantity * l.slippage_fraction() * l.target_price)
                .sum();
            return -unwind_cost;
        }
        let actual_cost: Decimal = legs.iter().map(|l| l.filled_quantity * l.avg_fill_price.unwrap_or(l.target_price)).sum();
        plan_leg.expected_net_profit - (actual_cost - plan_leg.cost)
    }

    /// Retry transient failures with exponential backoff + jitter (§4.5);
    /// never retries once the underlying call reports a non-retryable
    /// error.
    async fn with_retry<F, Fut, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let base_ms = 50u64 * 2u64.pow(attempt);
                    let jitter_ms = rand::thread_rng().gen_range(0..25);
                    tokio::time::sleep(Duration::from_millis(base_ms + jitter_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leg_state_terminal_classification() {
        assert!(LegState::Filled.is_terminal());
        assert!(LegState::Cancelled.is_terminal());
        assert!(LegState::Failed.is_terminal());
        assert!(!LegState::Pending.is_terminal());
        assert!(!LegState::Submitted.is_terminal());
        assert!(!LegState::PartiallyFilled.is_terminal());
    }

    #[test]
    fn slippage_fraction_is_symmetric() {
        use rust_decimal_macros::dec;
        let mut leg = LegExecutionState::new_for_test();
        leg.target_price = dec!(0.50);
        leg.avg_fill_price = Some(dec!(0.55));
        assert_eq!(leg.slippage_fraction(), dec!(0.10));
        leg.avg_fill_price = Some(dec!(0.45));
        assert_eq!(leg.slippage_fraction(), dec!(0.10));
    }

    #[tokio::test]
    async fn preflight_rejection_submits_nothing() {
        use crate::allocator::{Leg, Opportunity, PlannedLeg};
        use crate::book::Venue as BookVenue;
        use crate::config::ExecutorConfig;
        use crate::risk::RiskGate;
        use rust_decimal_macros::dec;

        let risk = Arc::new(RiskGate::new(dec!(0), dec!(1), 3));
        let executor = Executor::new(ExecutorConfig::default(), risk);

        let opportunity = Opportunity {
            id: "opp".into(),
            legs: vec![Leg {
                asset: Asset::new("EVENT-YES", BookVenue::CentralizedClob),
                outcome: Outcome::Yes,
                target_price: dec!(0.5),
                max_liquidity: dec!(100),
            }],
            expected_edge_per_contract: dec!(0.02),
            complement_id: None,
        };
        let plan_leg = PlannedLeg {
            opportunity_id: "opp".into(),
            quantity: dec!(10),
            cost: dec!(5),
            expected_net_profit: dec!(1),
        };

        let trade = executor
            .execute("rejected-trade".into(), &plan_leg, &opportunity, ExecutionStrategy::Market)
            .await
            .unwrap();

        assert!(matches!(trade.overall_state, OverallState::Rejected(_)));
        assert!(trade.legs.iter().all(|l| l.state == LegState::Pending));
    }

    #[test]
    fn execution_time_is_end_minus_start() {
        let trade = MultiLegTrade {
            id: "t".into(),
            legs: vec![],
            overall_state: OverallState::Committed,
            start_time_ms: 100,
            end_time_ms: 140,
            realized_profit: Decimal::ZERO,
        };
        assert_eq!(trade.execution_time_ms(), 40);
    }
}
