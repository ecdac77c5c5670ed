//! Allocation optimization (component C4).
//!
//! No direct teacher equivalent exists — the teacher is a single-strategy
//! market maker with no portfolio-level allocator — so this module is
//! authored fresh, following the pack's Decimal-safe accumulation style
//! (`orderbook::depth`) and the teacher's pure-function-plus-struct module
//! shape. See `DESIGN.md` for the Open Question resolutions this module
//! implements (continuous solver only, folded `Opportunity` shape, market
//! rollback pricing lives in `executor`, not here).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::book::{Asset, Outcome};
use crate::config::AllocatorConfig;

/// A single venue order within a multi-leg [`Opportunity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leg {
    pub asset: Asset,
    pub outcome: Outcome,
    pub target_price: Decimal,
    pub max_liquidity: Decimal,
}

/// A candidate multi-leg trade proposal produced by an external scanner
/// (`OpportunityFeed`, §6) and fed into the allocator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub legs: Vec<Leg>,
    /// Expected edge per contract, already net of any venue-specific
    /// adjustments the scanner knows about; must be `>= 0` to be
    /// considered.
    pub expected_edge_per_contract: Decimal,
    /// When set, the opportunity referenced by this id must be sized to
    /// exactly the same quantity as this one (YES/NO complement pair).
    pub complement_id: Option<String>,
}

impl Opportunity {
    /// Price used for capital/position-cap accounting: the most expensive
    /// leg, since every leg is bought in equal quantity.
    fn representative_price(&self) -> Decimal {
        self.legs
            .iter()
            .map(|l| l.target_price)
            .fold(Decimal::ZERO, Decimal::max)
    }

    fn liquidity_cap(&self) -> Decimal {
        self.legs
            .iter()
            .map(|l| l.max_liquidity)
            .fold(Decimal::MAX, Decimal::min)
    }

    fn cost_per_contract(&self) -> Decimal {
        self.legs.iter().map(|l| l.target_price).sum()
    }

    fn edge_rate(&self, fee_rate: Decimal) -> Decimal {
        let price = self.cost_per_contract();
        if price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.expected_edge_per_contract - fee_rate * price) / price
    }
}

/// One opportunity with its assigned integer quantity in a finished plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedLeg {
    pub opportunity_id: String,
    pub quantity: Decimal,
    pub cost: Decimal,
    pub expected_net_profit: Decimal,
}

/// The allocator's output: a sized, capital-feasible set of opportunities
/// (§3 Execution Plan).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionPlan {
    pub legs: Vec<PlannedLeg>,
    pub total_capital_committed: Decimal,
    pub expected_net_profit: Decimal,
    /// `true` if the solver hit its time budget before converging and is
    /// returning the best feasible solution found so far (§4.4).
    pub approximate: bool,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }
}

/// Solve for integer per-opportunity quantities maximizing expected net
/// profit subject to capital, liquidity, and per-position caps (§4.4).
///
/// Greedy-initialize, then Frank-Wolfe-iterate the continuous relaxation,
/// then round down to integers and re-budget any capital the rounding
/// freed. Always returns within `cfg.solve_budget_ms`; on timeout the best
/// feasible solution found so far is returned with `approximate = true`.
pub fn solve(opportunities: &[Opportunity], available_capital: Decimal, cfg: &AllocatorConfig) -> ExecutionPlan {
    let deadline = Instant::now() + Duration::from_millis(cfg.solve_budget_ms);

    if opportunities.is_empty() || available_capital <= Decimal::ZERO {
        return ExecutionPlan::default();
    }

    let n = opportunities.len();
    let caps: Vec<Decimal> = opportunities
        .iter()
        .map(|o| {
            let position_cap_qty = if o.representative_price() > Decimal::ZERO {
                (cfg.alpha * available_capital) / o.representative_price()
            } else {
                Decimal::ZERO
            };
            o.liquidity_cap().min(position_cap_qty)
        })
        .collect();
    let prices: Vec<Decimal> = opportunities.iter().map(Opportunity::representative_price).collect();
    let edge_rates: Vec<Decimal> = opportunities.iter().map(|o| o.edge_rate(cfg.fee_rate)).collect();

    // 1. Greedy initialization by edge-rate.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| edge_rates[b].cmp(&edge_rates[a]).then(prices[a].cmp(&prices[b])));

    let mut x = vec![Decimal::ZERO; n];
    let mut remaining_capital = available_capital;
    for &i in &order {
        if prices[i] <= Decimal::ZERO || edge_rates[i] <= Decimal::ZERO {
            continue;
        }
        let affordable = remaining_capital / prices[i];
        let qty = affordable.min(caps[i]).max(Decimal::ZERO);
        x[i] = qty;
        remaining_capital -= qty * prices[i];
    }

    // 2. Frank-Wolfe iteration on the continuous relaxation.
    for t in 0..cfg.max_iter {
        if Instant::now() >= deadline {
            debug!(iteration = t, "allocator hit solve budget, returning best-so-far");
            return finalize(opportunities, &complement_sync(opportunities, &x, &prices, &caps), &prices, available_capital, true);
        }

        // Linear subproblem: direction vertex puts all capital on the
        // single best-gradient variable with remaining headroom.
        let spent: Decimal = (0..n).map(|i| x[i] * prices[i]).sum();
        let mut budget_left = available_capital - spent;

        let mut best_i = None;
        let mut best_rate = Decimal::ZERO;
        for i in 0..n {
            if edge_rates[i] > best_rate && x[i] < caps[i] {
                best_rate = edge_rates[i];
                best_i = Some(i);
            }
        }

        let mut s = vec![Decimal::ZERO; n];
        if let Some(i) = best_i {
            if prices[i] > Decimal::ZERO {
                let headroom = caps[i] - x[i];
                let affordable = budget_left / prices[i];
                let add = headroom.min(affordable).max(Decimal::ZERO);
                s[i] = x[i] + add;
                budget_left -= add * prices[i];
            }
        }
        for i in 0..n {
            if s[i].is_zero() {
                s[i] = x[i];
            }
        }

        let gamma = Decimal::TWO / Decimal::from(t as u64 + 2);
        let mut next = vec![Decimal::ZERO; n];
        let mut delta_norm = Decimal::ZERO;
        for i in 0..n {
            next[i] = x[i] + gamma * (s[i] - x[i]);
            delta_norm += (next[i] - x[i]).abs();
        }
        x = next;

        if delta_norm < Decimal::new(1, 6) {
            break;
        }
    }

    // 3. Discretize + re-budget freed capital.
    x = complement_sync(opportunities, &x, &prices, &caps);
    let mut qty: Vec<Decimal> = x.iter().map(|v| v.floor()).collect();
    loop {
        let spent: Decimal = (0..n).map(|i| qty[i] * prices[i]).sum();
        let free = available_capital - spent;
        if free <= Decimal::ZERO {
            break;
        }

        let mut best_i = None;
        let mut best_rate = Decimal::ZERO;
        for i in 0..n {
            if prices[i] <= Decimal::ZERO {
                continue;
            }
            if qty[i] + Decimal::ONE <= caps[i] && prices[i] <= free && edge_rates[i] > best_rate {
                best_rate = edge_rates[i];
                best_i = Some(i);
            }
        }
        match best_i {
            Some(i) => qty[i] += Decimal::ONE,
            None => break,
        }
    }
    qty = complement_sync(opportunities, &qty, &prices, &caps);

    finalize(opportunities, &qty, &prices, available_capital, false)
}

/// Force complement-paired opportunities to share the lower of their two
/// quantities, keeping the caps of both sides respected (§4.4 complement
/// handling).
fn complement_sync(opportunities: &[Opportunity], x: &[Decimal], _prices: &[Decimal], caps: &[Decimal]) -> Vec<Decimal> {
    let index_of: HashMap<&str, usize> = opportunities.iter().enumerate().map(|(i, o)| (o.id.as_str(), i)).collect();
    let mut out = x.to_vec();
    for (i, o) in opportunities.iter().enumerate() {
        if let Some(comp_id) = &o.complement_id {
            if let Some(&j) = index_of.get(comp_id.as_str()) {
                let shared = out[i].min(out[j]).min(caps[i]).min(caps[j]);
                out[i] = shared;
                out[j] = shared;
            }
        }
    }
    out
}

fn finalize(
    opportunities: &[Opportunity],
    qty: &[Decimal],
    prices: &[Decimal],
    available_capital: Decimal,
    approximate: bool,
) -> ExecutionPlan {
    let mut legs = Vec::new();
    let mut total_capital = Decimal::ZERO;
    let mut total_profit = Decimal::ZERO;

    for (i, o) in opportunities.iter().enumerate() {
        if qty[i] <= Decimal::ZERO {
            continue;
        }
        let cost = qty[i] * prices[i];
        let net_profit = qty[i] * o.expected_edge_per_contract - qty[i] * Decimal::ZERO; // gas netted below
        legs.push(PlannedLeg {
            opportunity_id: o.id.clone(),
            quantity: qty[i],
            cost,
            expected_net_profit: net_profit,
        });
        total_capital += cost;
        total_profit += net_profit;
    }

    legs.sort_by(|a, b| b.expected_net_profit.cmp(&a.expected_net_profit).then(a.opportunity_id.cmp(&b.opportunity_id)));

    let _ = available_capital;
    info!(
        n_legs = legs.len(),
        total_capital = %total_capital,
        expected_profit = %total_profit,
        approximate,
        "allocator produced plan"
    );

    ExecutionPlan {
        legs,
        total_capital_committed: total_capital,
        expected_net_profit: total_profit,
        approximate,
    }
}

/// Apply `min_profit_threshold` and `gas_per_trade`, dropping opportunities
/// that are not worth trading once gas is netted out.
pub fn filter_by_profit(plan: ExecutionPlan, gas_per_trade: Decimal, min_profit_threshold: Decimal) -> ExecutionPlan {
    let legs: Vec<PlannedLeg> = plan
        .legs
        .into_iter()
        .filter_map(|mut leg| {
            leg.expected_net_profit -= gas_per_trade;
            if leg.expected_net_profit >= min_profit_threshold {
                Some(leg)
            } else {
                None
            }
        })
        .collect();

    let total_capital_committed = legs.iter().map(|l| l.cost).sum();
    let expected_net_profit = legs.iter().map(|l| l.expected_net_profit).sum();

    ExecutionPlan {
        legs,
        total_capital_committed,
        expected_net_profit,
        approximate: plan.approximate,
    }
}

/// Bregman projection / iterative proportional fitting for position
/// rebalancing (§4.4 rebalance mode): find the positions closest (in KL
/// divergence) to `current` that satisfy the marginal constraints implied
/// by `target`. Converges when the largest single-entry change drops below
/// `tolerance`.
pub fn bregman_rebalance(current: &[Decimal], target: &[Decimal], tolerance: Decimal, max_iter: usize) -> Vec<Decimal> {
    assert_eq!(current.len(), target.len());
    let mut x = current.to_vec();
    let current_sum: Decimal = current.iter().sum();
    let target_sum: Decimal = target.iter().sum();
    if current_sum <= Decimal::ZERO || target_sum <= Decimal::ZERO {
        return x;
    }

    for _ in 0..max_iter {
        let sum: Decimal = x.iter().sum();
        if sum <= Decimal::ZERO {
            break;
        }
        let mut max_change = Decimal::ZERO;
        for i in 0..x.len() {
            let want = target[i] / target_sum * sum;
            let scaled = if x[i] > Decimal::ZERO { want } else { x[i] };
            let change = (scaled - x[i]).abs();
            if change > max_change {
                max_change = change;
            }
            x[i] = scaled;
        }
        if max_change < tolerance {
            break;
        }
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn leg(asset_id: &str, outcome: Outcome, price: Decimal, liquidity: Decimal) -> Leg {
        Leg {
            asset: Asset::new(asset_id, crate::book::Venue::CentralizedClob),
            outcome,
            target_price: price,
            max_liquidity: liquidity,
        }
    }

    fn cfg() -> AllocatorConfig {
        AllocatorConfig {
            fee_rate: dec!(0.02),
            gas_per_trade: Decimal::ZERO,
            alpha: Decimal::ONE,
            min_profit_threshold: dec!(0.0001),
            solve_budget_ms: 50,
            max_iter: 50,
        }
    }

    #[test]
    fn empty_inputs_yield_empty_plan() {
        let plan = solve(&[], dec!(1000), &cfg());
        assert!(plan.is_empty());

        let opp = Opportunity {
            id: "a".into(),
            legs: vec![leg("A", Outcome::Yes, dec!(0.5), dec!(100))],
            expected_edge_per_contract: dec!(0.05),
            complement_id: None,
        };
        let plan = solve(std::slice::from_ref(&opp), Decimal::ZERO, &cfg());
        assert!(plan.is_empty());
    }

    #[test]
    fn respects_capital_and_liquidity_caps() {
        let opportunities = vec![
            Opportunity {
                id: "A".into(),
                legs: vec![leg("A", Outcome::Yes, dec!(0.40), dec!(1000))],
                expected_edge_per_contract: dec!(0.05),
                complement_id: None,
            },
            Opportunity {
                id: "B".into(),
                legs: vec![leg("B", Outcome::Yes, dec!(0.30), dec!(1000))],
                expected_edge_per_contract: dec!(0.03),
                complement_id: None,
            },
            Opportunity {
                id: "C".into(),
                legs: vec![leg("C", Outcome::Yes, dec!(0.60), dec!(500))],
                expected_edge_per_contract: dec!(0.08),
                complement_id: None,
            },
        ];

        let plan = solve(&opportunities, dec!(500), &cfg());

        assert!(plan.total_capital_committed <= dec!(500));
        for leg in &plan.legs {
            let opp = opportunities.iter().find(|o| o.id == leg.opportunity_id).unwrap();
            assert!(leg.quantity <= opp.liquidity_cap());
            assert!(leg.quantity == leg.quantity.floor());
        }
    }

    #[test]
    fn complement_legs_sized_equally() {
        let opportunities = vec![
            Opportunity {
                id: "YES".into(),
                legs: vec![leg("EVENT-YES", Outcome::Yes, dec!(0.48), dec!(500))],
                expected_edge_per_contract: dec!(0.02),
                complement_id: Some("NO".into()),
            },
            Opportunity {
                id: "NO".into(),
                legs: vec![leg("EVENT-NO", Outcome::No, dec!(0.50), dec!(500))],
                expected_edge_per_contract: dec!(0.02),
                complement_id: Some("YES".into()),
            },
        ];

        let plan = solve(&opportunities, dec!(1000), &cfg());
        let yes_qty = plan.legs.iter().find(|l| l.opportunity_id == "YES").map(|l| l.quantity).unwrap_or(Decimal::ZERO);
        let no_qty = plan.legs.iter().find(|l| l.opportunity_id == "NO").map(|l| l.quantity).unwrap_or(Decimal::ZERO);
        assert_eq!(yes_qty, no_qty);
    }

    #[test]
    fn profit_filter_drops_unprofitable_legs() {
        let plan = ExecutionPlan {
            legs: vec![PlannedLeg {
                opportunity_id: "A".into(),
                quantity: dec!(10),
                cost: dec!(5),
                expected_net_profit: dec!(0.50),
            }],
            total_capital_committed: dec!(5),
            expected_net_profit: dec!(0.50),
            approximate: false,
        };
        let filtered = filter_by_profit(plan, dec!(1), dec!(1));
        assert!(filtered.is_empty());
    }

    #[test]
    fn bregman_rebalance_converges_to_target_proportions() {
        let current = vec![dec!(70), dec!(30)];
        let target = vec![dec!(1), dec!(1)];
        let result = bregman_rebalance(&current, &target, dec!(0.0001), 100);
        let diff = (result[0] - result[1]).abs();
        assert!(diff < dec!(0.01), "expected near-equal split, got {:?}", result);
    }

    #[test]
    fn monotonicity_dominated_opportunity_does_not_reduce_profit() {
        let base = vec![Opportunity {
            id: "A".into(),
            legs: vec![leg("A", Outcome::Yes, dec!(0.40), dec!(1000))],
            expected_edge_per_contract: dec!(0.05),
            complement_id: None,
        }];
        let plan_base = solve(&base, dec!(500), &cfg());

        let mut with_dominated = base.clone();
        with_dominated.push(Opportunity {
            id: "D".into(),
            legs: vec![leg("D", Outcome::Yes, dec!(0.40), dec!(1000))],
            expected_edge_per_contract: dec!(0.01), // strictly weaker edge at equal price/caps
            complement_id: None,
        });
        let plan_with = solve(&with_dominated, dec!(500), &cfg());

        assert!(plan_with.expected_net_profit >= plan_base.expected_net_profit);
    }
}
