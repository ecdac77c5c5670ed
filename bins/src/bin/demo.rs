//! Single end-to-end demo binary wiring C1-C5 against a simulated pair of
//! venues. Mirrors the teacher's `bog-bins` one-binary-per-scenario layout
//! (`simple_spread_simulated.rs`), collapsed to one scenario since this
//! crate has one architecture rather than a strategy/executor product.

use anyhow::Result;
use arb_core::prelude::*;
use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Runs one simulated cross-venue arbitrage cycle end to end")]
struct Args {
    /// Underlying event id shared by the YES/NO legs.
    #[arg(long, default_value = "ELECTION-2028")]
    event_id: String,

    /// Available trading capital in USD.
    #[arg(long, default_value = "1000")]
    capital: Decimal,

    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Always fills immediately at the requested (or a configured mock) price.
/// Stands in for a real venue's REST/WS order API in this demo.
struct SimulatedVenue {
    name: String,
    mock_fill_price: Decimal,
}

#[async_trait::async_trait]
impl arb_core::executor::Venue for SimulatedVenue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn place_order(
        &self,
        request: arb_core::executor::VenueOrderRequest,
    ) -> arb_core::Result<arb_core::executor::VenueOrderHandle> {
        let _ = request;
        Ok(arb_core::executor::VenueOrderHandle {
            order_id: format!("{}-sim-order", self.name),
            status: arb_core::executor::VenueOrderStatus::Filled,
        })
    }

    async fn cancel_order(&self, _order_id: &str) -> arb_core::Result<()> {
        Ok(())
    }

    async fn get_order_status(&self, _order_id: &str) -> arb_core::Result<arb_core::executor::VenueOrderState> {
        Ok(arb_core::executor::VenueOrderState {
            status: arb_core::executor::VenueOrderStatus::Filled,
            filled_quantity: dec!(100),
            avg_fill_price: Some(self.mock_fill_price),
        })
    }

    async fn get_balance(&self) -> arb_core::Result<Decimal> {
        Ok(dec!(10_000))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    arb_core::util::logging::init(&args.log_level, false);

    let kill_switch = KillSwitch::install();
    let ks = kill_switch.clone();
    ctrlc::set_handler(move || ks.shutdown("ctrl-c"))?;

    info!(event = %args.event_id, capital = %args.capital, "starting demo arbitrage cycle");

    let cfg = Config::from_json(&format!(
        r#"{{"feed":{{"venues":[]}},"book":{{}},"vwap":{{}},"allocator":{{}},"executor":{{}},"risk":{{"available_capital":"{}"}},"metrics":{{}}}}"#,
        args.capital
    ))?;

    let metrics = Arc::new(MetricsRegistry::new().map_err(|e| anyhow::anyhow!(e.to_string()))?);
    let alerts = Arc::new(AlertManager::new(AlertManagerConfig::default()));
    let cache = Cache::new();

    let manager = BookManager::new(cfg.book.depth_k)
        .with_trade_history_len(cfg.book.trade_history_len)
        .with_metrics(metrics.clone())
        .with_alerts(alerts.clone())
        .with_cache(cache.clone());
    let yes_asset = Asset::new(format!("{}-YES", args.event_id), Venue::CentralizedClob);
    let no_asset = Asset::new(format!("{}-NO", args.event_id), Venue::BlockchainClob);

    manager.apply_snapshot(
        &yes_asset,
        vec![BookLevel::new(dec!(0.47), dec!(500))],
        vec![BookLevel::new(dec!(0.48), dec!(500))],
        0,
    );
    manager.apply_snapshot(
        &no_asset,
        vec![BookLevel::new(dec!(0.49), dec!(500))],
        vec![BookLevel::new(dec!(0.50), dec!(500))],
        0,
    );

    let yes_book = manager.snapshot(&yes_asset, Some(20)).expect("snapshot exists");
    let no_book = manager.snapshot(&no_asset, Some(20)).expect("snapshot exists");

    let yes_vwap = compute_vwap(&yes_book, TradeSide::Buy, dec!(100));
    let no_vwap = compute_vwap(&no_book, TradeSide::Buy, dec!(100));
    let (yes_quality, no_quality) = (yes_vwap.quality, no_vwap.quality);
    info!(?yes_quality, ?no_quality, "computed entry VWAP for both legs");
    manager.publish_vwap(&yes_asset, "100", &yes_vwap);
    manager.publish_vwap(&no_asset, "100", &no_vwap);

    let opportunity = Opportunity {
        id: "yes-no-pair".into(),
        legs: vec![
            Leg { asset: yes_asset.clone(), outcome: Outcome::Yes, target_price: dec!(0.48), max_liquidity: dec!(500) },
            Leg { asset: no_asset.clone(), outcome: Outcome::No, target_price: dec!(0.50), max_liquidity: dec!(500) },
        ],
        expected_edge_per_contract: dec!(0.02),
        complement_id: None,
    };

    let plan = allocator::solve(std::slice::from_ref(&opportunity), args.capital, &cfg.allocator);
    let plan = allocator::filter_by_profit(plan, cfg.allocator.gas_per_trade, cfg.allocator.min_profit_threshold);
    info!(legs = plan.legs.len(), profit = %plan.expected_net_profit, "allocator produced plan");

    if plan.is_empty() {
        info!("no profitable plan found, exiting");
        return Ok(());
    }

    let risk = Arc::new(
        RiskGate::new(args.capital, cfg.risk.per_market_position_cap, cfg.risk.consecutive_failure_halt_n)
            .with_metrics(metrics.clone())
            .with_alerts(alerts.clone()),
    );
    risk.mark_venue_connected("centralized");
    risk.mark_venue_connected("blockchain");

    let mut executor = Executor::new(cfg.executor.clone(), risk.clone())
        .with_metrics(metrics.clone())
        .with_cache(cache.clone());
    executor.register_venue("centralized", Arc::new(SimulatedVenue { name: "centralized".into(), mock_fill_price: dec!(0.48) }));
    executor.register_venue("blockchain", Arc::new(SimulatedVenue { name: "blockchain".into(), mock_fill_price: dec!(0.50) }));

    for leg in &plan.legs {
        if kill_switch.should_stop() {
            info!("kill switch active, stopping before remaining legs");
            break;
        }
        // Pre-flight checks (kill switch, capital, position cap, connectivity)
        // run inside `Executor::execute` itself; nothing to gate here.
        let trade = executor
            .execute(format!("trade-{}", leg.opportunity_id), leg, &opportunity, ExecutionStrategy::Hybrid)
            .await?;
        let (trade_id, state, profit) = (trade.id.clone(), trade.overall_state.clone(), trade.realized_profit);
        info!(
            %trade_id,
            ?state,
            execution_ms = trade.execution_time_ms(),
            %profit,
            "trade settled"
        );
    }

    Ok(())
}
