//! Runtime configuration surface (§10.2).
//!
//! Shaped directly on the teacher's `config::types::Config` aggregate:
//! one struct per concern, `serde(default = "fn")` free functions for
//! optional fields, and a hand-written `Default` impl where every field
//! has a sensible value. Required fields (venue credentials/URLs, capital)
//! carry no default — a config missing them fails to deserialize, which
//! the loader turns into a fatal `ArbError::ConfigError` at startup.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::{ArbError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    pub book: BookConfig,
    pub vwap: VwapConfig,
    pub allocator: AllocatorConfig,
    pub executor: ExecutorConfig,
    pub risk: RiskConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Parse from a JSON/TOML-shaped string already loaded by the caller.
    /// The binaries layer environment overrides on top before calling this.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| ArbError::ConfigError(format!("invalid config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.risk.available_capital <= Decimal::ZERO {
            return Err(ArbError::ConfigError("risk.available_capital must be positive".into()));
        }
        for venue in &self.feed.venues {
            if venue.url.is_empty() {
                return Err(ArbError::ConfigError(format!("feed venue {} missing url", venue.name)));
            }
        }
        Ok(())
    }
}

/// Per-venue feed connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueFeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub venues: Vec<VenueFeedConfig>,
    #[serde(default = "default_backoff_schedule_secs")]
    pub backoff_schedule_secs: Vec<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            venues: Vec::new(),
            backoff_schedule_secs: default_backoff_schedule_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookConfig {
    #[serde(default = "default_depth_k")]
    pub depth_k: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_trade_history_len")]
    pub trade_history_len: usize,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            depth_k: default_depth_k(),
            cache_ttl_secs: default_cache_ttl_secs(),
            trade_history_len: default_trade_history_len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VwapConfig {
    #[serde(default = "default_min_depth")]
    pub min_depth: Decimal,
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: Decimal,
    #[serde(default = "default_max_chunks")]
    pub max_split_chunks: usize,
}

impl Default for VwapConfig {
    fn default() -> Self {
        Self {
            min_depth: default_min_depth(),
            max_spread_bps: default_max_spread_bps(),
            max_split_chunks: default_max_chunks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorConfig {
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    #[serde(default = "default_gas_per_trade")]
    pub gas_per_trade: Decimal,
    #[serde(default = "default_alpha")]
    pub alpha: Decimal,
    #[serde(default = "default_min_profit_threshold")]
    pub min_profit_threshold: Decimal,
    #[serde(default = "default_solve_budget_ms")]
    pub solve_budget_ms: u64,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
            gas_per_trade: default_gas_per_trade(),
            alpha: default_alpha(),
            min_profit_threshold: default_min_profit_threshold(),
            solve_budget_ms: default_solve_budget_ms(),
            max_iter: default_max_iter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_hybrid_fallback_ms")]
    pub hybrid_fallback_ms: u64,
    #[serde(default = "default_execution_budget_ms")]
    pub execution_budget_ms: u64,
    #[serde(default = "default_rollback_budget_ms")]
    pub rollback_budget_ms: u64,
    #[serde(default = "default_max_slippage_fraction")]
    pub max_slippage_fraction: Decimal,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_gas_gwei")]
    pub max_gas_gwei: u64,
    #[serde(default = "default_journal_path")]
    pub journal_path: PathBuf,
    #[serde(default = "default_true")]
    pub enable_journal: bool,
    #[serde(default = "default_true")]
    pub recover_on_startup: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            hybrid_fallback_ms: default_hybrid_fallback_ms(),
            execution_budget_ms: default_execution_budget_ms(),
            rollback_budget_ms: default_rollback_budget_ms(),
            max_slippage_fraction: default_max_slippage_fraction(),
            max_retries: default_max_retries(),
            max_gas_gwei: default_max_gas_gwei(),
            journal_path: default_journal_path(),
            enable_journal: true,
            recover_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Required: the system refuses to start without a capital figure.
    pub available_capital: Decimal,
    #[serde(default = "default_per_market_position_cap")]
    pub per_market_position_cap: Decimal,
    #[serde(default = "default_rollback_alert_threshold")]
    pub rollback_alert_threshold: Decimal,
    #[serde(default = "default_consecutive_failure_halt_n")]
    pub consecutive_failure_halt_n: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            available_capital: Decimal::ZERO,
            per_market_position_cap: default_per_market_position_cap(),
            rollback_alert_threshold: default_rollback_alert_threshold(),
            consecutive_failure_halt_n: default_consecutive_failure_halt_n(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_prometheus_addr")]
    pub prometheus_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prometheus_addr: default_prometheus_addr(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_heartbeat_secs() -> u64 {
    10
}
fn default_idle_timeout_secs() -> u64 {
    30
}
fn default_backoff_schedule_secs() -> Vec<u64> {
    vec![1, 2, 5, 10, 30, 60]
}
fn default_depth_k() -> usize {
    20
}
fn default_cache_ttl_secs() -> u64 {
    5
}
fn default_trade_history_len() -> usize {
    100
}
fn default_min_depth() -> Decimal {
    Decimal::from(100)
}
fn default_max_spread_bps() -> Decimal {
    Decimal::from(500)
}
fn default_max_chunks() -> usize {
    5
}
fn default_fee_rate() -> Decimal {
    Decimal::new(2, 2) // 2%
}
fn default_gas_per_trade() -> Decimal {
    Decimal::ZERO
}
fn default_alpha() -> Decimal {
    Decimal::new(20, 2) // 0.20
}
fn default_min_profit_threshold() -> Decimal {
    Decimal::ONE
}
fn default_solve_budget_ms() -> u64 {
    50
}
fn default_max_iter() -> usize {
    50
}
fn default_poll_interval_ms() -> u64 {
    5
}
fn default_hybrid_fallback_ms() -> u64 {
    15
}
fn default_execution_budget_ms() -> u64 {
    30
}
fn default_rollback_budget_ms() -> u64 {
    60
}
fn default_max_slippage_fraction() -> Decimal {
    Decimal::new(3, 2) // 0.03
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_gas_gwei() -> u64 {
    500
}
fn default_journal_path() -> PathBuf {
    PathBuf::from("./data/execution_journal.jsonl")
}
fn default_per_market_position_cap() -> Decimal {
    Decimal::new(20, 2) // 0.20 of capital
}
fn default_rollback_alert_threshold() -> Decimal {
    Decimal::new(10, 2) // 10%
}
fn default_consecutive_failure_halt_n() -> u32 {
    3
}
fn default_prometheus_addr() -> String {
    "127.0.0.1:9090".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_capital_fails_validation() {
        let cfg = Config {
            feed: FeedConfig::default(),
            book: BookConfig::default(),
            vwap: VwapConfig::default(),
            allocator: AllocatorConfig::default(),
            executor: ExecutorConfig::default(),
            risk: RiskConfig::default(),
            metrics: MetricsConfig::default(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn minimal_json_round_trips_with_defaults() {
        let json = r#"{
            "feed": {"venues": [{"name": "cx", "url": "wss://example"}]},
            "book": {},
            "vwap": {},
            "allocator": {},
            "executor": {},
            "risk": {"available_capital": "1000"},
            "metrics": {}
        }"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.book.depth_k, 20);
        assert_eq!(cfg.risk.available_capital, Decimal::from(1000));
        assert!(cfg.validate().is_ok());
    }
}
