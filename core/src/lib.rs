//! arb-core: real-time arbitrage execution core for a two-venue
//! prediction-market system (a centralized CLOB exchange and a blockchain
//! CLOB).
//!
//! ## Architecture
//! - **C1 feed**: normalized market data ingestion, one supervised
//!   reconnect-with-backoff loop per venue.
//! - **C2 book**: per-asset order books, `DashMap`-sharded, published as
//!   point-in-time snapshots so a later update never mutates a snapshot
//!   already handed to a consumer.
//! - **C3 vwap**: volume-weighted fill price, liquidity quality, and
//!   order-split suggestions computed off a single snapshot.
//! - **C4 allocator**: capital- and liquidity-constrained sizing of
//!   candidate opportunities via a continuous relaxation solved with
//!   Frank-Wolfe, then discretized.
//! - **C5 executor**: commit-or-rollback execution of a sized opportunity
//!   as a multi-leg trade across both venues.
//!
//! Every monetary value in this crate is a [`rust_decimal::Decimal`];
//! nothing here uses `f64` for price, size, or P&L arithmetic.

pub mod alerts;
pub mod allocator;
pub mod book;
pub mod cache;
pub mod config;
pub mod errors;
pub mod executor;
pub mod feed;
pub mod metrics;
pub mod risk;
pub mod util;
pub mod vwap;

pub use errors::{ArbError, Result};

/// Convenient imports for binaries wiring the components together.
pub mod prelude {
    pub use crate::alerts::{Alert, AlertCategory, AlertManager, AlertManagerConfig, AlertSeverity};
    pub use crate::allocator::{self, ExecutionPlan, Leg, Opportunity, PlannedLeg};
    pub use crate::book::{manager::BookManager, Asset, BookLevel, BookSide, Outcome, OrderBook, ReadOnlyBook, TradeSide, Venue};
    pub use crate::cache::Cache;
    pub use crate::config::Config;
    pub use crate::errors::{ArbError, Result};
    pub use crate::executor::{Executor, ExecutionStrategy, MultiLegTrade};
    pub use crate::feed::{Feed, FeedEvent};
    pub use crate::metrics::MetricsRegistry;
    pub use crate::risk::{KillSwitch, RiskGate};
    pub use crate::vwap::{compute_vwap, liquidity_metrics, VwapResult};
}
