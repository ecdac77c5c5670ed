//! Streaming feed ingestion (component C1).
//!
//! Grounded on `engine::generic::Engine::run`'s init-retry-loop (wait for a
//! valid snapshot before trading) and on the `resilience::backoff`/
//! `resilience::reconnect` idiom for the exponential-backoff reconnect
//! state machine. The event set is the closed, tagged enum of §4.1 rather
//! than a dynamically typed message, per the "tagged variant over the
//! closed event set" design note (§9).

pub mod supervisor;

use crate::book::{Asset, BookLevel, BookSide, Outcome, TradeSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The closed set of normalized feed events (§4.1). Every venue-specific
/// wire format is parsed down to one of these before crossing into C2.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    BookSnapshot {
        asset: Asset,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
        timestamp_ms: u64,
        fingerprint: Option<u64>,
    },
    BookDelta {
        asset: Asset,
        changes: Vec<LevelChange>,
        timestamp_ms: u64,
    },
    TradePrint {
        asset: Asset,
        price: Decimal,
        size: Decimal,
        aggressor_side: TradeSide,
        timestamp_ms: u64,
    },
    TickSizeChange {
        asset: Asset,
        old_tick: Decimal,
        new_tick: Decimal,
        timestamp_ms: u64,
    },
    TopOfBook {
        asset: Asset,
        best_bid: Decimal,
        best_ask: Decimal,
        timestamp_ms: u64,
    },
    MarketCreated {
        asset: Asset,
    },
    MarketResolved {
        asset: Asset,
        winning_outcome: Outcome,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelChange {
    pub side: BookSide,
    pub price: Decimal,
    pub new_size: Decimal,
}

impl FeedEvent {
    pub fn asset(&self) -> &Asset {
        match self {
            FeedEvent::BookSnapshot { asset, .. }
            | FeedEvent::BookDelta { asset, .. }
            | FeedEvent::TradePrint { asset, .. }
            | FeedEvent::TickSizeChange { asset, .. }
            | FeedEvent::TopOfBook { asset, .. }
            | FeedEvent::MarketCreated { asset }
            | FeedEvent::MarketResolved { asset, .. } => asset,
        }
    }

    /// Short label used as the `kind` metrics dimension (§6).
    pub fn kind_label(&self) -> &'static str {
        match self {
            FeedEvent::BookSnapshot { .. } => "book_snapshot",
            FeedEvent::BookDelta { .. } => "book_delta",
            FeedEvent::TradePrint { .. } => "trade_print",
            FeedEvent::TickSizeChange { .. } => "tick_size_change",
            FeedEvent::TopOfBook { .. } => "top_of_book",
            FeedEvent::MarketCreated { .. } => "market_created",
            FeedEvent::MarketResolved { .. } => "market_resolved",
        }
    }
}

/// Connection state, mirrored after `resilience::reconnect`'s state names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    Disconnected,
}

/// Capability every venue feed implements. A `SimulatedFeed` (see
/// `bins/src/bin/demo.rs`) and real venue clients both implement this seam;
/// `supervisor::FeedSupervisor` drives it with reconnect/backoff/heartbeat
/// handling so individual implementations stay dumb transports.
#[async_trait::async_trait]
pub trait Feed: Send {
    /// Venue name, used in error/log context.
    fn venue_name(&self) -> &str;

    /// Establish (or re-establish) the connection and subscribe to `assets`.
    async fn connect(&mut self, assets: &[Asset]) -> crate::errors::Result<()>;

    /// Block until the next event, or a heartbeat arrives. Returning
    /// `Ok(None)` signals a heartbeat with no data; `Err` signals the
    /// connection is considered lost.
    async fn next_event(&mut self) -> crate::errors::Result<Option<FeedEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Venue;

    #[test]
    fn asset_accessor_covers_every_variant() {
        let a = Asset::new("X", Venue::CentralizedClob);
        let events = vec![
            FeedEvent::BookSnapshot {
                asset: a.clone(),
                bids: vec![],
                asks: vec![],
                timestamp_ms: 0,
                fingerprint: None,
            },
            FeedEvent::MarketCreated { asset: a.clone() },
            FeedEvent::MarketResolved {
                asset: a.clone(),
                winning_outcome: Outcome::Yes,
            },
        ];
        for e in events {
            assert_eq!(e.asset(), &a);
        }
    }
}
