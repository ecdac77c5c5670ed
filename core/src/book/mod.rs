//! L2 order book modeling (component C2's data model).
//!
//! Generalizes the teacher's fixed `[u64; 10]` `MarketSnapshot` depth arrays
//! (`examples/guribe94-bog/bog-core/src/orderbook/depth.rs`) into a
//! dynamic-depth, `Decimal`-priced book keyed by [`Asset`]. All monetary
//! arithmetic uses `rust_decimal::Decimal`; nothing here touches `f64`.

pub mod manager;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Which of the two external venues an [`Asset`] trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    /// Centralized, order-matched exchange.
    CentralizedClob,
    /// On-chain order book.
    BlockchainClob,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::CentralizedClob => write!(f, "centralized"),
            Venue::BlockchainClob => write!(f, "blockchain"),
        }
    }
}

/// A tradable instrument on one venue. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub venue: Venue,
}

impl Asset {
    pub fn new(id: impl Into<String>, venue: Venue) -> Self {
        Self { id: id.into(), venue }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.venue)
    }
}

/// The two sides of a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookSide {
    Bid,
    Ask,
}

/// The aggressor side of a trade print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Which outcome of a binary event an asset represents. Two assets with
/// opposite `Outcome` on the same event are "complements" (§3, glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn complement(self) -> Self {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }
}

/// A single price level. `size` is always strictly positive; a level that
/// would otherwise be zero-size is removed instead of represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl BookLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// A single normalized trade print, published by C1 to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub asset: Asset,
    pub price: Decimal,
    pub size: Decimal,
    pub aggressor_side: TradeSide,
    pub timestamp_ms: u64,
}

/// A read-only, point-in-time copy of the top-K levels of a book, safe to
/// hand to C3/C4 without holding any lock on the live [`OrderBook`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadOnlyBook {
    pub asset: Asset,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub timestamp_ms: u64,
    pub fingerprint: u64,
}

impl ReadOnlyBook {
    pub fn best_bid(&self) -> Option<BookLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<BookLevel> {
        self.asks.first().copied()
    }

    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => b.price >= a.price,
            _ => false,
        }
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b.price + a.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Spread in basis points of the best bid. Grounded on
    /// `orderbook::depth::spread_bps_from_prices`.
    pub fn spread_bps(&self) -> Option<Decimal> {
        let bid = self.best_bid()?.price;
        let ask = self.best_ask()?.price;
        if bid.is_zero() {
            return None;
        }
        Some((ask - bid) / bid * Decimal::from(10_000))
    }

    pub fn depth(&self, side: BookSide, max_levels: usize) -> Decimal {
        let levels = match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        };
        levels.iter().take(max_levels).map(|l| l.size).sum()
    }
}

/// Live, mutable order book for a single asset, exclusively owned by the
/// [`manager::BookManager`] that holds it. Invariants (checked on every
/// mutation):
/// - bids strictly descending by price, unique prices;
/// - asks strictly ascending by price, unique prices;
/// - every level has `size > 0`;
/// - `timestamp_ms` is non-decreasing.
#[derive(Debug, Clone)]
pub struct OrderBook {
    asset: Asset,
    bids: Vec<BookLevel>,
    asks: Vec<BookLevel>,
    timestamp_ms: u64,
    has_snapshot: bool,
}

impl OrderBook {
    pub fn new(asset: Asset) -> Self {
        Self {
            asset,
            bids: Vec::new(),
            asks: Vec::new(),
            timestamp_ms: 0,
            has_snapshot: false,
        }
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn has_snapshot(&self) -> bool {
        self.has_snapshot
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Replace both sides atomically. Used on initial load and on recovery
    /// from desync.
    pub fn apply_snapshot(
        &mut self,
        mut bids: Vec<BookLevel>,
        mut asks: Vec<BookLevel>,
        timestamp_ms: u64,
    ) {
        bids.retain(|l| l.size > Decimal::ZERO);
        asks.retain(|l| l.size > Decimal::ZERO);
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        self.bids = bids;
        self.asks = asks;
        self.timestamp_ms = timestamp_ms.max(self.timestamp_ms);
        self.has_snapshot = true;
    }

    /// Apply a single level change: insert/replace if `new_size > 0`,
    /// remove if `new_size == 0`. Maintains sort order.
    pub fn apply_level(&mut self, side: BookSide, price: Decimal, new_size: Decimal, timestamp_ms: u64) {
        let levels = match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        };

        let pos = levels.iter().position(|l| l.price == price);

        if new_size <= Decimal::ZERO {
            if let Some(i) = pos {
                levels.remove(i);
            }
            self.timestamp_ms = timestamp_ms.max(self.timestamp_ms);
            return;
        }

        match pos {
            Some(i) => levels[i].size = new_size,
            None => {
                let insert_at = match side {
                    BookSide::Bid => levels.partition_point(|l| l.price > price),
                    BookSide::Ask => levels.partition_point(|l| l.price < price),
                };
                levels.insert(insert_at, BookLevel::new(price, new_size));
            }
        }
        self.timestamp_ms = timestamp_ms.max(self.timestamp_ms);
    }

    pub fn best_bid(&self) -> Option<BookLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<BookLevel> {
        self.asks.first().copied()
    }

    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => b.price >= a.price,
            _ => false,
        }
    }

    /// Reproducible hash over the price/size pairs of both sides, used to
    /// detect desync against a venue-supplied fingerprint.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for l in &self.bids {
            l.price.hash(&mut hasher);
            l.size.hash(&mut hasher);
        }
        0xA5A5_u64.hash(&mut hasher);
        for l in &self.asks {
            l.price.hash(&mut hasher);
            l.size.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Copy out the top-K levels on each side as a standalone, shareable
    /// value. This is the only way state crosses out of C2.
    pub fn snapshot(&self, depth_k: usize) -> ReadOnlyBook {
        ReadOnlyBook {
            asset: self.asset.clone(),
            bids: self.bids.iter().take(depth_k).copied().collect(),
            asks: self.asks.iter().take(depth_k).copied().collect(),
            timestamp_ms: self.timestamp_ms,
            fingerprint: self.fingerprint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn asset() -> Asset {
        Asset::new("EVENT-YES", Venue::CentralizedClob)
    }

    #[test]
    fn snapshot_sorts_both_sides() {
        let mut book = OrderBook::new(asset());
        book.apply_snapshot(
            vec![BookLevel::new(dec!(0.48), dec!(100)), BookLevel::new(dec!(0.50), dec!(50))],
            vec![BookLevel::new(dec!(0.55), dec!(80)), BookLevel::new(dec!(0.52), dec!(60))],
            1,
        );
        assert_eq!(book.best_bid().unwrap().price, dec!(0.50));
        assert_eq!(book.best_ask().unwrap().price, dec!(0.52));
        assert!(!book.is_crossed());
    }

    #[test]
    fn apply_level_zero_size_removes() {
        let mut book = OrderBook::new(asset());
        book.apply_snapshot(vec![BookLevel::new(dec!(0.50), dec!(50))], vec![], 1);
        book.apply_level(BookSide::Bid, dec!(0.50), Decimal::ZERO, 2);
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn apply_level_idempotent() {
        let mut book = OrderBook::new(asset());
        book.apply_snapshot(vec![], vec![], 0);
        book.apply_level(BookSide::Ask, dec!(0.52), dec!(10), 1);
        book.apply_level(BookSide::Ask, dec!(0.52), dec!(10), 2);
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.best_ask().unwrap().size, dec!(10));
    }

    #[test]
    fn fingerprint_round_trips_through_delta_sequence() {
        let mut a = OrderBook::new(asset());
        a.apply_snapshot(
            vec![BookLevel::new(dec!(0.50), dec!(50))],
            vec![BookLevel::new(dec!(0.52), dec!(60))],
            1,
        );
        a.apply_level(BookSide::Bid, dec!(0.49), dec!(30), 2);

        let mut b = OrderBook::new(asset());
        b.apply_snapshot(
            vec![
                BookLevel::new(dec!(0.50), dec!(50)),
                BookLevel::new(dec!(0.49), dec!(30)),
            ],
            vec![BookLevel::new(dec!(0.52), dec!(60))],
            2,
        );

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn crossed_book_detected() {
        let mut book = OrderBook::new(asset());
        book.apply_snapshot(
            vec![BookLevel::new(dec!(0.55), dec!(10))],
            vec![BookLevel::new(dec!(0.52), dec!(10))],
            1,
        );
        assert!(book.is_crossed());
    }
}
