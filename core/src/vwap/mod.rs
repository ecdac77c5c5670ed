//! Execution-cost analysis (component C3).
//!
//! Ports the teacher's greedy-consume VWAP walk
//! (`orderbook::depth::calculate_vwap`, `calculate_imbalance`,
//! `spread_bps_from_prices`) from fixed-point `u64` arithmetic over a
//! `MarketSnapshot` to `Decimal` arithmetic over a [`ReadOnlyBook`]. Pure
//! computation: no I/O, no mutation, and every result is only valid against
//! the book snapshot it was computed on.

use crate::book::{BookSide, ReadOnlyBook, TradeSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Execution-quality verdict derived from slippage against the quoted
/// reference price (§4.3 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Excellent,
    Good,
    Fair,
    Poor,
    InsufficientLiquidity,
}

impl Quality {
    /// `true` for EXCELLENT/GOOD, the bar the order-split suggester aims
    /// each sub-order at.
    pub fn is_good_or_better(&self) -> bool {
        matches!(self, Quality::Excellent | Quality::Good)
    }

    fn from_slippage(slippage_fraction: Decimal) -> Self {
        let s = slippage_fraction.abs();
        if s <= Decimal::new(5, 3) {
            Quality::Excellent // <= 0.5%
        } else if s <= Decimal::new(2, 2) {
            Quality::Good // <= 2%
        } else if s <= Decimal::new(5, 2) {
            Quality::Fair // <= 5%
        } else {
            Quality::Poor
        }
    }
}

/// One consumed level during the VWAP walk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Fill {
    pub price: Decimal,
    pub size: Decimal,
}

/// Computed execution-cost snapshot for a `(side, target_quantity)` request
/// against one book snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VwapResult {
    pub target_quantity: Decimal,
    pub reference_price: Option<Decimal>,
    pub vwap_price: Option<Decimal>,
    pub total_cost: Decimal,
    pub slippage_fraction: Option<Decimal>,
    pub fills: Vec<Fill>,
    pub depth_used: usize,
    pub liquidity_sufficient: bool,
    pub quality: Quality,
}

/// Walk the relevant side of `book` greedily, consuming levels until
/// `target_quantity` is met or the side is exhausted. Grounded on
/// `orderbook::depth::calculate_vwap`'s consume-until-exhausted loop.
pub fn compute_vwap(book: &ReadOnlyBook, side: TradeSide, target_quantity: Decimal) -> VwapResult {
    let levels = match side {
        TradeSide::Buy => &book.asks,
        TradeSide::Sell => &book.bids,
    };
    let reference_price = match side {
        TradeSide::Buy => book.best_ask().map(|l| l.price),
        TradeSide::Sell => book.best_bid().map(|l| l.price),
    };

    if target_quantity <= Decimal::ZERO {
        return VwapResult {
            target_quantity,
            reference_price,
            vwap_price: Some(reference_price.unwrap_or(Decimal::ZERO)),
            total_cost: Decimal::ZERO,
            slippage_fraction: Some(Decimal::ZERO),
            fills: Vec::new(),
            depth_used: 0,
            liquidity_sufficient: true,
            quality: Quality::Excellent,
        };
    }

    let mut remaining = target_quantity;
    let mut cost = Decimal::ZERO;
    let mut fills = Vec::new();

    for level in levels {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = remaining.min(level.size);
        if take <= Decimal::ZERO {
            continue;
        }
        cost += level.price * take;
        fills.push(Fill { price: level.price, size: take });
        remaining -= take;
    }

    let liquidity_sufficient = remaining <= Decimal::ZERO;
    let filled_quantity = target_quantity - remaining.max(Decimal::ZERO);

    let vwap_price = if filled_quantity > Decimal::ZERO {
        Some(cost / filled_quantity)
    } else {
        None
    };

    let slippage_fraction = match (vwap_price, reference_price) {
        (Some(vwap), Some(reference)) if !reference.is_zero() => {
            let raw = (vwap - reference) / reference;
            Some(match side {
                TradeSide::Buy => raw,
                TradeSide::Sell => -raw,
            })
        }
        _ => None,
    };

    let quality = if !liquidity_sufficient {
        Quality::InsufficientLiquidity
    } else {
        slippage_fraction
            .map(Quality::from_slippage)
            .unwrap_or(Quality::InsufficientLiquidity)
    };

    VwapResult {
        target_quantity,
        reference_price,
        vwap_price,
        total_cost: cost,
        slippage_fraction,
        depth_used: fills.len(),
        fills,
        liquidity_sufficient,
        quality,
    }
}

/// Book-wide liquidity/health metrics (§4.3), independent of any one
/// candidate order size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LiquidityMetrics {
    pub spread_bps: Option<Decimal>,
    pub bid_depth: Decimal,
    pub ask_depth: Decimal,
    pub depth_imbalance: Option<Decimal>,
    pub healthy: bool,
}

pub fn liquidity_metrics(book: &ReadOnlyBook, max_levels: usize, min_depth: Decimal, max_spread_bps: Decimal) -> LiquidityMetrics {
    let bid_depth = book.depth(BookSide::Bid, max_levels);
    let ask_depth = book.depth(BookSide::Ask, max_levels);
    let total = bid_depth + ask_depth;
    let depth_imbalance = if total > Decimal::ZERO {
        Some(bid_depth / total)
    } else {
        None
    };
    let spread_bps = book.spread_bps();

    let healthy = total >= min_depth
        && spread_bps.map(|s| s <= max_spread_bps).unwrap_or(false);

    LiquidityMetrics {
        spread_bps,
        bid_depth,
        ask_depth,
        depth_imbalance,
        healthy,
    }
}

/// Split `target_quantity` into at most `max_chunks` sub-orders whose
/// individual VWAPs are each GOOD-or-better, by binary-searching the
/// largest size that still clears the bar and repeating on the remainder.
pub fn suggest_order_split(
    book: &ReadOnlyBook,
    side: TradeSide,
    target_quantity: Decimal,
    max_chunks: usize,
) -> Vec<Decimal> {
    let mut remaining = target_quantity;
    let mut chunks = Vec::new();

    for _ in 0..max_chunks {
        if remaining <= Decimal::ZERO {
            break;
        }

        let mut lo = Decimal::ZERO;
        let mut hi = remaining;
        let mut best = Decimal::ZERO;

        for _ in 0..32 {
            let mid = (lo + hi) / Decimal::TWO;
            if mid <= Decimal::ZERO {
                break;
            }
            let result = compute_vwap(book, side, mid);
            if result.liquidity_sufficient && result.quality.is_good_or_better() {
                best = mid;
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo < Decimal::new(1, 6) {
                break;
            }
        }

        if best <= Decimal::ZERO {
            break;
        }
        chunks.push(best);
        remaining -= best;
    }

    if remaining > Decimal::ZERO {
        chunks.push(remaining);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Asset, BookLevel, Venue};
    use rust_decimal_macros::dec;

    fn book_with(bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> ReadOnlyBook {
        ReadOnlyBook {
            asset: Asset::new("X", Venue::CentralizedClob),
            bids: bids.into_iter().map(|(p, s)| BookLevel::new(p, s)).collect(),
            asks: asks.into_iter().map(|(p, s)| BookLevel::new(p, s)).collect(),
            timestamp_ms: 1,
            fingerprint: 0,
        }
    }

    #[test]
    fn walk_up_blocks_trade_scenario() {
        // Spec §8 scenario 3.
        let book = book_with(
            vec![],
            vec![(dec!(0.52), dec!(200)), (dec!(0.54), dec!(300)), (dec!(0.58), dec!(500))],
        );
        let result = compute_vwap(&book, TradeSide::Buy, dec!(1000));
        assert!(result.liquidity_sufficient);
        assert_eq!(result.total_cost, dec!(556));
        assert_eq!(result.vwap_price.unwrap(), dec!(0.556));
        assert_eq!(result.quality, Quality::Poor);
    }

    #[test]
    fn empty_side_is_insufficient_liquidity() {
        let book = book_with(vec![], vec![]);
        let result = compute_vwap(&book, TradeSide::Buy, dec!(100));
        assert!(!result.liquidity_sufficient);
        assert_eq!(result.quality, Quality::InsufficientLiquidity);
        assert!(result.fills.is_empty());
    }

    #[test]
    fn zero_target_quantity_is_excellent() {
        let book = book_with(vec![], vec![(dec!(0.5), dec!(10))]);
        let result = compute_vwap(&book, TradeSide::Buy, Decimal::ZERO);
        assert_eq!(result.quality, Quality::Excellent);
        assert_eq!(result.total_cost, Decimal::ZERO);
    }

    #[test]
    fn fully_filled_sums_to_target() {
        let book = book_with(vec![], vec![(dec!(0.50), dec!(50)), (dec!(0.51), dec!(50))]);
        let result = compute_vwap(&book, TradeSide::Buy, dec!(80));
        assert!(result.liquidity_sufficient);
        let filled: Decimal = result.fills.iter().map(|f| f.size).sum();
        assert_eq!(filled, dec!(80));
        assert_eq!(result.vwap_price.unwrap(), result.total_cost / dec!(80));
    }

    #[test]
    fn order_split_preserves_total_quantity() {
        let book = book_with(
            vec![],
            vec![
                (dec!(0.50), dec!(50)),
                (dec!(0.70), dec!(50)),
                (dec!(0.90), dec!(500)),
            ],
        );
        let chunks = suggest_order_split(&book, TradeSide::Buy, dec!(200), 5);
        let total: Decimal = chunks.iter().sum();
        assert_eq!(total, dec!(200));
    }

    #[test]
    fn liquidity_metrics_flags_wide_spread_unhealthy() {
        let book = book_with(vec![(dec!(0.40), dec!(1000))], vec![(dec!(0.60), dec!(1000))]);
        let metrics = liquidity_metrics(&book, 20, dec!(100), dec!(500));
        assert!(!metrics.healthy);
    }
}
