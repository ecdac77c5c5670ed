//! Error taxonomy for the arbitrage core.
//!
//! Every component returns `Result<T, ArbError>` at its public boundary so
//! callers can match on kind rather than parse strings. Application-level
//! call sites (the binaries) wrap these in `anyhow::Context` the same way
//! the rest of the stack does.

use crate::book::Asset;
use thiserror::Error;

/// The closed error taxonomy the system propagates across component
/// boundaries. See each variant's propagation policy in the module docs of
/// the component that raises it.
#[derive(Debug, Error)]
pub enum ArbError {
    /// Timeout, connection reset, 5xx from a venue or feed. Retried with
    /// backoff by the caller up to its configured `max_retries`.
    #[error("transient network error on {venue}: {reason}")]
    TransientNetwork { venue: String, reason: String },

    /// 4xx, insufficient funds, bad price. Not retried.
    #[error("venue {venue} rejected order: {reason}")]
    VenueRejection { venue: String, reason: String },

    /// Book fingerprint mismatch, or a delta arrived before any snapshot.
    #[error("book desync for {asset}: {reason}")]
    Desync { asset: Asset, reason: String },

    /// `best_bid >= best_ask` after applying an update.
    #[error("crossed book for {asset}: bid {bid} >= ask {ask}")]
    CrossedBook {
        asset: Asset,
        bid: rust_decimal::Decimal,
        ask: rust_decimal::Decimal,
    },

    /// An operation's time budget elapsed.
    #[error("operation timed out after {elapsed_ms}ms (budget {budget_ms}ms): {operation}")]
    Timeout {
        operation: String,
        elapsed_ms: u64,
        budget_ms: u64,
    },

    /// Missing credentials, invalid venue URL, or any other config defect.
    /// Fatal at startup; the process must refuse to begin trading.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// An internal contract was broken (negative size, cost-basis
    /// inconsistency, etc). Fail fast with context.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl ArbError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ArbError::TransientNetwork { .. })
    }

    /// Short machine-readable tag, used as a metrics/alert label.
    pub fn kind(&self) -> &'static str {
        match self {
            ArbError::TransientNetwork { .. } => "transient_network",
            ArbError::VenueRejection { .. } => "venue_rejection",
            ArbError::Desync { .. } => "desync",
            ArbError::CrossedBook { .. } => "crossed_book",
            ArbError::Timeout { .. } => "timeout",
            ArbError::ConfigError(_) => "config_error",
            ArbError::InvariantViolation { .. } => "invariant_violation",
        }
    }
}

pub type Result<T> = std::result::Result<T, ArbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_only_for_transient() {
        let e = ArbError::TransientNetwork {
            venue: "polymarket".into(),
            reason: "connection reset".into(),
        };
        assert!(e.is_retryable());

        let e = ArbError::ConfigError("missing api key".into());
        assert!(!e.is_retryable());
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(ArbError::ConfigError("x".into()).kind(), "config_error");
        assert_eq!(
            ArbError::InvariantViolation("x".into()).kind(),
            "invariant_violation"
        );
    }
}
