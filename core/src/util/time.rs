//! Small time helpers shared by the feed, executor, and journal.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch. Used for event timestamps and journal
/// entries; never used for latency measurement (use `std::time::Instant`
/// for that, as the executor does for its execution-time budget).
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}
