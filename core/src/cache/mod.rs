//! Observability-only TTL cache boundary (spec design notes, §6 cache keys).
//!
//! The core never relies on this cache for correctness — book state is
//! always re-derivable from the feed, and executor state lives in the
//! journal (`executor::journal`). This is purely a publish surface for
//! external observers (dashboards, other processes) to read `orderbook:*`,
//! `vwap:*` keys and subscribe to `trade:*`/`fill:*` channels without
//! touching the hot path.
//!
//! No direct teacher equivalent exists (the teacher's nearest analogue is
//! the Prometheus exposition in `monitoring/server.rs`); this module is
//! authored fresh in the teacher's struct-plus-`parking_lot`-lock style.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Instant,
}

/// A TTL-keyed string cache plus bounded per-channel pub/sub buffers.
///
/// `put_with_ttl`/`get` model the key-value boundary (`orderbook:*`,
/// `vwap:*`); `publish`/`drain` model the channel boundary (`trade:*`,
/// `fill:*`). Channel buffers are bounded ring buffers, not true pub/sub:
/// observers poll `drain` rather than being pushed to, matching a
/// process-external cache rather than an in-process broadcast.
pub struct Cache {
    entries: RwLock<HashMap<String, Entry>>,
    channels: RwLock<HashMap<String, VecDeque<String>>>,
    channel_capacity: usize,
}

impl Cache {
    pub fn new() -> Arc<Self> {
        Self::with_channel_capacity(256)
    }

    pub fn with_channel_capacity(channel_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
            channel_capacity,
        })
    }

    pub fn put_with_ttl(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.entries.write().insert(
            key.into(),
            Entry {
                value: value.into(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.expires_at < Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Drop expired entries. Call periodically; cheap no-op otherwise.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, e| e.expires_at >= now);
    }

    pub fn publish(&self, channel: impl Into<String>, value: impl Into<String>) {
        let mut channels = self.channels.write();
        let buf = channels.entry(channel.into()).or_default();
        buf.push_back(value.into());
        while buf.len() > self.channel_capacity {
            buf.pop_front();
        }
    }

    /// Drain everything currently buffered on `channel`.
    pub fn drain(&self, channel: &str) -> Vec<String> {
        self.channels
            .write()
            .get_mut(channel)
            .map(std::mem::take)
            .map(Vec::from)
            .unwrap_or_default()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
            channel_capacity: 256,
        }
    }
}

/// Standard cache key/channel names from the external-interfaces boundary.
pub mod keys {
    pub fn orderbook(venue: &str, asset: &str) -> String {
        format!("orderbook:{venue}:{asset}")
    }

    pub fn vwap(asset: &str, depth_usd: &str) -> String {
        format!("vwap:{asset}:{depth_usd}")
    }

    pub fn trade_channel(asset: &str) -> String {
        format!("trade:{asset}")
    }

    pub fn fill_channel(trade_id: &str) -> String {
        format!("fill:{trade_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_round_trips() {
        let cache = Cache::default();
        cache.put_with_ttl("orderbook:centralized:X", "payload", Duration::from_secs(5));
        assert_eq!(cache.get("orderbook:centralized:X").as_deref(), Some("payload"));
    }

    #[test]
    fn expired_entry_not_returned() {
        let cache = Cache::default();
        cache.put_with_ttl("k", "v", Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn channel_drains_in_order_and_bounds() {
        let cache = Cache::with_channel_capacity(2);
        cache.publish("trade:X", "1");
        cache.publish("trade:X", "2");
        cache.publish("trade:X", "3");
        let drained = cache.drain("trade:X");
        assert_eq!(drained, vec!["2".to_string(), "3".to_string()]);
        assert!(cache.drain("trade:X").is_empty());
    }
}
