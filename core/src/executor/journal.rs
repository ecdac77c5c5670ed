//! Append-only execution journal, ported from
//! `execution::production::{JournalEvent, JournalEntry, RecoveryStats}`.
//! Persists terminal trades (§6 "persisted state layout") for recovery and
//! audit; never load-bearing for in-flight correctness.

use super::{MultiLegTrade, TradeId};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write as IoWrite};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
enum JournalEvent {
    TradeStarted(TradeId),
    TradeTerminal(MultiLegTrade),
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    timestamp_ms: u64,
    #[serde(flatten)]
    event: JournalEvent,
}

impl JournalEntry {
    fn new(event: JournalEvent) -> Self {
        Self {
            timestamp_ms: crate::util::time::now_ms(),
            event,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecoveryStats {
    pub trades_recovered: usize,
    pub entries_read: usize,
    pub errors: usize,
}

/// One append-only JSONL file backing the persisted trade record (§6).
pub struct Journal {
    path: PathBuf,
    enabled: bool,
}

impl Journal {
    pub fn new(path: PathBuf, enabled: bool) -> Self {
        if enabled {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        Self { path, enabled }
    }

    pub fn record_start(&self, trade_id: &TradeId) {
        self.write(JournalEvent::TradeStarted(trade_id.clone()));
    }

    pub fn record_terminal(&self, trade: &MultiLegTrade) {
        self.write(JournalEvent::TradeTerminal(trade.clone()));
    }

    fn write(&self, event: JournalEvent) {
        if !self.enabled {
            return;
        }
        let mut file = match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                error!("failed to open execution journal: {e}");
                return;
            }
        };
        let entry = JournalEntry::new(event);
        if let Ok(json) = serde_json::to_string(&entry) {
            writeln!(file, "{json}").ok();
        }
    }

    /// Replay the journal, returning every trade whose terminal record was
    /// found. Started-but-never-terminated trades are reported as errors:
    /// the system crashed mid-execution and that trade's true final state
    /// must be reconciled against the venues directly, not assumed.
    pub fn recover(path: &Path) -> std::io::Result<(Vec<MultiLegTrade>, RecoveryStats)> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut stats = RecoveryStats::default();
        let mut started: std::collections::HashSet<TradeId> = std::collections::HashSet::new();
        let mut terminal: Vec<MultiLegTrade> = Vec::new();

        for line in reader.lines() {
            stats.entries_read += 1;
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    stats.errors += 1;
                    warn!("failed to read journal line: {e}");
                    continue;
                }
            };
            let entry: JournalEntry = match serde_json::from_str(&line) {
                Ok(e) => e,
                Err(e) => {
                    stats.errors += 1;
                    warn!("failed to parse journal entry: {e}");
                    continue;
                }
            };
            match entry.event {
                JournalEvent::TradeStarted(id) => {
                    started.insert(id);
                }
                JournalEvent::TradeTerminal(trade) => {
                    started.remove(&trade.id);
                    terminal.push(trade);
                }
            }
        }

        stats.trades_recovered = terminal.len();
        if !started.is_empty() {
            stats.errors += started.len();
            warn!("{} trades started but never reached a terminal state", started.len());
        }

        Ok((terminal, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{LegExecutionState, OverallState};
    use tempfile::NamedTempFile;

    fn sample_trade(id: &str) -> MultiLegTrade {
        MultiLegTrade {
            id: id.to_string(),
            legs: vec![LegExecutionState::new_for_test()],
            overall_state: OverallState::Committed,
            start_time_ms: 0,
            end_time_ms: 10,
            realized_profit: rust_decimal::Decimal::ONE,
        }
    }

    #[test]
    fn recovers_terminal_trades_and_flags_unterminated() {
        let temp = NamedTempFile::new().unwrap();
        let journal = Journal::new(temp.path().to_path_buf(), true);

        journal.record_start(&"trade-1".to_string());
        journal.record_terminal(&sample_trade("trade-1"));
        journal.record_start(&"trade-2".to_string()); // never terminated

        let (trades, stats) = Journal::recover(temp.path()).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(stats.trades_recovered, 1);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn disabled_journal_writes_nothing() {
        let temp = NamedTempFile::new().unwrap();
        let path = temp.path().to_path_buf();
        std::fs::remove_file(&path).ok();
        let journal = Journal::new(path.clone(), false);
        journal.record_start(&"trade-1".to_string());
        assert!(!path.exists());
    }
}
