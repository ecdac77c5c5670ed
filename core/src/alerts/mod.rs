//! Alerting, ported from `monitoring::alerts::{Alert, AlertManager}`.
//! Scoped to the three conditions §6 names as externally observable
//! alerts: book desync, all-venue disconnect, and consecutive execution
//! failures (which also trips the kill switch — see [`crate::risk`]).

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info = 0,
    Warning = 1,
    Error = 2,
    Critical = 3,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// The three §6 alert conditions, plus a catch-all for anything else worth
/// surfacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertCategory {
    BookDesync,
    VenueDisconnect,
    ExecutionFailures,
    Other,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookDesync => "BOOK_DESYNC",
            Self::VenueDisconnect => "VENUE_DISCONNECT",
            Self::ExecutionFailures => "EXECUTION_FAILURES",
            Self::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId {
    pub category: AlertCategory,
    pub name: String,
}

impl AlertId {
    pub fn new(category: AlertCategory, name: impl Into<String>) -> Self {
        Self { category, name: name.into() }
    }

    pub fn label(&self) -> String {
        format!("{}.{}", self.category.as_str(), self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub severity: AlertSeverity,
    pub message: String,
    pub details: HashMap<String, String>,
    pub timestamp: SystemTime,
}

impl Alert {
    pub fn new(category: AlertCategory, name: impl Into<String>, severity: AlertSeverity, message: impl Into<String>) -> Self {
        Self {
            id: AlertId::new(category, name),
            severity,
            message: message.into(),
            details: HashMap::new(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn format(&self) -> String {
        let mut out = format!("[{}] {} - {}", self.severity.as_str(), self.id.label(), self.message);
        for (k, v) in &self.details {
            out.push_str(&format!(" {k}={v}"));
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize alert to JSON")
    }
}

#[derive(Debug, Clone)]
pub enum AlertOutput {
    Console { min_severity: AlertSeverity },
    File { path: PathBuf, min_severity: AlertSeverity },
}

struct AlertState {
    last_seen: SystemTime,
    count: u64,
    last_sent: Option<SystemTime>,
}

impl AlertState {
    fn new() -> Self {
        Self { last_seen: SystemTime::now(), count: 1, last_sent: None }
    }

    fn update(&mut self) {
        self.last_seen = SystemTime::now();
        self.count += 1;
    }
}

#[derive(Debug, Clone)]
pub struct AlertManagerConfig {
    pub outputs: Vec<AlertOutput>,
    pub rate_limit_secs: u64,
    pub auto_resolve_secs: u64,
}

impl Default for AlertManagerConfig {
    fn default() -> Self {
        Self {
            outputs: vec![AlertOutput::Console { min_severity: AlertSeverity::Warning }],
            rate_limit_secs: 60,
            auto_resolve_secs: 300,
        }
    }
}

pub struct AlertManager {
    config: AlertManagerConfig,
    active: RwLock<HashMap<AlertId, AlertState>>,
}

impl AlertManager {
    pub fn new(config: AlertManagerConfig) -> Self {
        info!(outputs = config.outputs.len(), "alert manager initialized");
        Self { config, active: RwLock::new(HashMap::new()) }
    }

    pub fn send(&self, alert: Alert) -> Result<()> {
        if !self.should_send(&alert) {
            debug!("alert {} rate limited", alert.id.label());
            return Ok(());
        }
        self.update_state(&alert);

        for output in &self.config.outputs {
            if let Err(e) = self.send_to_output(&alert, output) {
                error!("failed to send alert to output: {e}");
            }
        }
        Ok(())
    }

    fn should_send(&self, alert: &Alert) -> bool {
        if alert.severity == AlertSeverity::Critical {
            return true;
        }
        let active = self.active.read();
        if let Some(state) = active.get(&alert.id) {
            if let Some(last_sent) = state.last_sent {
                if let Ok(elapsed) = last_sent.elapsed() {
                    if elapsed < Duration::from_secs(self.config.rate_limit_secs) {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn update_state(&self, alert: &Alert) {
        let mut active = self.active.write();
        active
            .entry(alert.id.clone())
            .and_modify(|s| {
                s.update();
                s.last_sent = Some(SystemTime::now());
            })
            .or_insert_with(|| {
                let mut s = AlertState::new();
                s.last_sent = Some(SystemTime::now());
                s
            });
    }

    fn send_to_output(&self, alert: &Alert, output: &AlertOutput) -> Result<()> {
        match output {
            AlertOutput::Console { min_severity } if alert.severity >= *min_severity => self.send_to_console(alert),
            AlertOutput::File { path, min_severity } if alert.severity >= *min_severity => self.send_to_file(alert, path),
            _ => Ok(()),
        }
    }

    fn send_to_console(&self, alert: &Alert) -> Result<()> {
        let formatted = alert.format();
        match alert.severity {
            AlertSeverity::Info => info!("{formatted}"),
            AlertSeverity::Warning => warn!("{formatted}"),
            AlertSeverity::Error | AlertSeverity::Critical => error!("{formatted}"),
        }
        Ok(())
    }

    fn send_to_file(&self, alert: &Alert, path: &PathBuf) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path).context("failed to open alert log file")?;
        writeln!(file, "{}", alert.to_json()?).context("failed to write alert to file")?;
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    pub fn cleanup_old_alerts(&self) {
        let now = SystemTime::now();
        let auto_resolve = Duration::from_secs(self.config.auto_resolve_secs);
        self.active.write().retain(|id, state| {
            let keep = now.duration_since(state.last_seen).map(|e| e <= auto_resolve).unwrap_or(true);
            if !keep {
                info!("auto-resolving inactive alert {}", id.label());
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn console_alert_tracked_active() {
        let manager = AlertManager::new(AlertManagerConfig::default());
        let alert = Alert::new(AlertCategory::BookDesync, "EVENT-YES", AlertSeverity::Warning, "desync detected");
        manager.send(alert).unwrap();
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn file_alert_writes_json_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alerts.log");
        let manager = AlertManager::new(AlertManagerConfig {
            outputs: vec![AlertOutput::File { path: path.clone(), min_severity: AlertSeverity::Info }],
            ..Default::default()
        });
        manager
            .send(Alert::new(AlertCategory::VenueDisconnect, "centralized", AlertSeverity::Error, "venue disconnected"))
            .unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("venue disconnected"));
    }

    #[test]
    fn critical_alerts_bypass_rate_limit() {
        let manager = AlertManager::new(AlertManagerConfig { rate_limit_secs: 60, ..Default::default() });
        let a1 = Alert::new(AlertCategory::ExecutionFailures, "halt", AlertSeverity::Critical, "kill switch tripped");
        let a2 = Alert::new(AlertCategory::ExecutionFailures, "halt", AlertSeverity::Critical, "still tripped");
        assert!(manager.should_send(&a1));
        manager.send(a1).unwrap();
        assert!(manager.should_send(&a2));
    }

    #[test]
    fn non_critical_repeat_is_rate_limited() {
        let manager = AlertManager::new(AlertManagerConfig { rate_limit_secs: 60, ..Default::default() });
        let a1 = Alert::new(AlertCategory::BookDesync, "EVENT-YES", AlertSeverity::Warning, "first");
        let a2 = Alert::new(AlertCategory::BookDesync, "EVENT-YES", AlertSeverity::Warning, "second");
        manager.send(a1).unwrap();
        assert!(!manager.should_send(&a2));
    }
}
