//! Emergency kill switch.
//!
//! Ported from `resilience::kill_switch::KillSwitch`: signal-driven
//! (SIGTERM/SIGUSR1/SIGUSR2), atomic-state, manual-clear-only on
//! emergency stop, matching §7's "can only be cleared manually" rule.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{error, info};

/// How often an installed signal handler thread polls its registered flag.
const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KillSwitchState {
    Running = 0,
    Paused = 1,
    ShuttingDown = 2,
    EmergencyStop = 3,
}

impl From<u8> for KillSwitchState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Paused,
            2 => Self::ShuttingDown,
            3 => Self::EmergencyStop,
            _ => Self::Running,
        }
    }
}

#[derive(Clone)]
pub struct KillSwitch {
    state: Arc<AtomicU8>,
    shutdown_reason: Arc<parking_lot::Mutex<Option<String>>>,
    shutdown_time: Arc<parking_lot::Mutex<Option<SystemTime>>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(KillSwitchState::Running as u8)),
            shutdown_reason: Arc::new(parking_lot::Mutex::new(None)),
            shutdown_time: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// Install SIGTERM/SIGUSR1/SIGUSR2 handlers and return the kill switch
    /// that they drive. SIGTERM requests graceful shutdown, SIGUSR1 is an
    /// immediate emergency stop, SIGUSR2 toggles pause/resume.
    pub fn install() -> Self {
        let kill_switch = Self::new();

        #[cfg(unix)]
        {
            Self::install_signal(signal_hook::consts::SIGTERM, "SIGTERM", kill_switch.clone(), |ks| {
                ks.shutdown("SIGTERM received")
            });
            Self::install_signal(signal_hook::consts::SIGUSR1, "SIGUSR1", kill_switch.clone(), |ks| {
                ks.emergency_stop("SIGUSR1 received")
            });
            Self::install_signal(signal_hook::consts::SIGUSR2, "SIGUSR2", kill_switch.clone(), |ks| ks.toggle_pause());
        }

        kill_switch
    }

    /// Register `signal` against a fresh flag and spawn a thread that polls
    /// it every [`SIGNAL_POLL_INTERVAL`], invoking `action` each time the
    /// flag is observed set. Runs for the lifetime of the process.
    #[cfg(unix)]
    fn install_signal(signal: std::os::raw::c_int, name: &'static str, ks: Self, action: impl Fn(&Self) + Send + 'static) {
        let flag = Arc::new(AtomicBool::new(false));
        match signal_hook::flag::register(signal, flag.clone()) {
            Ok(()) => {
                std::thread::spawn(move || loop {
                    if flag.swap(false, Ordering::Relaxed) {
                        action(&ks);
                    }
                    std::thread::sleep(SIGNAL_POLL_INTERVAL);
                });
                info!("{name} handler installed");
            }
            Err(e) => error!("failed to register {name} handler: {e}"),
        }
    }

    #[inline]
    pub fn should_stop(&self) -> bool {
        matches!(self.state(), KillSwitchState::ShuttingDown | KillSwitchState::EmergencyStop)
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        matches!(self.state(), KillSwitchState::Paused)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self.state(), KillSwitchState::Running)
    }

    pub fn shutdown(&self, reason: &str) {
        info!("kill switch activated: {reason}");
        self.state.store(KillSwitchState::ShuttingDown as u8, Ordering::Release);
        *self.shutdown_reason.lock() = Some(reason.to_string());
        *self.shutdown_time.lock() = Some(SystemTime::now());
    }

    pub fn emergency_stop(&self, reason: &str) {
        error!("EMERGENCY STOP: {reason}");
        self.state.store(KillSwitchState::EmergencyStop as u8, Ordering::Release);
        *self.shutdown_reason.lock() = Some(format!("EMERGENCY: {reason}"));
        *self.shutdown_time.lock() = Some(SystemTime::now());
    }

    pub fn pause(&self) {
        if matches!(self.state(), KillSwitchState::Running) {
            info!("kill switch: pausing trading");
            self.state.store(KillSwitchState::Paused as u8, Ordering::Release);
        }
    }

    /// Manually resume from `Paused`. Does nothing from `ShuttingDown` or
    /// `EmergencyStop` — those require a fresh process per §7.
    pub fn resume(&self) {
        if matches!(self.state(), KillSwitchState::Paused) {
            info!("kill switch: resuming trading");
            self.state.store(KillSwitchState::Running as u8, Ordering::Release);
        }
    }

    pub fn toggle_pause(&self) {
        if self.is_paused() {
            self.resume();
        } else if self.is_running() {
            self.pause();
        }
    }

    pub fn state(&self) -> KillSwitchState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn shutdown_reason(&self) -> Option<String> {
        self.shutdown_reason.lock().clone()
    }

    pub fn shutdown_time(&self) -> Option<SystemTime> {
        *self.shutdown_time.lock()
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let ks = KillSwitch::new();
        assert!(ks.is_running());
        assert!(!ks.should_stop());
    }

    #[test]
    fn graceful_shutdown() {
        let ks = KillSwitch::new();
        ks.shutdown("test shutdown");
        assert!(ks.should_stop());
        assert_eq!(ks.state(), KillSwitchState::ShuttingDown);
        assert_eq!(ks.shutdown_reason(), Some("test shutdown".to_string()));
    }

    #[test]
    fn emergency_stop_is_terminal() {
        let ks = KillSwitch::new();
        ks.emergency_stop("critical error");
        assert!(ks.should_stop());
        ks.resume(); // must have no effect
        assert!(ks.should_stop());
    }

    #[test]
    fn pause_resume_cycle() {
        let ks = KillSwitch::new();
        ks.pause();
        assert!(ks.is_paused());
        ks.resume();
        assert!(ks.is_running());
    }

    #[test]
    fn toggle_pause_flips_state() {
        let ks = KillSwitch::new();
        ks.toggle_pause();
        assert!(ks.is_paused());
        ks.toggle_pause();
        assert!(ks.is_running());
    }
}
