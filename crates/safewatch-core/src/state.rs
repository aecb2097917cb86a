use std::sync::{Arc, Mutex, MutexGuard};

use safewatch_proto::event::{EmergencyReason, LogEntry};
use safewatch_proto::signal::{Location, NetworkStatus};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::log::EventLog;

#[derive(Debug, Clone, PartialEq)]
pub struct Emergency {
    pub reason: EmergencyReason,
    pub started_at: Instant,
    pub started_unix_ms: i64,
}

/// Everything the watchers write and the presentation layer reads.
#[derive(Debug)]
pub struct MonitorState {
    pub location: Option<Location>,
    pub network: NetworkStatus,
    /// Number of times the network tier was (re)classified.
    pub network_checks: u64,
    pub escalation_pending: bool,
    /// None until the connectivity capability reports.
    pub online: Option<bool>,
    pub inactive: bool,
    pub emergency: Option<Emergency>,
    pub log: EventLog,
}

impl MonitorState {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            location: None,
            network: NetworkStatus::Checking,
            network_checks: 0,
            escalation_pending: false,
            online: None,
            inactive: false,
            emergency: None,
            log: EventLog::new(log_capacity),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub location: Option<Location>,
    pub network: NetworkStatus,
    pub network_checks: u64,
    pub escalation_pending: bool,
    pub online: Option<bool>,
    pub inactive: bool,
    pub emergency: Option<Emergency>,
    pub log: Vec<LogEntry>,
    pub log_total: u64,
}

impl StatusSnapshot {
    pub fn emergency_reason(&self) -> Option<EmergencyReason> {
        self.emergency.as_ref().map(|e| e.reason)
    }

    pub fn log_contains(&self, needle: &str) -> bool {
        self.log.iter().any(|e| e.message.contains(needle))
    }
}

/// Single-writer-at-a-time handle to the monitor state.
/// The lock is never held across an await point.
#[derive(Debug, Clone)]
pub struct SharedState(Arc<Mutex<MonitorState>>);

impl SharedState {
    pub fn new(log_capacity: usize) -> Self {
        Self(Arc::new(Mutex::new(MonitorState::new(log_capacity))))
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        // A panicking writer cannot leave the state half-built in a way that matters here.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MonitorState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Like `with`, but a no-op once `live` has been cancelled.
    pub fn update_live<R>(&self, live: &CancellationToken, f: impl FnOnce(&mut MonitorState) -> R) -> Option<R> {
        let mut st = self.lock();
        if live.is_cancelled() {
            return None;
        }
        Some(f(&mut st))
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let st = self.lock();
        StatusSnapshot {
            location: st.location,
            network: st.network,
            network_checks: st.network_checks,
            escalation_pending: st.escalation_pending,
            online: st.online,
            inactive: st.inactive,
            emergency: st.emergency.clone(),
            log: st.log.entries().cloned().collect(),
            log_total: st.log.total(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_live_is_noop_after_cancel() {
        let state = SharedState::new(5);
        let live = CancellationToken::new();
        assert_eq!(state.update_live(&live, |s| { s.inactive = true; 1 }), Some(1));
        live.cancel();
        assert_eq!(state.update_live(&live, |s| { s.inactive = false; 2 }), None);
        assert!(state.snapshot().inactive);
    }
}
