use std::time::Duration;

use safewatch_proto::event::EmergencyReason;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::log::now_unix_ms;
use crate::state::{Emergency, SharedState};

/// At most one emergency at a time; triggers while active are ignored.
#[derive(Debug, Clone)]
pub struct EmergencyArbiter {
    state: SharedState,
    resolve_after: Duration,
    shutdown: CancellationToken,
}

impl EmergencyArbiter {
    pub fn new(state: SharedState, resolve_after: Duration, shutdown: CancellationToken) -> Self {
        Self { state, resolve_after, shutdown }
    }

    /// Returns true when this call opened a new emergency.
    pub fn trigger(&self, reason: EmergencyReason) -> bool {
        let started_at = Instant::now();
        let opened = self.state.update_live(&self.shutdown, |st| {
            if let Some(active) = &st.emergency {
                debug!("trigger {} ignored: {} already active", reason, active.reason);
                return false;
            }
            st.emergency = Some(Emergency { reason, started_at, started_unix_ms: now_unix_ms() });
            st.log.warn(format!("EMERGENCY: {}", reason));
            true
        });

        if opened == Some(true) {
            self.schedule_resolution(started_at);
            true
        } else {
            false
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.with(|st| st.emergency.is_some())
    }

    fn schedule_resolution(&self, started_at: Instant) {
        let state = self.state.clone();
        let shutdown = self.shutdown.clone();
        let due = started_at + self.resolve_after;
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep_until(due) => {
                    state.update_live(&shutdown, |st| {
                        // Only clear the emergency this timer was armed for.
                        if st.emergency.as_ref().is_some_and(|e| e.started_at == started_at) {
                            st.emergency = None;
                            st.log.info("Emergency resolved");
                        }
                    });
                }
            }
        });
    }
}
