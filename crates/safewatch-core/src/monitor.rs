use safewatch_proto::event::EmergencyReason;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::arbiter::EmergencyArbiter;
use crate::capability::{
    ActivityProvider, ConnectionProvider, IsolatedExecutor, OnlineProvider, PositionProvider, Unavailable,
};
use crate::config::MonitorConfig;
use crate::state::{SharedState, StatusSnapshot};
use crate::watch::{ConnectivityWatcher, HeartbeatWatcher, InactivityWatcher, LocationWatcher, NetworkWatcher};

/// Capabilities injected at construction. Anything left at the default is unavailable.
pub struct Providers {
    pub position: Box<dyn PositionProvider>,
    pub connection: Box<dyn ConnectionProvider>,
    pub online: Box<dyn OnlineProvider>,
    pub activity: Box<dyn ActivityProvider>,
    pub isolation: Box<dyn IsolatedExecutor>,
}

impl Default for Providers {
    fn default() -> Self {
        Self {
            position: Box::new(Unavailable),
            connection: Box::new(Unavailable),
            online: Box::new(Unavailable),
            activity: Box::new(Unavailable),
            isolation: Box::new(Unavailable),
        }
    }
}

pub struct Monitor {
    state: SharedState,
    arbiter: EmergencyArbiter,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Monitor {
    /// Must be called from within a tokio runtime.
    pub fn start(cfg: &MonitorConfig, mut providers: Providers) -> Self {
        info!("monitor: starting");
        let state = SharedState::new(cfg.log_capacity);
        let shutdown = CancellationToken::new();
        let arbiter = EmergencyArbiter::new(state.clone(), cfg.emergency_resolve(), shutdown.clone());

        let tasks = [
            LocationWatcher::new(state.clone(), cfg)
                .start(providers.position.as_mut(), shutdown.child_token()),
            NetworkWatcher::new(state.clone(), arbiter.clone(), cfg)
                .start(providers.connection.as_mut(), shutdown.child_token()),
            ConnectivityWatcher::new(state.clone())
                .start(providers.online.as_mut(), shutdown.child_token()),
            InactivityWatcher::new(state.clone(), arbiter.clone(), cfg)
                .start(providers.activity.as_mut(), shutdown.child_token()),
            HeartbeatWatcher::new(state.clone(), cfg.heartbeat_interval())
                .start(providers.isolation.as_mut(), shutdown.child_token()),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

        info!("monitor: {} watcher(s) running", tasks.len());
        Self { state, arbiter, shutdown, tasks }
    }

    /// Synthetic `MANUAL_TEST` trigger. False when an emergency is already active.
    pub fn trigger_manual_test(&self) -> bool {
        self.arbiter.trigger(EmergencyReason::ManualTest)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.state.snapshot()
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Cancels every timer and watcher. State is frozen afterwards.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        info!("monitor: stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ActivityFeed, Injected, PositionFeed};
    use crate::error::PositionError;
    use safewatch_proto::signal::{ActivityKind, ConnectionInfo, Location, NetworkStatus, PositionFix};
    use std::time::Duration;
    use tokio::sync::{mpsc, watch};

    #[tokio::test(start_paused = true)]
    async fn bare_environment_degrades_to_logging_only() {
        let monitor = Monitor::start(&MonitorConfig::default(), Providers::default());
        let snap = monitor.snapshot();
        assert_eq!(snap.network, NetworkStatus::Unsupported);
        assert!(snap.log_contains("Location disabled"));
        assert!(snap.log_contains("Background heartbeat unavailable"));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(monitor.snapshot().emergency.is_none());
        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_test_is_idempotent_while_active() {
        let monitor = Monitor::start(&MonitorConfig::default(), Providers::default());

        assert!(monitor.trigger_manual_test());
        let before = monitor.snapshot();
        assert_eq!(before.emergency_reason(), Some(EmergencyReason::ManualTest));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!monitor.trigger_manual_test());
        let after = monitor.snapshot();
        assert_eq!(after.log_total, before.log_total);
        assert_eq!(after.emergency, before.emergency);

        tokio::time::sleep(Duration::from_millis(7_001)).await;
        assert!(monitor.snapshot().emergency.is_none());
        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_trigger_wins_across_watchers() {
        let (_act_tx, act_rx) = mpsc::channel::<ActivityKind>(4);
        let (_net_tx, net_rx) = watch::channel(ConnectionInfo {
            effective_type: Some("slow-2g".into()),
            downlink_mbps: Some(0.05),
            rtt_ms: Some(4000),
        });
        let providers = Providers {
            activity: Box::new(Injected::<ActivityFeed>::new(act_rx)),
            connection: Box::new(Injected::new(net_rx)),
            ..Default::default()
        };
        let monitor = Monitor::start(&MonitorConfig::default(), providers);

        // network escalates at t=32s, inactivity would fire at t=45s
        tokio::time::sleep(Duration::from_secs(33)).await;
        assert_eq!(monitor.snapshot().emergency_reason(), Some(EmergencyReason::NetworkFailure));

        tokio::time::sleep(Duration::from_secs(13)).await; // t=46s
        let snap = monitor.snapshot();
        assert!(snap.inactive);
        // network emergency resolved at t=42s, so inactivity got its turn
        assert_eq!(snap.emergency_reason(), Some(EmergencyReason::Inactivity));
        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_changes_after_shutdown() {
        let (pos_tx, pos_rx) = mpsc::channel::<Result<PositionFix, PositionError>>(4);
        let providers = Providers {
            position: Box::new(Injected::<PositionFeed>::new(pos_rx)),
            ..Default::default()
        };
        let monitor = Monitor::start(&MonitorConfig::default(), providers);
        let state = monitor.state().clone();
        assert!(monitor.trigger_manual_test());

        monitor.shutdown().await;
        let frozen = state.snapshot();
        let _ = pos_tx
            .send(Ok(PositionFix { location: Location { lat: 1.0, lng: 1.0 }, sats: 8, hdop: 1.0, ts_unix_ms: 0 }))
            .await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        let after = state.snapshot();
        assert_eq!(after.location, None);
        assert_eq!(after.log_total, frozen.log_total);
        assert_eq!(after.emergency_reason(), Some(EmergencyReason::ManualTest));
    }
}
