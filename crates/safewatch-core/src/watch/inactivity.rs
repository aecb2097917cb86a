use std::collections::HashMap;
use std::time::Duration;

use safewatch_proto::event::EmergencyReason;
use safewatch_proto::signal::ActivityKind;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::arbiter::EmergencyArbiter;
use crate::capability::{ActivityFeed, ActivityProvider};
use crate::config::MonitorConfig;
use crate::state::SharedState;
use crate::throttle::Throttle;

/// Counts down from the last recognized input and raises `INACTIVITY` on expiry.
pub struct InactivityWatcher {
    state: SharedState,
    arbiter: EmergencyArbiter,
    timeout: Duration,
    throttle: Duration,
}

impl InactivityWatcher {
    pub fn new(state: SharedState, arbiter: EmergencyArbiter, cfg: &MonitorConfig) -> Self {
        Self { state, arbiter, timeout: cfg.inactivity_timeout(), throttle: cfg.activity_throttle() }
    }

    pub fn start(self, provider: &mut dyn ActivityProvider, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        match provider.activity() {
            Ok(feed) => Some(tokio::spawn(self.run(feed, cancel))),
            Err(e) => {
                self.state.with(|st| st.log.warn(format!("Inactivity detection disabled: {}", e)));
                None
            }
        }
    }

    async fn run(self, mut feed: ActivityFeed, cancel: CancellationToken) {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<ActivityKind>();
        // One throttle per event class, as each class is its own listener.
        let throttles: HashMap<ActivityKind, Throttle<ActivityKind>> = ActivityKind::ALL
            .into_iter()
            .map(|kind| {
                let tx = seen_tx.clone();
                (kind, Throttle::new(self.throttle, &cancel, move |k| {
                    let _ = tx.send(k);
                }))
            })
            .collect();
        drop(seen_tx);

        let mut deadline = Instant::now() + self.timeout;
        let mut expired = false;
        let mut feed_open = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = feed.recv(), if feed_open => match event {
                    Some(kind) => {
                        if let Some(th) = throttles.get(&kind) {
                            th.call(kind);
                        }
                    }
                    None => {
                        feed_open = false;
                        self.state.update_live(&cancel, |st| st.log.warn("Input event feed closed"));
                    }
                },
                Some(kind) = seen_rx.recv() => {
                    deadline = Instant::now() + self.timeout;
                    if expired {
                        expired = false;
                        self.state.update_live(&cancel, |st| {
                            st.inactive = false;
                            st.log.info(format!("Activity resumed ({:?})", kind));
                        });
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !expired => {
                    expired = true;
                    let secs = self.timeout.as_secs();
                    let live = self.state.update_live(&cancel, |st| {
                        st.inactive = true;
                        st.log.warn(format!("Inactivity detected: no input for {}s", secs));
                    });
                    if live.is_some() {
                        self.arbiter.trigger(EmergencyReason::Inactivity);
                    }
                }
            }
        }

        for th in throttles.values() {
            th.cancel();
        }
        debug!("inactivity watcher stopped");
    }
}
