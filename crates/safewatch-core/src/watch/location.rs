use safewatch_proto::signal::{Location, PositionFix};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::capability::{PositionFeed, PositionOptions, PositionProvider};
use crate::config::MonitorConfig;
use crate::state::SharedState;

/// Tracks the last accepted position, dropping sub-epsilon jitter.
pub struct LocationWatcher {
    state: SharedState,
    epsilon_deg: f64,
    opts: PositionOptions,
}

impl LocationWatcher {
    pub fn new(state: SharedState, cfg: &MonitorConfig) -> Self {
        Self {
            state,
            epsilon_deg: cfg.location_epsilon_deg,
            opts: PositionOptions {
                maximum_age: cfg.location_max_age(),
                timeout: cfg.location_timeout(),
            },
        }
    }

    pub fn start(self, provider: &mut dyn PositionProvider, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        match provider.watch_position(self.opts) {
            Ok(feed) => Some(tokio::spawn(self.run(feed, cancel))),
            Err(e) => {
                self.state.with(|st| st.log.warn(format!("Location disabled: {}", e)));
                None
            }
        }
    }

    async fn run(self, mut feed: PositionFeed, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                reading = feed.recv() => match reading {
                    Some(Ok(fix)) => self.on_fix(&fix, &cancel),
                    Some(Err(e)) => {
                        self.state.update_live(&cancel, |st| st.log.warn(format!("Location error: {}", e)));
                    }
                    None => {
                        self.state.update_live(&cancel, |st| st.log.warn("Location feed closed"));
                        break;
                    }
                },
            }
        }
        // Dropping the feed ends the subscription.
        debug!("location watcher stopped");
    }

    fn on_fix(&self, fix: &PositionFix, cancel: &CancellationToken) {
        let eps = self.epsilon_deg;
        self.state.update_live(cancel, |st| {
            if !is_significant(st.location.as_ref(), &fix.location, eps) {
                return;
            }
            st.location = Some(fix.location);
            st.log.info(format!("Location updated: {:.5}, {:.5}", fix.location.lat, fix.location.lng));
        });
    }
}

fn is_significant(last: Option<&Location>, next: &Location, epsilon_deg: f64) -> bool {
    match last {
        None => true,
        Some(last) => next.differs_from(last, epsilon_deg),
    }
}
