use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::capability::{OnlineFeed, OnlineProvider};
use crate::state::SharedState;

/// Mirrors the device online flag into state. Logs transitions, never escalates.
pub struct ConnectivityWatcher {
    state: SharedState,
}

impl ConnectivityWatcher {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    pub fn start(self, provider: &mut dyn OnlineProvider, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        match provider.online() {
            Ok(feed) => Some(tokio::spawn(self.run(feed, cancel))),
            Err(e) => {
                self.state.with(|st| st.log.warn(format!("Connectivity monitoring disabled: {}", e)));
                None
            }
        }
    }

    async fn run(self, mut feed: OnlineFeed, cancel: CancellationToken) {
        let initial = *feed.borrow_and_update();
        self.apply(initial, &cancel);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = feed.changed() => {
                    if changed.is_err() {
                        self.state.update_live(&cancel, |st| st.log.warn("Online state feed closed"));
                        break;
                    }
                    let online = *feed.borrow_and_update();
                    self.apply(online, &cancel);
                }
            }
        }
        debug!("connectivity watcher stopped");
    }

    fn apply(&self, online: bool, cancel: &CancellationToken) {
        self.state.update_live(cancel, |st| {
            let previous = st.online.replace(online);
            match (previous, online) {
                (Some(was), now) if was == now => {}
                (None, true) => {}
                (_, true) => st.log.info("Device back online"),
                (_, false) => st.log.warn("Device offline"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Injected, Unavailable};
    use std::time::Duration;
    use tokio::sync::watch;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn logs_transitions_only() {
        let state = SharedState::new(20);
        let (tx, rx) = watch::channel(true);
        let cancel = CancellationToken::new();
        let _h = ConnectivityWatcher::new(state.clone()).start(&mut Injected::new(rx), cancel.clone());
        settle().await;
        assert_eq!(state.snapshot().online, Some(true));
        assert_eq!(state.snapshot().log.len(), 0);

        tx.send(false).unwrap();
        settle().await;
        tx.send(false).unwrap();
        settle().await;
        tx.send(true).unwrap();
        settle().await;

        let snap = state.snapshot();
        let msgs: Vec<_> = snap.log.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, ["Device offline", "Device back online"]);
        assert_eq!(snap.online, Some(true));
        assert!(snap.emergency.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn starting_offline_is_logged() {
        let state = SharedState::new(20);
        let (_tx, rx) = watch::channel(false);
        let _h = ConnectivityWatcher::new(state.clone()).start(&mut Injected::new(rx), CancellationToken::new());
        settle().await;
        assert!(state.snapshot().log_contains("Device offline"));
    }

    #[tokio::test]
    async fn missing_capability_is_logged() {
        let state = SharedState::new(20);
        let h = ConnectivityWatcher::new(state.clone()).start(&mut Unavailable, CancellationToken::new());
        assert!(h.is_none());
        assert_eq!(state.snapshot().online, None);
    }
}
