use std::time::Duration;

use safewatch_proto::event::EmergencyReason;
use safewatch_proto::signal::{ConnectionInfo, NetworkStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::arbiter::EmergencyArbiter;
use crate::capability::{ConnectionFeed, ConnectionProvider};
use crate::config::{
    ClassificationOrder, MonitorConfig, POOR_DOWNLINK_MBPS, POOR_RTT_MS, VERY_POOR_DOWNLINK_MBPS,
    VERY_POOR_RTT_MS,
};
use crate::state::SharedState;
use crate::throttle::Throttle;

/// Pure function of the metadata sample. First matching tier wins.
pub fn classify(info: &ConnectionInfo, order: ClassificationOrder) -> NetworkStatus {
    let tag = info.effective_type.as_deref().unwrap_or("");
    let downlink_below = |limit: f64| info.downlink_mbps.is_some_and(|d| d < limit);
    let rtt_above = |limit: u32| info.rtt_ms.is_some_and(|r| r > limit);

    let very_poor = tag.contains("slow-2g") || downlink_below(VERY_POOR_DOWNLINK_MBPS) || rtt_above(VERY_POOR_RTT_MS);
    let poor = tag.contains("2g") || downlink_below(POOR_DOWNLINK_MBPS) || rtt_above(POOR_RTT_MS);

    match order {
        ClassificationOrder::SeverityFirst => {
            if very_poor { NetworkStatus::VeryPoor } else if poor { NetworkStatus::Poor } else { NetworkStatus::Good }
        }
        ClassificationOrder::LegacyPoorFirst => {
            if poor { NetworkStatus::Poor } else if very_poor { NetworkStatus::VeryPoor } else { NetworkStatus::Good }
        }
    }
}

pub struct NetworkWatcher {
    state: SharedState,
    arbiter: EmergencyArbiter,
    order: ClassificationOrder,
    warmup: Duration,
    throttle: Duration,
    escalation: Duration,
    cancel_on_recovery: bool,
}

impl NetworkWatcher {
    pub fn new(state: SharedState, arbiter: EmergencyArbiter, cfg: &MonitorConfig) -> Self {
        Self {
            state,
            arbiter,
            order: cfg.classification_order,
            warmup: cfg.network_warmup(),
            throttle: cfg.network_throttle(),
            escalation: cfg.network_escalation(),
            cancel_on_recovery: cfg.cancel_escalation_on_recovery,
        }
    }

    pub fn start(self, provider: &mut dyn ConnectionProvider, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        match provider.connection() {
            Ok(feed) => Some(tokio::spawn(self.run(feed, cancel))),
            Err(e) => {
                self.state.with(|st| {
                    st.network = NetworkStatus::Unsupported;
                    st.log.warn(format!("Network monitoring unsupported: {}", e));
                });
                None
            }
        }
    }

    async fn run(self, mut feed: ConnectionFeed, cancel: CancellationToken) {
        let (recheck_tx, mut recheck_rx) = mpsc::unbounded_channel::<()>();
        let recheck = Throttle::new(self.throttle, &cancel, move |()| {
            let _ = recheck_tx.send(());
        });

        let warmup = tokio::time::sleep(self.warmup);
        tokio::pin!(warmup);
        let mut warmed = false;
        let mut feed_open = true;
        let mut escalate_at: Option<Instant> = None;

        loop {
            let escalation_timer = tokio::time::sleep_until(escalate_at.unwrap_or_else(Instant::now));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = &mut warmup, if !warmed => {
                    warmed = true;
                    self.check(&feed, &mut escalate_at, &cancel);
                }
                changed = feed.changed(), if feed_open => match changed {
                    Ok(()) => recheck.call(()),
                    Err(_) => {
                        feed_open = false;
                        self.state.update_live(&cancel, |st| st.log.warn("Network information feed closed"));
                    }
                },
                Some(()) = recheck_rx.recv() => self.check(&feed, &mut escalate_at, &cancel),
                _ = escalation_timer, if escalate_at.is_some() => {
                    escalate_at = None;
                    self.escalate(&cancel);
                }
            }
        }
        recheck.cancel();
        debug!("network watcher stopped");
    }

    fn check(&self, feed: &ConnectionFeed, escalate_at: &mut Option<Instant>, cancel: &CancellationToken) {
        let info = feed.borrow().clone();
        let status = classify(&info, self.order);
        let now = Instant::now();

        self.state.update_live(cancel, |st| {
            st.network_checks += 1;
            if st.network != status {
                st.log.info(format!("Network quality: {}", status));
                st.network = status;
            }

            if status == NetworkStatus::VeryPoor {
                // Re-arm: at most one escalation is ever pending.
                if escalate_at.replace(now + self.escalation).is_none() {
                    st.log.warn(format!("Network very poor, escalating in {}s", self.escalation.as_secs()));
                }
                st.escalation_pending = true;
            } else if self.cancel_on_recovery && escalate_at.take().is_some() {
                st.escalation_pending = false;
                st.log.info("Network recovered, escalation cancelled");
            }
        });
    }

    fn escalate(&self, cancel: &CancellationToken) {
        let still_bad = self.state.update_live(cancel, |st| {
            st.escalation_pending = false;
            st.network == NetworkStatus::VeryPoor
        });
        if still_bad == Some(true) {
            self.arbiter.trigger(EmergencyReason::NetworkFailure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Injected, Unavailable};
    use tokio::sync::watch;

    fn info(effective_type: Option<&str>, downlink: Option<f64>, rtt: Option<u32>) -> ConnectionInfo {
        ConnectionInfo { effective_type: effective_type.map(String::from), downlink_mbps: downlink, rtt_ms: rtt }
    }

    fn very_poor(rtt: u32) -> ConnectionInfo {
        info(Some("slow-2g"), Some(0.1), Some(rtt))
    }

    fn good() -> ConnectionInfo {
        info(Some("4g"), Some(10.0), Some(50))
    }

    struct Rig {
        state: SharedState,
        tx: watch::Sender<ConnectionInfo>,
        cancel: CancellationToken,
        _handle: JoinHandle<()>,
    }

    fn rig(initial: ConnectionInfo, cfg: MonitorConfig) -> Rig {
        let state = SharedState::new(50);
        let cancel = CancellationToken::new();
        let arbiter = EmergencyArbiter::new(state.clone(), cfg.emergency_resolve(), cancel.clone());
        let (tx, rx) = watch::channel(initial);
        let handle = NetworkWatcher::new(state.clone(), arbiter, &cfg)
            .start(&mut Injected::new(rx), cancel.child_token())
            .expect("watcher running");
        Rig { state, tx, cancel, _handle: handle }
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn severity_first_classification() {
        let order = ClassificationOrder::SeverityFirst;
        assert_eq!(classify(&good(), order), NetworkStatus::Good);
        assert_eq!(classify(&info(Some("slow-2g"), None, None), order), NetworkStatus::VeryPoor);
        assert_eq!(classify(&info(Some("4g"), Some(0.4), None), order), NetworkStatus::VeryPoor);
        assert_eq!(classify(&info(Some("4g"), None, Some(2001)), order), NetworkStatus::VeryPoor);
        assert_eq!(classify(&info(Some("2g"), None, None), order), NetworkStatus::Poor);
        assert_eq!(classify(&info(Some("3g"), Some(0.9), None), order), NetworkStatus::Poor);
        assert_eq!(classify(&info(Some("3g"), Some(1.0), Some(1001)), order), NetworkStatus::Poor);
        // Boundaries are strict.
        assert_eq!(classify(&info(Some("3g"), Some(1.0), Some(1000)), order), NetworkStatus::Good);
        assert_eq!(classify(&info(Some("3g"), Some(0.5), Some(2000)), order), NetworkStatus::Poor);
        // Missing metadata never crosses a threshold.
        assert_eq!(classify(&ConnectionInfo::default(), order), NetworkStatus::Good);
    }

    #[test]
    fn legacy_order_never_reaches_very_poor() {
        let order = ClassificationOrder::LegacyPoorFirst;
        assert_eq!(classify(&very_poor(5000), order), NetworkStatus::Poor);
        assert_eq!(classify(&info(None, Some(0.1), None), order), NetworkStatus::Poor);
        assert_eq!(classify(&info(None, None, Some(9000)), order), NetworkStatus::Poor);
        assert_eq!(classify(&good(), order), NetworkStatus::Good);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_classification_waits_for_warmup() {
        let rig = rig(good(), MonitorConfig::default());

        sleep_ms(1_900).await;
        assert_eq!(rig.state.snapshot().network, NetworkStatus::Checking);

        sleep_ms(200).await;
        let snap = rig.state.snapshot();
        assert_eq!(snap.network, NetworkStatus::Good);
        assert_eq!(snap.network_checks, 1);
        assert!(snap.log_contains("Network quality: good"));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_changes_classifies_once_and_arms_one_escalation() {
        let rig = rig(very_poor(3000), MonitorConfig::default());

        // warmup check at t=2s arms escalation for t=32s
        sleep_ms(3_000).await;
        assert_eq!(rig.state.snapshot().network_checks, 1);

        rig.tx.send(very_poor(3100)).unwrap();
        sleep_ms(300).await;
        rig.tx.send(very_poor(3200)).unwrap();
        sleep_ms(300).await;
        rig.tx.send(very_poor(3300)).unwrap();
        sleep_ms(400).await;

        // t=4s: one throttled check for three notifications, escalation re-armed for t=33s
        let snap = rig.state.snapshot();
        assert_eq!(snap.network_checks, 2);
        assert!(snap.escalation_pending);

        // trailing check at t=8s re-arms for t=38s
        sleep_ms(4_500).await;
        assert_eq!(rig.state.snapshot().network_checks, 3);

        sleep_ms(25_000).await; // t=33.5s
        assert!(rig.state.snapshot().emergency.is_none());

        sleep_ms(5_000).await; // t=38.5s
        let snap = rig.state.snapshot();
        assert_eq!(snap.emergency_reason(), Some(EmergencyReason::NetworkFailure));
        assert!(!snap.escalation_pending);
        assert_eq!(snap.log.iter().filter(|e| e.message.starts_with("EMERGENCY")).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_cancels_pending_escalation() {
        let rig = rig(very_poor(3000), MonitorConfig::default());

        sleep_ms(10_000).await;
        assert!(rig.state.snapshot().escalation_pending);
        rig.tx.send(good()).unwrap();
        sleep_ms(100).await;

        let snap = rig.state.snapshot();
        assert_eq!(snap.network, NetworkStatus::Good);
        assert!(!snap.escalation_pending);
        assert!(snap.log_contains("escalation cancelled"));

        sleep_ms(40_000).await;
        assert!(rig.state.snapshot().emergency.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn uncancelled_timer_rechecks_tier_on_expiry() {
        let cfg = MonitorConfig { cancel_escalation_on_recovery: false, ..Default::default() };
        let rig = rig(very_poor(3000), cfg);

        sleep_ms(10_000).await;
        rig.tx.send(good()).unwrap();
        sleep_ms(100).await;
        assert!(rig.state.snapshot().escalation_pending);

        // timer fires at t=32s but the tier is no longer very-poor
        sleep_ms(25_000).await;
        let snap = rig.state.snapshot();
        assert!(!snap.escalation_pending);
        assert!(snap.emergency.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_order_never_escalates() {
        let cfg = MonitorConfig { classification_order: ClassificationOrder::LegacyPoorFirst, ..Default::default() };
        let rig = rig(very_poor(5000), cfg);

        sleep_ms(60_000).await;
        let snap = rig.state.snapshot();
        assert_eq!(snap.network, NetworkStatus::Poor);
        assert!(snap.emergency.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_stops_classification() {
        let rig = rig(good(), MonitorConfig::default());
        sleep_ms(3_000).await;
        rig.cancel.cancel();
        sleep_ms(10).await;

        let _ = rig.tx.send(very_poor(3000));
        sleep_ms(60_000).await;
        let snap = rig.state.snapshot();
        assert_eq!(snap.network, NetworkStatus::Good);
        assert_eq!(snap.network_checks, 1);
    }

    #[tokio::test]
    async fn unsupported_is_reported_once() {
        let state = SharedState::new(20);
        let cancel = CancellationToken::new();
        let arbiter = EmergencyArbiter::new(state.clone(), Duration::from_secs(10), cancel.clone());
        let handle = NetworkWatcher::new(state.clone(), arbiter, &MonitorConfig::default())
            .start(&mut Unavailable, cancel);
        assert!(handle.is_none());
        let snap = state.snapshot();
        assert_eq!(snap.network, NetworkStatus::Unsupported);
        assert_eq!(snap.log.len(), 1);
    }
}
