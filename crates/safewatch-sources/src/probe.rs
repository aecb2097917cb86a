use std::time::Duration;

use safewatch_core::capability::{ConnectionFeed, ConnectionProvider, OnlineFeed, OnlineProvider};
use safewatch_core::error::WatchError;
use safewatch_proto::signal::ConnectionInfo;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// host:port
    pub endpoint: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    5_000
}

fn default_timeout_ms() -> u64 {
    3_000
}

/// RTT is reported in 25ms steps so jitter alone does not count as a change.
const RTT_GRANULARITY_MS: u32 = 25;

/// Effective-type tag for a measured RTT.
/// - slow-2g: >= 2000ms
/// - 2g: >= 1400ms
/// - 3g: >= 270ms
/// - 4g: otherwise
pub fn effective_type_for_rtt(rtt_ms: u32) -> &'static str {
    match rtt_ms {
        2000..=u32::MAX => "slow-2g",
        1400..=1999 => "2g",
        270..=1399 => "3g",
        _ => "4g",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSample {
    pub info: ConnectionInfo,
    pub online: bool,
}

pub async fn probe_once(endpoint: &str, timeout: Duration) -> ProbeSample {
    let start = Instant::now();
    let failure = match tokio::time::timeout(timeout, TcpStream::connect(endpoint)).await {
        Ok(Ok(_stream)) => {
            let raw = start.elapsed().as_millis() as u32;
            let rtt = (raw + RTT_GRANULARITY_MS / 2) / RTT_GRANULARITY_MS * RTT_GRANULARITY_MS;
            return ProbeSample {
                info: ConnectionInfo {
                    effective_type: Some(effective_type_for_rtt(rtt).to_string()),
                    downlink_mbps: None,
                    rtt_ms: Some(rtt),
                },
                online: true,
            };
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("no answer within {}ms", timeout.as_millis()),
    };
    debug!("probe {} failed: {}", endpoint, failure);
    ProbeSample {
        info: ConnectionInfo { effective_type: Some("slow-2g".into()), downlink_mbps: None, rtt_ms: None },
        online: false,
    }
}

/// Provides both connection metadata and the online flag from one probe loop.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    connection: ConnectionFeed,
    online: OnlineFeed,
}

impl TcpProbe {
    /// Must be called from within a tokio runtime. The probe loop ends once
    /// every feed handed out has been dropped.
    pub fn spawn(cfg: ProbeConfig) -> Self {
        let (info_tx, info_rx) = watch::channel(ConnectionInfo::default());
        let (online_tx, online_rx) = watch::channel(true);
        let interval = Duration::from_millis(cfg.interval_ms.max(100));
        let timeout = Duration::from_millis(cfg.timeout_ms.max(1));

        info!("probe: {} every {:?}", cfg.endpoint, interval);
        tokio::spawn(async move {
            loop {
                let sample = probe_once(&cfg.endpoint, timeout).await;
                info_tx.send_if_modified(|cur| {
                    if *cur == sample.info { return false; }
                    *cur = sample.info.clone();
                    true
                });
                online_tx.send_if_modified(|cur| {
                    if *cur == sample.online { return false; }
                    if !sample.online {
                        warn!("probe: {} unreachable", cfg.endpoint);
                    }
                    *cur = sample.online;
                    true
                });

                tokio::select! {
                    _ = async { tokio::join!(info_tx.closed(), online_tx.closed()) } => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!("probe: stopped");
        });

        Self { connection: info_rx, online: online_rx }
    }
}

impl ConnectionProvider for TcpProbe {
    fn connection(&mut self) -> Result<ConnectionFeed, WatchError> {
        Ok(self.connection.clone())
    }
}

impl OnlineProvider for TcpProbe {
    fn online(&mut self) -> Result<OnlineFeed, WatchError> {
        Ok(self.online.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn rtt_to_effective_type() {
        assert_eq!(effective_type_for_rtt(50), "4g");
        assert_eq!(effective_type_for_rtt(270), "3g");
        assert_eq!(effective_type_for_rtt(1400), "2g");
        assert_eq!(effective_type_for_rtt(1999), "2g");
        assert_eq!(effective_type_for_rtt(2000), "slow-2g");
    }

    #[tokio::test]
    async fn reachable_endpoint_is_online_with_rtt() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let sample = probe_once(&addr, Duration::from_secs(2)).await;
        assert!(sample.online);
        assert_eq!(sample.info.effective_type.as_deref(), Some("4g"));
        assert!(sample.info.rtt_ms.is_some());
    }

    #[tokio::test]
    async fn refused_endpoint_is_offline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let sample = probe_once(&addr, Duration::from_secs(2)).await;
        assert!(!sample.online);
        assert_eq!(sample.info.rtt_ms, None);
        assert_eq!(sample.info.effective_type.as_deref(), Some("slow-2g"));
    }

    #[tokio::test]
    async fn spawned_probe_publishes_to_feeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut probe = TcpProbe::spawn(ProbeConfig { endpoint: addr, interval_ms: 100, timeout_ms: 1_000 });
        let mut conn = probe.connection().unwrap();
        let online = probe.online().unwrap();

        tokio::time::timeout(Duration::from_secs(2), conn.changed()).await.unwrap().unwrap();
        assert!(conn.borrow().rtt_ms.is_some());
        assert!(*online.borrow());
    }
}
