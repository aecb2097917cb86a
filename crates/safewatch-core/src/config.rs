use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(45);
pub const ACTIVITY_THROTTLE: Duration = Duration::from_secs(1);
pub const NETWORK_WARMUP: Duration = Duration::from_secs(2);
pub const NETWORK_THROTTLE: Duration = Duration::from_secs(5);
pub const NETWORK_ESCALATION: Duration = Duration::from_secs(30);
pub const EMERGENCY_RESOLVE: Duration = Duration::from_secs(10);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const LOCATION_MAX_AGE: Duration = Duration::from_secs(30);
pub const LOCATION_TIMEOUT: Duration = Duration::from_secs(10);
/// ~11m at the equator.
pub const LOCATION_EPSILON_DEG: f64 = 0.0001;
pub const LOG_CAPACITY: usize = 20;

/// Network tier thresholds.
pub const VERY_POOR_DOWNLINK_MBPS: f64 = 0.5;
pub const VERY_POOR_RTT_MS: u32 = 2000;
pub const POOR_DOWNLINK_MBPS: f64 = 1.0;
pub const POOR_RTT_MS: u32 = 1000;

/// Order in which network tiers are tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassificationOrder {
    /// very-poor is tested first, so the worst tier is reachable.
    #[default]
    SeverityFirst,
    /// poor is tested first. Any very-poor reading also satisfies poor,
    /// so this order never yields very-poor and never escalates.
    LegacyPoorFirst,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub inactivity_timeout_ms: u64,
    pub activity_throttle_ms: u64,
    pub network_warmup_ms: u64,
    pub network_throttle_ms: u64,
    pub network_escalation_ms: u64,
    pub emergency_resolve_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub location_max_age_ms: u64,
    pub location_timeout_ms: u64,
    pub location_epsilon_deg: f64,
    pub log_capacity: usize,

    pub classification_order: ClassificationOrder,

    /// Disarm the pending escalation as soon as the tier improves.
    /// When false the timer is left running and only re-checks the tier on expiry.
    pub cancel_escalation_on_recovery: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_ms: ms(INACTIVITY_TIMEOUT),
            activity_throttle_ms: ms(ACTIVITY_THROTTLE),
            network_warmup_ms: ms(NETWORK_WARMUP),
            network_throttle_ms: ms(NETWORK_THROTTLE),
            network_escalation_ms: ms(NETWORK_ESCALATION),
            emergency_resolve_ms: ms(EMERGENCY_RESOLVE),
            heartbeat_interval_ms: ms(HEARTBEAT_INTERVAL),
            location_max_age_ms: ms(LOCATION_MAX_AGE),
            location_timeout_ms: ms(LOCATION_TIMEOUT),
            location_epsilon_deg: LOCATION_EPSILON_DEG,
            log_capacity: LOG_CAPACITY,
            classification_order: ClassificationOrder::default(),
            cancel_escalation_on_recovery: true,
        }
    }
}

impl MonitorConfig {
    pub fn inactivity_timeout(&self) -> Duration { Duration::from_millis(self.inactivity_timeout_ms) }
    pub fn activity_throttle(&self) -> Duration { Duration::from_millis(self.activity_throttle_ms) }
    pub fn network_warmup(&self) -> Duration { Duration::from_millis(self.network_warmup_ms) }
    pub fn network_throttle(&self) -> Duration { Duration::from_millis(self.network_throttle_ms) }
    pub fn network_escalation(&self) -> Duration { Duration::from_millis(self.network_escalation_ms) }
    pub fn emergency_resolve(&self) -> Duration { Duration::from_millis(self.emergency_resolve_ms) }
    pub fn heartbeat_interval(&self) -> Duration { Duration::from_millis(self.heartbeat_interval_ms) }
    pub fn location_max_age(&self) -> Duration { Duration::from_millis(self.location_max_age_ms) }
    pub fn location_timeout(&self) -> Duration { Duration::from_millis(self.location_timeout_ms) }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("inactivity_timeout_ms", self.inactivity_timeout_ms),
            ("activity_throttle_ms", self.activity_throttle_ms),
            ("network_throttle_ms", self.network_throttle_ms),
            ("network_escalation_ms", self.network_escalation_ms),
            ("emergency_resolve_ms", self.emergency_resolve_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("location_timeout_ms", self.location_timeout_ms),
        ];
        for (field, value) in durations {
            if value == 0 {
                return Err(ConfigError::ZeroDuration(field));
            }
        }
        if !(self.location_epsilon_deg > 0.0 && self.location_epsilon_deg < 1.0) {
            return Err(ConfigError::Epsilon(self.location_epsilon_deg));
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::LogCapacity);
        }
        Ok(())
    }
}

fn ms(d: Duration) -> u64 {
    d.as_millis() as u64
}
