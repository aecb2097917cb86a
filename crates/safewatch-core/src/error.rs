use thiserror::Error;

/// Failures a watcher can hit. None of them are fatal to the monitor.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The environment lacks the capability. The watcher is disabled for good.
    #[error("{0} capability unavailable")]
    CapabilityUnavailable(&'static str),
    /// A single reading failed. The watcher keeps going.
    #[error("{source_name} read failed: {detail}")]
    TransientReadFailure { source_name: &'static str, detail: String },
}

/// Position read failures, shaped after the usual geolocation error codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("timed out waiting for a fix")]
    Timeout,
}

impl From<PositionError> for WatchError {
    fn from(e: PositionError) -> Self {
        WatchError::TransientReadFailure { source_name: "position", detail: e.to_string() }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("location_epsilon_deg out of range: {0}")]
    Epsilon(f64),
    #[error("log_capacity must be at least 1")]
    LogCapacity,
}
