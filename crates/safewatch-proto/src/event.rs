use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmergencyReason {
    Inactivity,
    NetworkFailure,
    ManualTest,
}

impl EmergencyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyReason::Inactivity => "INACTIVITY",
            EmergencyReason::NetworkFailure => "NETWORK_FAILURE",
            EmergencyReason::ManualTest => "MANUAL_TEST",
        }
    }
}

impl std::fmt::Display for EmergencyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic sequence number, survives eviction.
    pub seq: u64,
    pub ts_unix_ms: i64,
    pub message: String,
}
