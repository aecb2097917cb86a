use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    /// True when either axis moved by more than `epsilon_deg`.
    pub fn differs_from(&self, other: &Location, epsilon_deg: f64) -> bool {
        (self.lat - other.lat).abs() > epsilon_deg || (self.lng - other.lng).abs() > epsilon_deg
    }
}

/// One reading from a position source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub location: Location,
    pub sats: u8,
    pub hdop: f32,
    pub ts_unix_ms: i64,
}

/// Instantaneous connection metadata. Missing values never cross a threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub effective_type: Option<String>,
    pub downlink_mbps: Option<f64>,
    pub rtt_ms: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkStatus {
    Checking,
    Unsupported,
    Good,
    Poor,
    VeryPoor,
}

impl NetworkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkStatus::Checking => "checking",
            NetworkStatus::Unsupported => "unsupported",
            NetworkStatus::Good => "good",
            NetworkStatus::Poor => "poor",
            NetworkStatus::VeryPoor => "very-poor",
        }
    }
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User interaction classes that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 4] = [
        ActivityKind::PointerMove,
        ActivityKind::KeyPress,
        ActivityKind::Scroll,
        ActivityKind::TouchStart,
    ];
}
