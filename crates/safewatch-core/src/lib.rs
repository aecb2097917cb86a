pub mod arbiter;
pub mod capability;
pub mod config;
pub mod error;
pub mod log;
pub mod monitor;
pub mod state;
pub mod throttle;
pub mod watch;

pub use arbiter::EmergencyArbiter;
pub use config::MonitorConfig;
pub use error::{PositionError, WatchError};
pub use monitor::{Monitor, Providers};
pub use state::{Emergency, SharedState, StatusSnapshot};
