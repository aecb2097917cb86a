pub mod connectivity;
pub mod heartbeat;
pub mod inactivity;
pub mod location;
pub mod network;

pub use connectivity::ConnectivityWatcher;
pub use heartbeat::HeartbeatWatcher;
pub use inactivity::InactivityWatcher;
pub use location::LocationWatcher;
pub use network::{classify, NetworkWatcher};
