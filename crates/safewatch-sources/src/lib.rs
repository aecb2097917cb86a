pub mod doctor;
pub mod nmea;
pub mod probe;

pub use nmea::{NmeaInput, NmeaPositions};
pub use probe::{ProbeConfig, TcpProbe};
