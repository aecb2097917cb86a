use anyhow::{Context, Result};
use std::net::ToSocketAddrs;

use crate::nmea::NmeaInput;
use crate::probe::ProbeConfig;

pub fn check_nmea_input(input: &NmeaInput) -> Result<()> {
    match input {
        NmeaInput::NmeaSerial { device, baud } => {
            anyhow::ensure!(!device.is_empty(), "location.device missing");
            anyhow::ensure!(*baud >= 4800, "location.baud too low: {}", baud);
        }
        NmeaInput::NmeaFile { path } => {
            anyhow::ensure!(path.is_file(), "location.path is not a file: {}", path.display());
        }
    }
    Ok(())
}

pub fn check_probe(cfg: &ProbeConfig) -> Result<()> {
    let mut addrs = cfg.endpoint.to_socket_addrs()
        .with_context(|| format!("network.endpoint not resolvable: {}", cfg.endpoint))?;
    anyhow::ensure!(addrs.next().is_some(), "network.endpoint resolves to nothing");
    anyhow::ensure!(cfg.interval_ms >= 100, "network.interval_ms should be >= 100");
    anyhow::ensure!(cfg.timeout_ms > 0 && cfg.timeout_ms <= 30_000, "network.timeout_ms should be 1..30000");
    Ok(())
}
