use std::path::PathBuf;

use anyhow::{Context, Result};
use safewatch_core::capability::{PositionFeed, PositionOptions, PositionProvider};
use safewatch_core::error::{PositionError, WatchError};
use safewatch_proto::signal::{Location, PositionFix};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum NmeaInput {
    NmeaSerial { device: String, #[serde(default = "default_baud")] baud: u32 },
    /// Replays a capture; loops waiting at EOF like a live stream.
    NmeaFile { path: PathBuf },
}

fn default_baud() -> u32 {
    115200
}

enum LineSource {
    Serial(BufReader<SerialStream>),
    File(BufReader<File>),
}

/// Holds partial sentence bytes across cancelled reads.
struct LineReader {
    src: LineSource,
    buf: Vec<u8>,
}

impl LineReader {
    fn open(input: &NmeaInput) -> Result<Self> {
        let src = match input {
            NmeaInput::NmeaSerial { device, baud } => {
                let port = tokio_serial::new(device, *baud)
                    .open_native_async()
                    .with_context(|| format!("open serial {}", device))?;
                LineSource::Serial(BufReader::new(port))
            }
            NmeaInput::NmeaFile { path } => {
                let f = std::fs::File::open(path).with_context(|| format!("open nmea file {}", path.display()))?;
                LineSource::File(BufReader::new(File::from_std(f)))
            }
        };
        Ok(Self { src, buf: Vec::with_capacity(128) })
    }

    /// Next complete line, lossily decoded. Line noise never ends the stream.
    async fn next_line(&mut self) -> Result<String> {
        loop {
            match &mut self.src {
                LineSource::Serial(r) => {
                    let n = r.read_until(b'\n', &mut self.buf).await.context("read serial")?;
                    anyhow::ensure!(n > 0, "serial device closed");
                }
                LineSource::File(r) => {
                    r.read_until(b'\n', &mut self.buf).await.context("read nmea file")?;
                    if !self.buf.ends_with(b"\n") {
                        // EOF, possibly mid-sentence: wait for more
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                        continue;
                    }
                }
            }
            let line = String::from_utf8_lossy(&self.buf).into_owned();
            self.buf.clear();
            return Ok(line);
        }
    }

    async fn next_reading(&mut self, parser: &mut NmeaParser) -> Result<std::result::Result<PositionFix, PositionError>> {
        loop {
            let line = self.next_line().await?;
            if let Some(reading) = parser.feed(line.trim()) {
                return Ok(reading);
            }
        }
    }
}

/// Minimal NMEA parsing:
/// - GGA: satellites + hdop
/// - RMC: validity + lat/lon
pub struct NmeaParser {
    last_gga: Option<(u8, f32, Instant)>,
    max_age: std::time::Duration,
}

impl NmeaParser {
    pub fn new(max_age: std::time::Duration) -> Self {
        Self { last_gga: None, max_age }
    }

    pub fn feed(&mut self, s: &str) -> Option<std::result::Result<PositionFix, PositionError>> {
        if s.starts_with("$GNGGA") || s.starts_with("$GPGGA") {
            let parts: Vec<&str> = s.split(',').collect();
            if parts.len() > 9 {
                let sats: u8 = parts[7].parse().unwrap_or(0);
                let hdop: f32 = parts[8].parse().unwrap_or(99.9);
                self.last_gga = Some((sats, hdop, Instant::now()));
            }
            return None;
        }

        if s.starts_with("$GNRMC") || s.starts_with("$GPRMC") {
            let parts: Vec<&str> = s.split(',').collect();
            if parts.len() <= 6 {
                return None;
            }
            // parts[2]=A/V, parts[3]=lat ddmm.mmmm, parts[4]=N/S, parts[5]=lon dddmm.mmmm, parts[6]=E/W
            if parts[2] != "A" {
                return Some(Err(PositionError::PositionUnavailable("receiver has no fix".into())));
            }
            let (Some(lat), Some(lng)) = (parse_deg_min(parts[3], parts[4]), parse_deg_min(parts[5], parts[6])) else {
                return Some(Err(PositionError::PositionUnavailable("malformed RMC sentence".into())));
            };

            let (sats, hdop) = match self.last_gga {
                Some((sats, hdop, at)) if at.elapsed() <= self.max_age => (sats, hdop),
                Some((_, _, at)) => {
                    debug!("nmea: dropping fix, quality data {}s old", at.elapsed().as_secs());
                    return None;
                }
                None => (0, 99.9),
            };

            return Some(Ok(PositionFix {
                location: Location { lat, lng },
                sats,
                hdop,
                ts_unix_ms: (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
            }));
        }

        None
    }
}

fn parse_deg_min(v: &str, hemi: &str) -> Option<f64> {
    if v.is_empty() { return None; }
    // lat: ddmm.mmmm, lon: dddmm.mmmm
    let dot = v.find('.')?;
    let deg_len = if dot > 4 { 3 } else { 2 };
    let deg: f64 = v.get(..deg_len)?.parse().ok()?;
    let min: f64 = v.get(deg_len..)?.parse().ok()?;
    let mut out = deg + (min / 60.0);
    if hemi == "S" || hemi == "W" { out = -out; }
    Some(out)
}

/// Position capability backed by an NMEA stream.
pub struct NmeaPositions {
    input: NmeaInput,
}

impl NmeaPositions {
    pub fn new(input: NmeaInput) -> Self {
        Self { input }
    }
}

impl PositionProvider for NmeaPositions {
    fn watch_position(&mut self, opts: PositionOptions) -> std::result::Result<PositionFeed, WatchError> {
        let mut reader = LineReader::open(&self.input).map_err(|e| {
            warn!("nmea: {:#}", e);
            WatchError::CapabilityUnavailable("geolocation")
        })?;
        info!("nmea: watching {:?} (timeout {:?}, max age {:?})", self.input, opts.timeout, opts.maximum_age);

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut parser = NmeaParser::new(opts.maximum_age);
            loop {
                let next = tokio::select! {
                    _ = tx.closed() => break,
                    r = tokio::time::timeout(opts.timeout, reader.next_reading(&mut parser)) => r,
                };
                let item = match next {
                    Err(_elapsed) => Err(PositionError::Timeout),
                    Ok(Ok(reading)) => reading,
                    Ok(Err(e)) => {
                        warn!("nmea: source failed: {:#}", e);
                        let _ = tx.send(Err(PositionError::PositionUnavailable(format!("{:#}", e)))).await;
                        break;
                    }
                };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
            debug!("nmea: subscription ended");
        });
        Ok(rx)
    }
}
