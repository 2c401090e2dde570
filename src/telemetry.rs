use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;

use crate::error::Result;

pub const FEET_PER_METER: f64 = 3.2808399;

/// One simulator reading, produced externally each tick
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub lat: f64,
    pub lon: f64,
    pub altitude_ft: f64,
    /// Terrain-relative altitude from the map's terrain query
    pub agl_ft: f64,
    /// Ground elevation under the aircraft as reported by the flight model
    #[serde(default)]
    pub ground_elevation_ft: Option<f64>,
    /// Vertical coordinate of the lowest collision point (gear) in meters
    #[serde(default)]
    pub collision_offset_m: f64,
    pub ground_contact: bool,
    pub ground_speed_kt: f64,
    pub vertical_speed_fpm: f64,
    /// Vertical acceleration in m/s^2
    pub accel_z: f64,
    #[serde(default)]
    pub true_airspeed_kt: Option<f64>,
    /// Number of segments in the simulator's map path, when exposed
    #[serde(default)]
    pub map_path_segments: Option<usize>,
    #[serde(default)]
    pub paused: bool,
}

impl TelemetrySample {
    /// AGL measured at the gear rather than the model's reference point.
    ///
    /// `None` while paused or when the flight model has no ground elevation yet.
    pub fn calibrated_agl_ft(&self) -> Option<f64> {
        if self.paused {
            return None;
        }
        let ground = self.ground_elevation_ft.filter(|g| g.is_finite())?;
        let agl = self.altitude_ft - ground + self.collision_offset_m * FEET_PER_METER;
        agl.is_finite().then_some(agl)
    }

    /// AGL used for bounce tracking; prefers the gear-calibrated value
    pub fn best_agl_ft(&self) -> f64 {
        self.calibrated_agl_ft().unwrap_or(self.agl_ft)
    }
}

/// Non-blocking telemetry capability; `None` while the simulator is not ready
pub trait TelemetrySource {
    fn read(&mut self) -> Option<TelemetrySample>;

    /// True once no further samples can ever arrive
    fn is_closed(&self) -> bool {
        false
    }
}

/// Latest-value source fed by a bridge task
pub struct WatchSource {
    rx: watch::Receiver<Option<TelemetrySample>>,
}

impl WatchSource {
    pub fn new(rx: watch::Receiver<Option<TelemetrySample>>) -> Self {
        Self { rx }
    }

    /// Channel pair: the sender goes to [`bridge_lines`], the source to the runner
    pub fn channel() -> (watch::Sender<Option<TelemetrySample>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self::new(rx))
    }
}

impl TelemetrySource for WatchSource {
    fn read(&mut self) -> Option<TelemetrySample> {
        self.rx.borrow().clone()
    }

    fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }
}

/// Parse newline-delimited JSON samples and publish the latest one.
///
/// Malformed lines are skipped. Returns the number of samples published once
/// the reader hits EOF or every receiver is gone.
pub async fn bridge_lines<R>(reader: R, tx: watch::Sender<Option<TelemetrySample>>) -> u64
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sample_count = 0u64;
    let mut rejected = 0u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                log::info!("[telemetry] Input closed after {} samples", sample_count);
                break;
            }
            Err(e) => {
                log::error!("[telemetry] Read failed after {} samples: {}", sample_count, e);
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<TelemetrySample>(trimmed) {
            Ok(sample) => {
                if tx.send(Some(sample)).is_err() {
                    log::debug!("[telemetry] Receiver dropped after {} samples", sample_count);
                    break;
                }
                sample_count += 1;
                if sample_count % 1000 == 0 {
                    log::debug!("[telemetry] {} samples", sample_count);
                }
            }
            Err(e) => {
                rejected += 1;
                if rejected % 100 == 1 {
                    log::warn!("[telemetry] Skipping malformed sample ({} so far): {}", rejected, e);
                }
            }
        }
    }

    sample_count
}

/// Pre-recorded samples handed out one per read
pub struct ReplaySource {
    samples: VecDeque<TelemetrySample>,
}

impl ReplaySource {
    pub fn new(samples: Vec<TelemetrySample>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl TelemetrySource for ReplaySource {
    fn read(&mut self) -> Option<TelemetrySample> {
        self.samples.pop_front()
    }

    fn is_closed(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Load a recording: either a JSON array or JSON lines, optionally gzipped.
pub fn load_recording(path: &Path) -> Result<Vec<TelemetrySample>> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        parse_recording(BufReader::new(GzDecoder::new(file)))
    } else {
        parse_recording(BufReader::new(file))
    }
}

pub fn parse_recording<R: Read>(reader: R) -> Result<Vec<TelemetrySample>> {
    let mut reader = BufReader::new(reader);
    let mut text = String::new();
    reader.read_to_string(&mut text)?;

    if text.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(&text)?);
    }

    let mut samples = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        samples.push(serde_json::from_str(trimmed)?);
    }
    Ok(samples)
}

#[cfg(test)]
pub(crate) fn sample_at(timestamp: f64, lat: f64, lon: f64, agl_ft: f64, ground_contact: bool) -> TelemetrySample {
    TelemetrySample {
        timestamp,
        lat,
        lon,
        altitude_ft: agl_ft,
        agl_ft,
        ground_elevation_ft: Some(0.0),
        collision_offset_m: 0.0,
        ground_contact,
        ground_speed_kt: if ground_contact { 0.0 } else { 140.0 },
        vertical_speed_fpm: 0.0,
        accel_z: 9.80665,
        true_airspeed_kt: Some(150.0),
        map_path_segments: None,
        paused: false,
    }
}
