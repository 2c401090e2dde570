use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::airport::Airport;

/// Flight lifecycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightPhase {
    /// Not flying
    GroundIdle,
    /// Departed, watching for touchdown
    Airborne,
    /// Landing report sent
    Landed,
    /// Crash report sent
    Crashed,
    /// Terminated by the teleport detector
    Voided,
}

impl FlightPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlightPhase::Landed | FlightPhase::Crashed | FlightPhase::Voided)
    }
}

impl fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlightPhase::GroundIdle => "GROUND_IDLE",
            FlightPhase::Airborne => "AIRBORNE",
            FlightPhase::Landed => "LANDED",
            FlightPhase::Crashed => "CRASHED",
            FlightPhase::Voided => "VOIDED",
        };
        write!(f, "{}", name)
    }
}

/// One retained point of the flight path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathSample {
    pub lat: f64,
    pub lon: f64,
    pub alt_ft: f64,
    /// Seconds since the Unix epoch
    pub time: f64,
}

/// Minimal persisted state needed to resume a flight after a reload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub flight_started: bool,
    pub start_time: f64,
    pub departure_icao: String,
    #[serde(default)]
    pub departure_airport: Option<Airport>,
    pub callsign: String,
    pub aircraft: String,
    #[serde(default)]
    pub first_ground_contact: bool,
    #[serde(default)]
    pub path: Vec<PathSample>,
    #[serde(default)]
    pub teleport_warnings: u32,
    #[serde(default)]
    pub path_continuity_broken: bool,
    /// When the snapshot was written
    pub saved_at: f64,
}

/// The single active flight
#[derive(Debug, Clone)]
pub struct FlightSession {
    pub phase: FlightPhase,
    pub start_time: f64,
    pub departure_icao: String,
    pub departure_airport: Option<Airport>,
    pub arrival_icao: Option<String>,
    pub arrival_airport: Option<Airport>,
    pub callsign: String,
    pub aircraft: String,
    pub first_ground_contact: bool,
    pub teleport_warnings: u32,
    pub terminated: bool,
    pub path_continuity_broken: bool,
    path: VecDeque<PathSample>,
    path_limit: usize,
    recorded: u64,
}

impl FlightSession {
    /// New airborne session departing at `start_time`
    pub fn new(
        start_time: f64,
        departure_icao: String,
        departure_airport: Option<Airport>,
        callsign: String,
        aircraft: String,
        path_limit: usize,
    ) -> Self {
        Self {
            phase: FlightPhase::Airborne,
            start_time,
            departure_icao,
            departure_airport,
            arrival_icao: None,
            arrival_airport: None,
            callsign,
            aircraft,
            first_ground_contact: false,
            teleport_warnings: 0,
            terminated: false,
            path_continuity_broken: false,
            path: VecDeque::with_capacity(path_limit),
            path_limit: path_limit.max(1),
            recorded: 0,
        }
    }

    /// Rebuild a session from a persisted snapshot
    pub fn from_snapshot(snapshot: &SessionSnapshot, path_limit: usize) -> Self {
        let mut session = Self::new(
            snapshot.start_time,
            snapshot.departure_icao.clone(),
            snapshot.departure_airport.clone(),
            snapshot.callsign.clone(),
            snapshot.aircraft.clone(),
            path_limit,
        );
        session.first_ground_contact = snapshot.first_ground_contact;
        session.teleport_warnings = snapshot.teleport_warnings;
        session.path_continuity_broken = snapshot.path_continuity_broken;
        for sample in &snapshot.path {
            session.push_path(*sample);
        }
        session.recorded = snapshot.path.len() as u64;
        session
    }

    pub fn to_snapshot(&self, saved_at: f64) -> SessionSnapshot {
        SessionSnapshot {
            flight_started: true,
            start_time: self.start_time,
            departure_icao: self.departure_icao.clone(),
            departure_airport: self.departure_airport.clone(),
            callsign: self.callsign.clone(),
            aircraft: self.aircraft.clone(),
            first_ground_contact: self.first_ground_contact,
            path: self.path.iter().copied().collect(),
            teleport_warnings: self.teleport_warnings,
            path_continuity_broken: self.path_continuity_broken,
            saved_at,
        }
    }

    /// Append a path point if the last one is at least `min_interval_secs` old.
    ///
    /// Returns true when the point was recorded.
    pub fn record_path(&mut self, sample: PathSample, min_interval_secs: f64) -> bool {
        if let Some(last) = self.path.back() {
            if sample.time - last.time <= min_interval_secs {
                return false;
            }
        }
        self.push_path(sample);
        self.recorded += 1;
        true
    }

    fn push_path(&mut self, sample: PathSample) {
        self.path.push_back(sample);
        while self.path.len() > self.path_limit {
            self.path.pop_front();
        }
    }

    pub fn path(&self) -> impl Iterator<Item = &PathSample> {
        self.path.iter()
    }

    pub fn path_len(&self) -> usize {
        self.path.len()
    }

    /// Points recorded this flight, including ones since evicted; a restored
    /// session counts from its stored path
    pub fn recorded_count(&self) -> u64 {
        self.recorded
    }

    pub fn last_path_sample(&self) -> Option<&PathSample> {
        self.path.back()
    }

    /// Seconds since departure
    pub fn elapsed(&self, now: f64) -> f64 {
        now - self.start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(time: f64) -> PathSample {
        PathSample {
            lat: 40.0 + time / 1000.0,
            lon: -73.0,
            alt_ft: 3_000.0,
            time,
        }
    }

    fn session(limit: usize) -> FlightSession {
        FlightSession::new(
            1_000.0,
            "KJFK".to_string(),
            Some(Airport::new("KJFK", 40.6413, -73.7781)),
            "123".to_string(),
            "Boeing 737-700".to_string(),
            limit,
        )
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(FlightPhase::GroundIdle.to_string(), "GROUND_IDLE");
        assert_eq!(FlightPhase::Voided.to_string(), "VOIDED");
        assert!(FlightPhase::Crashed.is_terminal());
        assert!(!FlightPhase::Airborne.is_terminal());
        assert_eq!(serde_json::to_string(&FlightPhase::GroundIdle).unwrap(), "\"GROUND_IDLE\"");
    }

    #[test]
    fn test_path_cadence() {
        let mut s = session(50);
        assert!(s.record_path(point(1_000.0), 5.0));
        assert!(!s.record_path(point(1_003.0), 5.0));
        assert!(!s.record_path(point(1_005.0), 5.0));
        assert!(s.record_path(point(1_005.5), 5.0));
        assert_eq!(s.path_len(), 2);
    }

    #[test]
    fn test_path_keeps_most_recent() {
        let mut s = session(3);
        for i in 0..10 {
            s.record_path(point(1_000.0 + i as f64 * 10.0), 5.0);
        }
        assert_eq!(s.path_len(), 3);
        assert_eq!(s.recorded_count(), 10);
        let times: Vec<f64> = s.path().map(|p| p.time).collect();
        assert_eq!(times, vec![1_070.0, 1_080.0, 1_090.0]);
        assert_eq!(s.last_path_sample().unwrap().time, 1_090.0);
    }

    #[test]
    fn test_snapshot_reload_is_idempotent() {
        let mut s = session(50);
        for i in 0..12 {
            s.record_path(point(1_000.0 + i as f64 * 6.0), 5.0);
        }
        s.teleport_warnings = 1;

        let saved = s.to_snapshot(2_000.0);
        let json = serde_json::to_string(&saved).unwrap();
        let loaded: SessionSnapshot = serde_json::from_str(&json).unwrap();

        let resaved = FlightSession::from_snapshot(&loaded, 50).to_snapshot(2_000.0);
        assert_eq!(resaved, saved);
        assert_eq!(resaved.path.len(), 12);
        assert_eq!(resaved.teleport_warnings, 1);
        assert_eq!(resaved.departure_airport.unwrap().icao, "KJFK");
    }

    #[test]
    fn test_snapshot_tolerates_missing_optional_fields() {
        let json = r#"{"flight_started": true, "start_time": 5.0, "departure_icao": "UNKNOWN",
                       "callsign": "Unknown", "aircraft": "", "saved_at": 6.0}"#;
        let snapshot: SessionSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.path.is_empty());
        assert!(snapshot.departure_airport.is_none());

        let s = FlightSession::from_snapshot(&snapshot, 50);
        assert_eq!(s.phase, FlightPhase::Airborne);
        assert_eq!(s.elapsed(65.0), 60.0);
    }
}
