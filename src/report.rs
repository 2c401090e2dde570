//! Flight reports and the formatting rules that feed them.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::vertical_speed::VsSource;

pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Arrival label used when a touchdown is classified as a crash
pub const CRASH_ARRIVAL: &str = "Crash";
/// Arrival label on termination notices
pub const TELEPORT_ARRIVAL: &str = "TELEPORT";

/// Touchdown classification, ordered from gentlest to harshest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LandingQuality {
    SuperButter,
    Butter,
    Acceptable,
    Hard,
    Crash,
}

impl LandingQuality {
    /// Classify a touchdown vertical speed (fpm, negative = descending).
    ///
    /// Each band includes its lower bound.
    pub fn classify(vs_fpm: f64) -> Self {
        if vs_fpm >= -50.0 {
            LandingQuality::SuperButter
        } else if vs_fpm >= -200.0 {
            LandingQuality::Butter
        } else if vs_fpm >= -500.0 {
            LandingQuality::Acceptable
        } else if vs_fpm >= -1000.0 {
            LandingQuality::Hard
        } else {
            LandingQuality::Crash
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LandingQuality::SuperButter => "SUPER BUTTER",
            LandingQuality::Butter => "BUTTER",
            LandingQuality::Acceptable => "ACCEPTABLE",
            LandingQuality::Hard => "HARD",
            LandingQuality::Crash => "CRASH",
        }
    }
}

impl fmt::Display for LandingQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Touchdowns this hard, or any upward "landing" spike, are logged as crashes
pub fn is_crash_override(vs_fpm: f64) -> bool {
    vs_fpm <= -1000.0 || vs_fpm > 200.0
}

/// Elapsed seconds as `HH:MM`, rounded to the nearest minute
pub fn format_duration(seconds: f64) -> String {
    let minutes = (seconds.max(0.0) / 60.0).round() as u64;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

fn utc_datetime(timestamp: f64) -> Option<DateTime<Utc>> {
    let millis = (timestamp * 1000.0).round() as i64;
    Utc.timestamp_millis_opt(millis).single()
}

/// Epoch seconds as e.g. `19 Oct 2026 14:05 UTC`
pub fn format_utc(timestamp: f64) -> String {
    format_local(timestamp, None)
}

/// Epoch seconds in an airport's IANA zone, e.g. `19 Oct 2026 10:05 EDT`.
/// Unknown or missing zones fall back to UTC.
pub fn format_local(timestamp: f64, timezone: Option<&str>) -> String {
    let Some(utc) = utc_datetime(timestamp) else {
        return "N/A".to_string();
    };
    match timezone.and_then(|name| name.parse::<Tz>().ok()) {
        Some(tz) => utc.with_timezone(&tz).format("%d %b %Y %H:%M %Z").to_string(),
        None => utc.format("%d %b %Y %H:%M UTC").to_string(),
    }
}

/// Drop a leading `"(tag)"` from simulator aircraft names
pub fn clean_aircraft_name(name: &str) -> String {
    let trimmed = name.trim();
    if let Some(rest) = trimmed.strip_prefix('(') {
        if let Some(end) = rest.find(')') {
            return rest[end + 1..].trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Who is flying what, for whom
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightIdentity {
    pub callsign: String,
    pub pilot_name: String,
    pub aircraft: String,
    pub airline_icao: String,
}

impl Default for FlightIdentity {
    fn default() -> Self {
        Self {
            callsign: "Unknown".to_string(),
            pilot_name: "Unknown".to_string(),
            aircraft: "Unknown".to_string(),
            airline_icao: "GFS".to_string(),
        }
    }
}

impl FlightIdentity {
    /// Airline prefix plus callsign, unless the callsign already carries it
    pub fn flight_number(&self) -> String {
        flight_number(&self.airline_icao, &self.callsign)
    }
}

pub fn flight_number(airline_icao: &str, callsign: &str) -> String {
    let callsign = callsign.trim();
    let callsign = if callsign.is_empty() { "Unknown" } else { callsign };
    if callsign.to_uppercase().starts_with(&airline_icao.to_uppercase()) {
        callsign.to_string()
    } else {
        format!("{}{}", airline_icao, callsign)
    }
}

/// Completed-flight report handed to the notifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightReport {
    pub flight_number: String,
    pub pilot_name: String,
    pub aircraft: String,
    pub departure: String,
    pub arrival: String,
    pub departure_timezone: Option<String>,
    pub arrival_timezone: Option<String>,
    /// Epoch seconds
    pub takeoff_time: f64,
    pub landing_time: f64,
    pub duration: String,
    pub vertical_speed_fpm: f64,
    pub vs_source: VsSource,
    pub g_force: f64,
    pub true_airspeed_kt: Option<f64>,
    pub ground_speed_kt: f64,
    pub quality: LandingQuality,
    pub crashed: bool,
    pub bounces: u32,
    pub teleport_warnings: u32,
    pub path_continuity_broken: bool,
}

impl FlightReport {
    pub fn g_force_from_accel(accel_z: f64) -> f64 {
        accel_z / STANDARD_GRAVITY
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "{} {} -> {} in {}: {:.1} fpm ({:?}), {:.2} G, {}{}",
            self.flight_number,
            self.departure,
            self.arrival,
            self.duration,
            self.vertical_speed_fpm,
            self.vs_source,
            self.g_force,
            self.quality,
            if self.teleport_warnings > 0 {
                format!(", {} teleport warning(s)", self.teleport_warnings)
            } else {
                String::new()
            }
        )
    }
}

/// Reduced notice for flights voided by teleportation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationNotice {
    pub flight_number: String,
    pub pilot_name: String,
    pub aircraft: String,
    pub departure: String,
    pub arrival: String,
    pub takeoff_time: f64,
    pub terminated_at: f64,
    pub duration: String,
    pub teleport_warnings: u32,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_bands_include_lower_bound() {
        assert_eq!(LandingQuality::classify(0.0), LandingQuality::SuperButter);
        assert_eq!(LandingQuality::classify(-50.0), LandingQuality::SuperButter);
        assert_eq!(LandingQuality::classify(-50.1), LandingQuality::Butter);
        assert_eq!(LandingQuality::classify(-150.0), LandingQuality::Butter);
        assert_eq!(LandingQuality::classify(-200.0), LandingQuality::Butter);
        assert_eq!(LandingQuality::classify(-500.0), LandingQuality::Acceptable);
        assert_eq!(LandingQuality::classify(-1000.0), LandingQuality::Hard);
        assert_eq!(LandingQuality::classify(-1000.5), LandingQuality::Crash);
        assert_eq!(LandingQuality::classify(150.0), LandingQuality::SuperButter);
    }

    #[test]
    fn test_quality_is_monotonic() {
        let mut previous = LandingQuality::classify(0.0);
        let mut vs = 0.0;
        while vs > -3000.0 {
            vs -= 0.5;
            let quality = LandingQuality::classify(vs);
            assert!(quality >= previous, "{} fpm classified gentler than a softer touchdown", vs);
            previous = quality;
        }
        assert_eq!(previous, LandingQuality::Crash);
    }

    #[test]
    fn test_crash_override() {
        assert!(is_crash_override(-1000.0));
        assert!(is_crash_override(-4000.0));
        assert!(is_crash_override(200.5));
        assert!(!is_crash_override(200.0));
        assert!(!is_crash_override(-999.9));
        assert!(!is_crash_override(-150.0));
    }

    #[test]
    fn test_labels() {
        assert_eq!(LandingQuality::SuperButter.to_string(), "SUPER BUTTER");
        assert_eq!(LandingQuality::Butter.to_string(), "BUTTER");
        assert_eq!(serde_json::to_string(&LandingQuality::SuperButter).unwrap(), "\"SUPER_BUTTER\"");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(40.0 * 60.0), "00:40");
        assert_eq!(format_duration(29.0), "00:00");
        assert_eq!(format_duration(30.0), "00:01");
        assert_eq!(format_duration(2.0 * 3600.0 + 5.0 * 60.0 + 10.0), "02:05");
        assert_eq!(format_duration(-5.0), "00:00");
    }

    #[test]
    fn test_format_utc() {
        assert_eq!(format_utc(0.0), "01 Jan 1970 00:00 UTC");
        assert_eq!(format_utc(1_700_000_000.0), "14 Nov 2023 22:13 UTC");
    }

    #[test]
    fn test_format_local() {
        // Winter and summer in New York
        assert_eq!(
            format_local(1_700_000_000.0, Some("America/New_York")),
            "14 Nov 2023 17:13 EST"
        );
        assert_eq!(
            format_local(1_690_000_000.0, Some("America/New_York")),
            "22 Jul 2023 00:26 EDT"
        );
        assert_eq!(format_local(1_700_000_000.0, Some("Not/AZone")), "14 Nov 2023 22:13 UTC");
        assert_eq!(format_local(1_700_000_000.0, None), "14 Nov 2023 22:13 UTC");
    }

    #[test]
    fn test_flight_number() {
        assert_eq!(flight_number("GFS", "123"), "GFS123");
        assert_eq!(flight_number("GFS", "gfs123"), "gfs123");
        assert_eq!(flight_number("BAW", "  "), "BAWUnknown");
    }

    #[test]
    fn test_clean_aircraft_name() {
        assert_eq!(clean_aircraft_name("(GeoFS) Boeing 737-700"), "Boeing 737-700");
        assert_eq!(clean_aircraft_name("Cessna 172"), "Cessna 172");
        assert_eq!(clean_aircraft_name("(GeoFS)Boeing 737"), "Boeing 737");
        assert_eq!(clean_aircraft_name("(unclosed tag"), "(unclosed tag");
    }

    #[test]
    fn test_g_force() {
        assert_eq!(FlightReport::g_force_from_accel(STANDARD_GRAVITY), 1.0);
    }
}
