//! Airport reference data and nearest-airport lookup.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geodesy::distance_meters;

/// Default search radius for departure/arrival matching
pub const DEFAULT_RADIUS_KM: f64 = 30.0;

/// Immutable airport record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub icao: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
}

impl Airport {
    pub fn new(icao: &str, lat: f64, lon: f64) -> Self {
        Self {
            icao: icao.to_string(),
            lat,
            lon,
            timezone: None,
            name: String::new(),
            city: String::new(),
            country: String::new(),
        }
    }
}

/// Read-only nearest-airport capability consumed by the flight monitor
pub trait AirportDirectory {
    /// Closest airport within the directory's radius, or `None`.
    fn find_nearest(&self, lat: f64, lon: f64) -> Option<&Airport>;
}

/// Entry shape of the community `airports.json` dataset (keyed by ICAO)
#[derive(Deserialize)]
struct RawAirport {
    lat: f64,
    lon: f64,
    #[serde(default)]
    tz: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

/// Flat airport list scanned linearly on every query.
///
/// Lookups happen once at departure and once at arrival, so a full scan over
/// ~30k points is cheaper than maintaining a spatial index.
#[derive(Debug, Clone)]
pub struct AirportIndex {
    airports: Vec<Airport>,
    radius_m: f64,
}

impl AirportIndex {
    pub fn new(airports: Vec<Airport>) -> Self {
        Self {
            airports,
            radius_m: DEFAULT_RADIUS_KM * 1000.0,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_radius_km(mut self, radius_km: f64) -> Self {
        self.radius_m = radius_km * 1000.0;
        self
    }

    /// Load `airports.json` (`{"KJFK": {"lat": .., "lon": .., "tz": ..}, ..}`).
    ///
    /// Accepts plain or gzip-compressed (`.gz`) files.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let index = if path.extension().map(|e| e == "gz").unwrap_or(false) {
            Self::from_reader(BufReader::new(GzDecoder::new(file)))?
        } else {
            Self::from_reader(BufReader::new(file))?
        };
        log::info!("Loaded {} airports from {}", index.len(), path.display());
        Ok(index)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let raw: BTreeMap<String, RawAirport> = serde_json::from_reader(reader)?;
        let airports = raw
            .into_iter()
            .map(|(icao, entry)| Airport {
                icao,
                lat: entry.lat,
                lon: entry.lon,
                timezone: entry.tz.filter(|tz| !tz.is_empty()),
                name: entry.name.unwrap_or_default(),
                city: entry.city.unwrap_or_default(),
                country: entry.country.unwrap_or_default(),
            })
            .collect();
        Ok(Self::new(airports))
    }

    pub fn len(&self) -> usize {
        self.airports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.airports.is_empty()
    }

    /// Closest airport regardless of radius, with its distance in meters
    pub fn nearest_with_distance(&self, lat: f64, lon: f64) -> Option<(&Airport, f64)> {
        let mut best: Option<(&Airport, f64)> = None;
        for airport in &self.airports {
            let d = distance_meters(lat, lon, airport.lat, airport.lon);
            if best.map_or(true, |(_, min)| d < min) {
                best = Some((airport, d));
            }
        }
        best
    }
}

impl AirportDirectory for AirportIndex {
    fn find_nearest(&self, lat: f64, lon: f64) -> Option<&Airport> {
        let (airport, distance) = self.nearest_with_distance(lat, lon)?;
        if distance > self.radius_m {
            log::debug!(
                "Nearest airport {} is {:.1} km away, beyond {:.0} km radius",
                airport.icao,
                distance / 1000.0,
                self.radius_m / 1000.0
            );
            return None;
        }
        Some(airport)
    }
}
