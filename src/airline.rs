//! Airline registry: which webhook a report goes to and which ICAO prefix
//! flight numbers carry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{FlightLoggerError, Result};
use crate::notifier::validate_webhook;

pub const DEFAULT_AIRLINE: &str = "Default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Airline {
    pub webhook: String,
    pub icao: String,
    pub iata: String,
}

impl Airline {
    pub fn new(icao: &str, iata: &str, webhook: &str) -> Result<Self> {
        let icao = icao.trim().to_uppercase();
        let iata = iata.trim().to_uppercase();
        if icao.is_empty() || iata.is_empty() {
            return Err(FlightLoggerError::InvalidParameters(
                "airline ICAO and IATA codes are required".to_string(),
            ));
        }
        validate_webhook(webhook)?;
        Ok(Self {
            webhook: webhook.trim().to_string(),
            icao,
            iata,
        })
    }

    pub fn has_webhook(&self) -> bool {
        validate_webhook(&self.webhook).is_ok()
    }
}

/// Entry as found on disk: current object form, or the older bare webhook string
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredAirline {
    Full {
        #[serde(default)]
        webhook: String,
        #[serde(default)]
        icao: Option<String>,
        #[serde(default)]
        iata: Option<String>,
    },
    Legacy(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRegistry {
    Current {
        airlines: BTreeMap<String, StoredAirline>,
        #[serde(default)]
        last_airline: Option<String>,
    },
    Bare(BTreeMap<String, StoredAirline>),
}

#[derive(Serialize)]
struct RegistryFile<'a> {
    airlines: &'a BTreeMap<String, Airline>,
    last_airline: &'a Option<String>,
}

fn upgrade(name: &str, stored: StoredAirline) -> Airline {
    match stored {
        StoredAirline::Legacy(webhook) => {
            let (icao, iata) = if name == DEFAULT_AIRLINE {
                ("GFS", "GF")
            } else {
                ("UNK", "UK")
            };
            Airline {
                webhook,
                icao: icao.to_string(),
                iata: iata.to_string(),
            }
        }
        StoredAirline::Full { webhook, icao, iata } => {
            let icao = icao
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "UNK".to_string());
            let iata = iata.filter(|c| !c.is_empty()).unwrap_or_else(|| {
                if icao.len() >= 2 {
                    icao.chars().take(2).collect()
                } else {
                    "UK".to_string()
                }
            });
            Airline { webhook, icao, iata }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AirlineRegistry {
    airlines: BTreeMap<String, Airline>,
    last_airline: Option<String>,
}

impl Default for AirlineRegistry {
    fn default() -> Self {
        let mut airlines = BTreeMap::new();
        airlines.insert(
            DEFAULT_AIRLINE.to_string(),
            Airline {
                webhook: String::new(),
                icao: "GFS".to_string(),
                iata: "GF".to_string(),
            },
        );
        Self {
            airlines,
            last_airline: None,
        }
    }
}

impl AirlineRegistry {
    /// Load from disk; a missing file yields the default registry
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_json(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No airline file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let (stored, last_airline) = match serde_json::from_str::<StoredRegistry>(raw)? {
            StoredRegistry::Current {
                airlines,
                last_airline,
            } => (airlines, last_airline),
            StoredRegistry::Bare(airlines) => {
                log::info!("Upgrading airline data format");
                (airlines, None)
            }
        };

        let airlines: BTreeMap<String, Airline> = stored
            .into_iter()
            .map(|(name, entry)| {
                let airline = upgrade(&name, entry);
                (name, airline)
            })
            .collect();

        if airlines.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self {
            airlines,
            last_airline,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&RegistryFile {
            airlines: &self.airlines,
            last_airline: &self.last_airline,
        })?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.airlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.airlines.is_empty()
    }

    pub fn list(&self) -> impl Iterator<Item = (&str, &Airline)> {
        self.airlines.iter().map(|(name, airline)| (name.as_str(), airline))
    }

    pub fn get(&self, name: &str) -> Result<&Airline> {
        self.airlines
            .get(name)
            .ok_or_else(|| FlightLoggerError::AirlineNotFound(name.to_string()))
    }

    pub fn add(&mut self, name: &str, airline: Airline) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FlightLoggerError::InvalidParameters(
                "airline name is required".to_string(),
            ));
        }
        log::info!("Added airline: {} ({}/{})", name, airline.icao, airline.iata);
        self.airlines.insert(name.to_string(), airline);
        Ok(())
    }

    /// Replace an airline's details, optionally renaming it
    pub fn edit(&mut self, name: &str, new_name: Option<&str>, airline: Airline) -> Result<()> {
        if !self.airlines.contains_key(name) {
            return Err(FlightLoggerError::AirlineNotFound(name.to_string()));
        }
        let target = new_name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or(name);
        if target != name {
            self.airlines.remove(name);
            if self.last_airline.as_deref() == Some(name) {
                self.last_airline = Some(target.to_string());
            }
        }
        log::info!("Updated airline: {} ({}/{})", target, airline.icao, airline.iata);
        self.airlines.insert(target.to_string(), airline);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Airline> {
        if !self.airlines.contains_key(name) {
            return Err(FlightLoggerError::AirlineNotFound(name.to_string()));
        }
        if self.airlines.len() <= 1 {
            return Err(FlightLoggerError::LastAirline);
        }
        if self.last_airline.as_deref() == Some(name) {
            self.last_airline = None;
        }
        log::info!("Removed airline: {}", name);
        self.airlines
            .remove(name)
            .ok_or_else(|| FlightLoggerError::AirlineNotFound(name.to_string()))
    }

    /// Remember `name` as the airline to use next time
    pub fn select(&mut self, name: &str) -> Result<&Airline> {
        if !self.airlines.contains_key(name) {
            return Err(FlightLoggerError::AirlineNotFound(name.to_string()));
        }
        self.last_airline = Some(name.to_string());
        self.get(name)
    }

    /// Last selected airline if it still exists, else the first one
    pub fn current(&self) -> Option<(&str, &Airline)> {
        self.last_airline
            .as_deref()
            .and_then(|name| self.airlines.get_key_value(name))
            .or_else(|| self.airlines.iter().next())
            .map(|(name, airline)| (name.as_str(), airline))
    }
}
