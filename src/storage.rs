//! Session persistence.
//!
//! Only the snapshot shape matters to the monitor; backends are interchangeable.
//! A snapshot that fails to parse is reported as "nothing to resume".

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::session::SessionSnapshot;

pub trait SessionStore {
    fn save(&mut self, snapshot: &SessionSnapshot) -> Result<()>;
    /// Last saved snapshot, or `None` when absent or unreadable
    fn load(&self) -> Option<SessionSnapshot>;
    fn clear(&mut self) -> Result<()>;
}

fn parse_snapshot(raw: &str, origin: &str) -> Option<SessionSnapshot> {
    match serde_json::from_str(raw) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            log::warn!("Ignoring corrupt session snapshot in {}: {}", origin, e);
            None
        }
    }
}

/// Snapshot kept as a pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for JsonFileStore {
    fn save(&mut self, snapshot: &SessionSnapshot) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        // Write-then-rename so a crash mid-write never leaves half a snapshot
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        log::debug!(
            "Session saved to {} ({} path points)",
            self.path.display(),
            snapshot.path.len()
        );
        Ok(())
    }

    fn load(&self) -> Option<SessionSnapshot> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Cannot read session file {}: {}", self.path.display(), e);
                return None;
            }
        };
        parse_snapshot(&raw, &self.path.display().to_string())
    }

    fn clear(&mut self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("Session cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store holding the serialized snapshot text
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    raw: Option<String>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with arbitrary text, e.g. a corrupt record
    pub fn with_raw<S: Into<String>>(raw: S) -> Self {
        Self {
            raw: Some(raw.into()),
            saves: 0,
        }
    }

    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Number of successful saves since creation
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl SessionStore for MemoryStore {
    fn save(&mut self, snapshot: &SessionSnapshot) -> Result<()> {
        self.raw = Some(serde_json::to_string(snapshot)?);
        self.saves += 1;
        Ok(())
    }

    fn load(&self) -> Option<SessionSnapshot> {
        self.raw.as_deref().and_then(|raw| parse_snapshot(raw, "memory"))
    }

    fn clear(&mut self) -> Result<()> {
        self.raw = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PathSample;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            flight_started: true,
            start_time: 1_700_000_000.0,
            departure_icao: "EGLL".to_string(),
            departure_airport: None,
            callsign: "42".to_string(),
            aircraft: "Airbus A320".to_string(),
            first_ground_contact: false,
            path: vec![PathSample {
                lat: 51.47,
                lon: -0.4543,
                alt_ft: 1_200.0,
                time: 1_700_000_010.0,
            }],
            teleport_warnings: 1,
            path_continuity_broken: false,
            saved_at: 1_700_000_011.0,
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "flight_logger_{}_{}.json",
            name,
            std::process::id()
        ))
    }

    #[test]
    fn test_memory_store_roundtrip_and_clear() {
        let mut store = MemoryStore::new();
        assert!(store.load().is_none());

        store.save(&snapshot()).unwrap();
        assert_eq!(store.load(), Some(snapshot()));
        assert_eq!(store.save_count(), 1);

        store.clear().unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_corrupt_snapshot_is_no_session() {
        let store = MemoryStore::with_raw("{\"flight_started\": tru");
        assert!(store.load().is_none());

        let store = MemoryStore::with_raw("{\"unexpected\": 1}");
        assert!(store.load().is_none());
    }

    #[test]
    fn test_file_store() {
        let path = temp_path("file_store");
        let mut store = JsonFileStore::new(&path);
        store.clear().unwrap();
        assert!(store.load().is_none());

        store.save(&snapshot()).unwrap();
        assert_eq!(store.load(), Some(snapshot()));

        store.clear().unwrap();
        assert!(!path.exists());
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let path = temp_path("file_store_corrupt");
        std::fs::write(&path, "not a snapshot").unwrap();
        let mut store = JsonFileStore::new(&path);
        assert!(store.load().is_none());
        store.clear().unwrap();
    }
}
