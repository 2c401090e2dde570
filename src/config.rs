use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{FlightLoggerError, Result};
use crate::teleport::TeleportConfig;

/// Tunables for the flight monitor and its scheduler.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// AGL that counts as departed (while off the ground)
    pub departure_agl_ft: f64,
    /// Ground contact earlier than this after departure is ignored
    pub landing_debounce_secs: f64,
    /// Bounce edges are only tracked below this AGL
    pub bounce_agl_ft: f64,
    pub vs_glitch_fpm: f64,
    pub coarse_poll_ms: u64,
    pub fast_poll_ms: u64,
    pub path_sample_interval_secs: f64,
    pub path_history_len: usize,
    pub persist_every_samples: usize,
    pub airport_radius_km: f64,
    pub teleport: TeleportConfig,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            departure_agl_ft: 50.0,
            landing_debounce_secs: 1.0,
            bounce_agl_ft: 500.0,
            vs_glitch_fpm: crate::vertical_speed::DEFAULT_GLITCH_FPM,
            coarse_poll_ms: 1000,
            fast_poll_ms: 25,
            path_sample_interval_secs: 5.0,
            path_history_len: 50,
            persist_every_samples: 10,
            airport_radius_km: crate::airport::DEFAULT_RADIUS_KM,
            teleport: TeleportConfig::default(),
        }
    }
}

impl LoggerConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(FlightLoggerError::InvalidParameters(msg.to_string()));

        if self.coarse_poll_ms == 0 || self.fast_poll_ms == 0 {
            return invalid("poll intervals must be non-zero");
        }
        if self.fast_poll_ms > self.coarse_poll_ms {
            return invalid("fast poll must not be slower than the coarse poll");
        }
        if self.path_history_len == 0 || self.persist_every_samples == 0 {
            return invalid("path_history_len and persist_every_samples must be non-zero");
        }
        if self.airport_radius_km <= 0.0 || self.vs_glitch_fpm <= 0.0 {
            return invalid("airport_radius_km and vs_glitch_fpm must be positive");
        }
        let t = &self.teleport;
        if t.min_interval_secs >= t.max_interval_secs {
            return invalid("teleport.min_interval_secs must be below max_interval_secs");
        }
        if t.grace_secs < 0.0 || t.verify_window_secs < 0.0 || t.jump_threshold_m <= 0.0 {
            return invalid("teleport windows must be non-negative and jump_threshold_m positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teleport::DetectionPolicy;

    #[test]
    fn test_defaults_are_valid() {
        let config = LoggerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.teleport.policy, DetectionPolicy::Combined);
        assert_eq!(config.departure_agl_ft, 50.0);
    }

    #[test]
    fn test_partial_json() {
        let config: LoggerConfig =
            serde_json::from_str(r#"{"departure_agl_ft": 100, "teleport": {"policy": "delayed_verification"}}"#)
                .unwrap();
        assert_eq!(config.departure_agl_ft, 100.0);
        assert_eq!(config.teleport.policy, DetectionPolicy::DelayedVerification);
        assert_eq!(config.teleport.grace_secs, 5.0);
        assert_eq!(config.path_history_len, 50);
    }

    #[test]
    fn test_rejects_nonsense() {
        let mut config = LoggerConfig::default();
        config.fast_poll_ms = 5_000;
        assert!(config.validate().is_err());

        let mut config = LoggerConfig::default();
        config.teleport.min_interval_secs = 20.0;
        assert!(config.validate().is_err());
    }
}
