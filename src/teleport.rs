//! Teleportation (position discontinuity) detection with a two-strike policy.
//!
//! Two signatures are recognised:
//! - sustained impossible motion: distance *and* altitude change both exceed what the
//!   aircraft could cover in the elapsed time (slew / speed hacks)
//! - an instant large jump (location reset): judged only after a verification window,
//!   because reloads and respawns often snap back near the original spot
//!
//! The first confirmed anomaly is a warning; the second terminates the flight.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::geodesy::distance_meters;

/// Confirmed anomalies that void a flight
pub const STRIKES_TO_TERMINATE: u32 = 2;

const PATH_HISTORY_LEN: usize = 10;
const PATH_HISTORY_MIN: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub altitude_ft: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64, altitude_ft: f64) -> Self {
        Self { lat, lon, altitude_ft }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        distance_meters(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Which detection paths are armed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionPolicy {
    /// Flag when distance and altitude both exceed per-second limits
    ImmediateThreshold,
    /// Flag large jumps only after they persist through the verification window
    DelayedVerification,
    /// Large jumps go through verification, everything else through thresholds
    #[default]
    Combined,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleportConfig {
    pub policy: DetectionPolicy,
    /// Suppression after flight start or resume
    pub grace_secs: f64,
    /// Delay before the map-path collapse check arms itself
    pub path_check_delay_secs: f64,
    /// Samples closer together than this are noise
    pub min_interval_secs: f64,
    /// Samples further apart than this mean the tab stalled
    pub max_interval_secs: f64,
    pub max_speed_mps: f64,
    pub max_climb_fps: f64,
    pub jump_threshold_m: f64,
    pub verify_window_secs: f64,
}

impl Default for TeleportConfig {
    fn default() -> Self {
        Self {
            policy: DetectionPolicy::Combined,
            grace_secs: 5.0,
            path_check_delay_secs: 15.0,
            min_interval_secs: 1.0,
            max_interval_secs: 10.0,
            max_speed_mps: 600.0,
            max_climb_fps: 200.0,
            jump_threshold_m: 2_000.0,
            verify_window_secs: 10.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DetectorState {
    /// No active flight
    Idle,
    /// Suppressed until `until` after start/resume
    Grace { until: f64 },
    Active,
    /// A large jump is under delayed evaluation; `reference` is the last position
    /// before the jump, sampled at `reference_time`
    Verifying {
        started_at: f64,
        reference: Position,
        reference_time: f64,
    },
    /// Two strikes reached; absorbing until the next flight
    Terminated,
}

/// Outcome of feeding one position sample
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DetectorEvent {
    /// Idle or terminated; nothing evaluated
    Inactive,
    /// Grace period or verification window in progress
    Suppressed,
    /// Interval too short (noise) or too long (stall)
    Skipped,
    Clear,
    VerificationStarted { distance_m: f64 },
    /// Verification window expired with the aircraft back near the reference
    FalsePositive { distance_m: f64 },
    /// First confirmed anomaly; flight continues flagged
    Warning { count: u32 },
    /// Strike limit reached; flight is void
    Terminated { count: u32 },
}

/// Watches the simulator's map-path segment count for a collapse back to one segment,
/// which happens when the map trail is wiped by a location reset.
#[derive(Clone, Debug)]
struct PathContinuity {
    history: VecDeque<usize>,
    seen_multiple: bool,
    armed_at: f64,
    /// Collapses are ignored before this time (resume grace only)
    quiet_until: f64,
    broken: bool,
}

impl PathContinuity {
    fn new(armed_at: f64, quiet_until: f64) -> Self {
        Self {
            history: VecDeque::with_capacity(PATH_HISTORY_LEN),
            seen_multiple: false,
            armed_at,
            quiet_until,
            broken: false,
        }
    }

    fn observe(&mut self, segments: usize, now: f64, inactive: bool) -> bool {
        let suppressed = inactive || now < self.quiet_until;
        if segments >= 2 || now >= self.armed_at {
            self.seen_multiple = true;
        }

        self.history.push_back(segments);
        while self.history.len() > PATH_HISTORY_LEN {
            self.history.pop_front();
        }

        if self.history.len() < PATH_HISTORY_MIN || !self.seen_multiple || suppressed {
            return false;
        }

        let previous = self.history.len() - 1;
        let previous_avg =
            self.history.iter().take(previous).sum::<usize>() as f64 / previous as f64;

        if previous_avg >= 1.5 && segments == 1 && !self.broken {
            log::warn!(
                "Path clearing detected: {:.0} paths -> {} path",
                previous_avg,
                segments
            );
            self.broken = true;
            return true;
        }
        false
    }
}

#[derive(Clone, Debug)]
pub struct TeleportDetector {
    config: TeleportConfig,
    state: DetectorState,
    last_known: Option<Position>,
    last_sample_time: Option<f64>,
    warning_count: u32,
    path: PathContinuity,
}

impl TeleportDetector {
    pub fn new(config: TeleportConfig) -> Self {
        Self {
            config,
            state: DetectorState::Idle,
            last_known: None,
            last_sample_time: None,
            warning_count: 0,
            path: PathContinuity::new(f64::INFINITY, f64::INFINITY),
        }
    }

    /// Arm for a fresh flight departing at `position`
    pub fn start(&mut self, position: Position, now: f64) {
        self.warning_count = 0;
        self.enter_grace(Some((position, now)), now);
        // the map trail is fresh at departure; only the arming delay applies
        self.path = PathContinuity::new(now + self.config.path_check_delay_secs, f64::NEG_INFINITY);
    }

    /// Re-arm after a reload, carrying over earlier strikes.
    ///
    /// `last_known` is the last persisted path point and its time, if any.
    pub fn resume(&mut self, last_known: Option<(Position, f64)>, warning_count: u32, now: f64) {
        self.warning_count = warning_count;
        self.enter_grace(last_known, now);
        self.path = PathContinuity::new(
            now + self.config.path_check_delay_secs,
            now + self.config.grace_secs,
        );
    }

    fn enter_grace(&mut self, baseline: Option<(Position, f64)>, now: f64) {
        self.state = DetectorState::Grace {
            until: now + self.config.grace_secs,
        };
        self.last_known = baseline.map(|(p, _)| p);
        self.last_sample_time = baseline.map(|(_, t)| t);
    }

    /// Back to idle; used when the flight ends
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }

    pub fn is_terminated(&self) -> bool {
        self.state == DetectorState::Terminated
    }

    pub fn path_continuity_broken(&self) -> bool {
        self.path.broken
    }

    pub fn last_known(&self) -> Option<Position> {
        self.last_known
    }

    /// `(started_at, reference)` while a jump is being verified
    pub fn pending_verification(&self) -> Option<(f64, Position)> {
        match self.state {
            DetectorState::Verifying {
                started_at, reference, ..
            } => Some((started_at, reference)),
            _ => None,
        }
    }

    /// Feed the simulator's map-path segment count. Returns true when a collapse is first seen.
    pub fn observe_map_path(&mut self, segments: usize, now: f64) -> bool {
        let inactive = matches!(self.state, DetectorState::Idle | DetectorState::Terminated);
        self.path.observe(segments, now, inactive)
    }

    /// Evaluate one position sample taken at `now` (seconds).
    pub fn observe(&mut self, position: Position, now: f64) -> DetectorEvent {
        match self.state {
            DetectorState::Idle | DetectorState::Terminated => DetectorEvent::Inactive,
            DetectorState::Grace { until } => {
                if now < until {
                    self.rebaseline(position, now);
                    return DetectorEvent::Suppressed;
                }
                log::info!("Teleport grace period ended, detection active");
                self.state = DetectorState::Active;
                self.evaluate(position, now)
            }
            DetectorState::Active => self.evaluate(position, now),
            DetectorState::Verifying {
                started_at,
                reference,
                reference_time,
            } => {
                if now - started_at < self.config.verify_window_secs {
                    self.rebaseline(position, now);
                    return DetectorEvent::Suppressed;
                }

                let distance_m = reference.distance_to(&position);
                self.rebaseline(position, now);
                // the aircraft kept flying while we waited
                let allowed_m = self.reachable_m(now - reference_time);
                if distance_m > allowed_m {
                    log::warn!(
                        "Jump confirmed: still {:.1} km from pre-jump position",
                        distance_m / 1000.0
                    );
                    self.confirm()
                } else {
                    log::info!(
                        "Jump resolved as respawn near original spot ({:.0} m)",
                        distance_m
                    );
                    self.state = DetectorState::Active;
                    DetectorEvent::FalsePositive { distance_m }
                }
            }
        }
    }

    fn evaluate(&mut self, position: Position, now: f64) -> DetectorEvent {
        let (Some(last), Some(last_time)) = (self.last_known, self.last_sample_time) else {
            self.rebaseline(position, now);
            return DetectorEvent::Clear;
        };

        let elapsed = now - last_time;
        if elapsed < self.config.min_interval_secs || elapsed > self.config.max_interval_secs {
            self.rebaseline(position, now);
            return DetectorEvent::Skipped;
        }

        let distance_m = last.distance_to(&position);
        let altitude_change_ft = (position.altitude_ft - last.altitude_ft).abs();
        let policy = self.config.policy;

        if policy != DetectionPolicy::ImmediateThreshold && distance_m > self.reachable_m(elapsed) {
            log::warn!(
                "Position jump of {:.1} km in {:.1}s, verifying for {:.0}s",
                distance_m / 1000.0,
                elapsed,
                self.config.verify_window_secs
            );
            self.state = DetectorState::Verifying {
                started_at: now,
                reference: last,
                reference_time: last_time,
            };
            self.rebaseline(position, now);
            return DetectorEvent::VerificationStarted { distance_m };
        }

        self.rebaseline(position, now);

        if policy != DetectionPolicy::DelayedVerification {
            let max_distance = elapsed * self.config.max_speed_mps;
            let max_altitude = elapsed * self.config.max_climb_fps;
            // Both limits must break; fast steep climbs alone are legitimate
            if distance_m > max_distance && altitude_change_ft > max_altitude {
                log::warn!(
                    "Impossible motion: {:.0} m and {:.0} ft in {:.1}s",
                    distance_m,
                    altitude_change_ft,
                    elapsed
                );
                return self.confirm();
            }
        }

        DetectorEvent::Clear
    }

    fn confirm(&mut self) -> DetectorEvent {
        self.warning_count += 1;
        if self.warning_count >= STRIKES_TO_TERMINATE {
            log::error!(
                "Flight terminated after {} teleportation warnings",
                self.warning_count
            );
            self.state = DetectorState::Terminated;
            DetectorEvent::Terminated {
                count: self.warning_count,
            }
        } else {
            log::warn!(
                "Teleportation warning {}/{}",
                self.warning_count,
                STRIKES_TO_TERMINATE
            );
            self.state = DetectorState::Active;
            DetectorEvent::Warning {
                count: self.warning_count,
            }
        }
    }

    /// Distance a jump must exceed to count as one: the fixed threshold, or what
    /// the aircraft could legitimately cover in `elapsed` seconds if that is larger
    fn reachable_m(&self, elapsed: f64) -> f64 {
        self.config
            .jump_threshold_m
            .max(elapsed * self.config.max_speed_mps)
    }

    fn rebaseline(&mut self, position: Position, now: f64) {
        self.last_known = Some(position);
        self.last_sample_time = Some(now);
    }
}

impl Default for TeleportDetector {
    fn default() -> Self {
        Self::new(TeleportConfig::default())
    }
}
