//! Flight state machine.
//!
//! `FlightMonitor` turns telemetry samples into phase transitions. It never performs
//! I/O itself: each tick returns the [`Effect`]s the caller should carry out
//! (persist, notify, reset, stop), which keeps the transition logic testable
//! without timers or a network.

use std::sync::Arc;

use crate::airport::{Airport, AirportDirectory};
use crate::config::LoggerConfig;
use crate::prompt::{resolve_icao, UserPrompt};
use crate::report::{
    clean_aircraft_name, flight_number, format_duration, is_crash_override, FlightIdentity, FlightReport,
    LandingQuality, TerminationNotice, CRASH_ARRIVAL, TELEPORT_ARRIVAL,
};
use crate::session::{FlightPhase, FlightSession, PathSample, SessionSnapshot};
use crate::telemetry::TelemetrySample;
use crate::teleport::{DetectorEvent, Position, TeleportDetector};
use crate::vertical_speed::VerticalSpeedEstimator;

pub const TERMINATION_REASON: &str = "Multiple teleportations detected";

/// Instruction produced by a tick, applied by the scheduler in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Persist(SessionSnapshot),
    ClearSession,
    NotifyReport(FlightReport),
    NotifyTermination(TerminationNotice),
    Departed { icao: String },
    /// First strike; the flight continues
    TeleportWarning { count: u32 },
    /// Return the monitor to `GROUND_IDLE`
    ResetUi,
    StopPolling,
}

pub struct FlightMonitor {
    config: LoggerConfig,
    airports: Arc<dyn AirportDirectory + Send + Sync>,
    prompt: Box<dyn UserPrompt + Send>,
    identity: FlightIdentity,
    detector: TeleportDetector,
    estimator: VerticalSpeedEstimator,
    session: Option<FlightSession>,
    is_grounded: bool,
    bounces: u32,
    last_report: Option<FlightReport>,
}

impl FlightMonitor {
    pub fn new(
        config: LoggerConfig,
        airports: Arc<dyn AirportDirectory + Send + Sync>,
        prompt: Box<dyn UserPrompt + Send>,
        identity: FlightIdentity,
    ) -> Self {
        Self {
            detector: TeleportDetector::new(config.teleport.clone()),
            estimator: VerticalSpeedEstimator::new(config.vs_glitch_fpm),
            config,
            airports,
            prompt,
            identity,
            session: None,
            is_grounded: true,
            bounces: 0,
            last_report: None,
        }
    }

    pub fn phase(&self) -> FlightPhase {
        self.session
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or(FlightPhase::GroundIdle)
    }

    pub fn session(&self) -> Option<&FlightSession> {
        self.session.as_ref()
    }

    pub fn detector(&self) -> &TeleportDetector {
        &self.detector
    }

    pub fn estimator(&self) -> &VerticalSpeedEstimator {
        &self.estimator
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn bounces(&self) -> u32 {
        self.bounces
    }

    /// Most recent landing report, kept across resets
    pub fn last_report(&self) -> Option<&FlightReport> {
        self.last_report.as_ref()
    }

    pub fn identity(&self) -> &FlightIdentity {
        &self.identity
    }

    /// Fine-grained tick: feed the vertical speed estimator
    pub fn fast_tick(&mut self, sample: &TelemetrySample) {
        self.estimator
            .update(sample.calibrated_agl_ft(), sample.timestamp);
    }

    /// Coarse tick: path tracking, teleport checks and phase transitions
    pub fn tick(&mut self, sample: &TelemetrySample) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.phase().is_terminal() {
            return effects;
        }
        let now = sample.timestamp;

        if self.phase() == FlightPhase::Airborne {
            self.track(sample, &mut effects);
            if self.phase() == FlightPhase::Voided {
                return effects;
            }
        }

        let just_landed = if sample.best_agl_ft() < self.config.bounce_agl_ft {
            let edge = sample.ground_contact && !self.is_grounded;
            self.is_grounded = sample.ground_contact;
            edge
        } else {
            false
        };

        if self.session.is_none()
            && !sample.ground_contact
            && sample.agl_ft > self.config.departure_agl_ft
        {
            self.depart(sample, &mut effects);
        }

        let awaiting_touchdown = self
            .session
            .as_ref()
            .map(|s| s.phase == FlightPhase::Airborne && !s.first_ground_contact)
            .unwrap_or(false);

        if awaiting_touchdown && sample.ground_contact {
            let elapsed = self
                .session
                .as_ref()
                .map(|s| s.elapsed(now))
                .unwrap_or_default();
            if elapsed < self.config.landing_debounce_secs {
                return effects;
            }
            if just_landed {
                self.bounces += 1;
            }
            self.land(sample, &mut effects);
        }

        effects
    }

    /// Restore an in-progress flight after a reload.
    ///
    /// A snapshot that cannot be continued yields `ClearSession`.
    pub fn resume(&mut self, snapshot: &SessionSnapshot, now: f64) -> Vec<Effect> {
        if !snapshot.flight_started || snapshot.first_ground_contact {
            log::info!("Stored session is not resumable, discarding it");
            return vec![Effect::ClearSession];
        }
        if let Some(active) = &self.session {
            log::warn!(
                "Replacing active flight from {} with stored session",
                active.departure_icao
            );
        }

        let session = FlightSession::from_snapshot(snapshot, self.config.path_history_len);
        let baseline = session
            .last_path_sample()
            .map(|p| (Position::new(p.lat, p.lon, p.alt_ft), p.time));
        self.detector
            .resume(baseline, snapshot.teleport_warnings, now);
        self.is_grounded = false;

        log::info!(
            "Resuming flight from {} ({} path points, {} teleport warnings, {} elapsed)",
            session.departure_icao,
            session.path_len(),
            session.teleport_warnings,
            format_duration(session.elapsed(now))
        );

        let persist = session.to_snapshot(now);
        self.session = Some(session);
        vec![Effect::Persist(persist)]
    }

    /// Back to `GROUND_IDLE`, ready for the next departure
    pub fn reset(&mut self) {
        self.session = None;
        self.detector.reset();
        self.estimator.reset();
        self.is_grounded = true;
        self.bounces = 0;
    }

    fn track(&mut self, sample: &TelemetrySample, effects: &mut Vec<Effect>) {
        let now = sample.timestamp;
        let position = Position::new(sample.lat, sample.lon, sample.altitude_ft);

        let path_broken = sample
            .map_path_segments
            .map(|segments| self.detector.observe_map_path(segments, now))
            .unwrap_or(false);
        let event = self.detector.observe(position, now);

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if path_broken {
            session.path_continuity_broken = true;
        }

        match event {
            DetectorEvent::Warning { count } => {
                session.teleport_warnings = count;
                effects.push(Effect::TeleportWarning { count });
                effects.push(Effect::Persist(session.to_snapshot(now)));
            }
            DetectorEvent::Terminated { count } => {
                session.teleport_warnings = count;
                self.void(now, effects);
                return;
            }
            _ => {}
        }

        let point = PathSample {
            lat: sample.lat,
            lon: sample.lon,
            alt_ft: sample.altitude_ft,
            time: now,
        };
        if session.record_path(point, self.config.path_sample_interval_secs)
            && session.recorded_count() % self.config.persist_every_samples as u64 == 0
        {
            effects.push(Effect::Persist(session.to_snapshot(now)));
        }
    }

    fn depart(&mut self, sample: &TelemetrySample, effects: &mut Vec<Effect>) {
        let now = sample.timestamp;
        let nearest = self.airports.find_nearest(sample.lat, sample.lon).cloned();
        let icao = match &nearest {
            Some(airport) => airport.icao.clone(),
            None => resolve_icao(self.prompt.as_mut(), "Departure", sample.lat, sample.lon),
        };

        let session = FlightSession::new(
            now,
            icao.clone(),
            nearest,
            self.identity.callsign.clone(),
            clean_aircraft_name(&self.identity.aircraft),
            self.config.path_history_len,
        );
        self.detector.start(
            Position::new(sample.lat, sample.lon, sample.altitude_ft),
            now,
        );
        self.bounces = 0;

        log::info!("Departure detected at {}", icao);
        effects.push(Effect::Departed { icao });
        effects.push(Effect::Persist(session.to_snapshot(now)));
        self.session = Some(session);
    }

    fn land(&mut self, sample: &TelemetrySample, effects: &mut Vec<Effect>) {
        let now = sample.timestamp;
        let (vs, vs_source) = self.estimator.touchdown_fpm(sample.vertical_speed_fpm);
        let quality = LandingQuality::classify(vs);
        let crashed = is_crash_override(vs);

        let nearest: Option<Airport> = self.airports.find_nearest(sample.lat, sample.lon).cloned();
        let arrival = if crashed {
            CRASH_ARRIVAL.to_string()
        } else {
            match &nearest {
                Some(airport) => airport.icao.clone(),
                None => resolve_icao(self.prompt.as_mut(), "Arrival", sample.lat, sample.lon),
            }
        };

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.first_ground_contact = true;
        session.phase = if crashed {
            FlightPhase::Crashed
        } else {
            FlightPhase::Landed
        };
        session.arrival_icao = Some(arrival.clone());
        session.arrival_airport = nearest;

        if crashed {
            log::warn!("Crash detected: {:.1} fpm at touchdown", vs);
        }
        log::info!("Arrival detected at {}", arrival);
        log::info!(
            "Landing data: V/S = {:.1} fpm ({:?}), Quality = {}, path points = {}",
            vs,
            vs_source,
            quality,
            session.path_len()
        );

        let report = FlightReport {
            flight_number: flight_number(&self.identity.airline_icao, &session.callsign),
            pilot_name: self.identity.pilot_name.clone(),
            aircraft: session.aircraft.clone(),
            departure: session.departure_icao.clone(),
            arrival,
            departure_timezone: session
                .departure_airport
                .as_ref()
                .and_then(|a| a.timezone.clone()),
            arrival_timezone: session
                .arrival_airport
                .as_ref()
                .and_then(|a| a.timezone.clone()),
            takeoff_time: session.start_time,
            landing_time: now,
            duration: format_duration(session.elapsed(now)),
            vertical_speed_fpm: vs,
            vs_source,
            g_force: FlightReport::g_force_from_accel(sample.accel_z),
            true_airspeed_kt: sample.true_airspeed_kt,
            ground_speed_kt: sample.ground_speed_kt,
            quality,
            crashed,
            bounces: self.bounces,
            teleport_warnings: session.teleport_warnings,
            path_continuity_broken: session.path_continuity_broken,
        };

        self.last_report = Some(report.clone());
        effects.push(Effect::NotifyReport(report));
        effects.push(Effect::ClearSession);
        effects.push(Effect::ResetUi);
        effects.push(Effect::StopPolling);
    }

    fn void(&mut self, now: f64, effects: &mut Vec<Effect>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.terminated = true;
        session.phase = FlightPhase::Voided;
        session.arrival_icao = Some(TELEPORT_ARRIVAL.to_string());

        log::error!(
            "Flight from {} voided after {} teleport warnings",
            session.departure_icao,
            session.teleport_warnings
        );

        let notice = TerminationNotice {
            flight_number: flight_number(&self.identity.airline_icao, &session.callsign),
            pilot_name: self.identity.pilot_name.clone(),
            aircraft: session.aircraft.clone(),
            departure: session.departure_icao.clone(),
            arrival: TELEPORT_ARRIVAL.to_string(),
            takeoff_time: session.start_time,
            terminated_at: now,
            duration: format_duration(session.elapsed(now)),
            teleport_warnings: session.teleport_warnings,
            reason: TERMINATION_REASON.to_string(),
        };

        effects.push(Effect::NotifyTermination(notice));
        effects.push(Effect::ClearSession);
        effects.push(Effect::ResetUi);
        effects.push(Effect::StopPolling);
    }
}
