//! Scheduler owning the monitor and its collaborators.
//!
//! Two periodic tasks share one owner: a coarse poll (state machine, teleport checks)
//! and a fine poll (vertical speed). Both run on the same task through `select!`,
//! so there is exactly one writer and no locking.

use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::monitor::{Effect, FlightMonitor};
use crate::notifier::Notifier;
use crate::session::FlightPhase;
use crate::storage::SessionStore;
use crate::telemetry::{TelemetrySample, TelemetrySource};

const STATUS_EVERY_TICKS: u64 = 60;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub coarse_ticks: u64,
    pub fast_ticks: u64,
    /// Ticks where the simulator had nothing to offer
    pub idle_ticks: u64,
    pub reports_sent: u64,
    pub delivery_failures: u64,
    pub persist_failures: u64,
}

pub struct Runner<S, P, N> {
    monitor: FlightMonitor,
    source: S,
    store: P,
    notifier: N,
    stopped: bool,
    last_coarse: Option<f64>,
    stats: RunStats,
}

impl<S, P, N> Runner<S, P, N>
where
    S: TelemetrySource,
    P: SessionStore,
    N: Notifier,
{
    pub fn new(monitor: FlightMonitor, source: S, store: P, notifier: N) -> Self {
        Self {
            monitor,
            source,
            store,
            notifier,
            stopped: false,
            last_coarse: None,
            stats: RunStats::default(),
        }
    }

    pub fn monitor(&self) -> &FlightMonitor {
        &self.monitor
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Allow polling again after a completed flight
    pub fn rearm(&mut self) {
        self.stopped = false;
        self.last_coarse = None;
    }

    /// Resume a stored in-progress flight, if any. Returns true when one was restored.
    pub async fn resume_stored(&mut self, now: f64) -> bool {
        let Some(snapshot) = self.store.load() else {
            log::debug!("No stored session to resume");
            return false;
        };
        let effects = self.monitor.resume(&snapshot, now);
        self.apply(effects).await;
        self.monitor.phase() == FlightPhase::Airborne
    }

    /// One coarse tick against the telemetry source
    pub async fn step(&mut self) -> FlightPhase {
        if self.stopped {
            return self.monitor.phase();
        }
        match self.source.read() {
            Some(sample) => {
                self.stats.coarse_ticks += 1;
                self.last_coarse = Some(sample.timestamp);
                let effects = self.monitor.tick(&sample);
                self.apply(effects).await;
            }
            None => self.stats.idle_ticks += 1,
        }
        self.monitor.phase()
    }

    /// One fine tick against the telemetry source
    pub fn fast_step(&mut self) {
        if self.stopped {
            return;
        }
        if let Some(sample) = self.source.read() {
            self.stats.fast_ticks += 1;
            self.monitor.fast_tick(&sample);
        }
    }

    /// Feed a recorded sample: fine tick always, coarse tick once per coarse period
    /// of sample time.
    pub async fn feed(&mut self, sample: &TelemetrySample) {
        if self.stopped {
            return;
        }
        self.stats.fast_ticks += 1;
        self.monitor.fast_tick(sample);

        let period = self.monitor.config().coarse_poll_ms as f64 / 1000.0;
        let due = self
            .last_coarse
            .map_or(true, |last| sample.timestamp - last >= period);
        if due {
            self.stats.coarse_ticks += 1;
            self.last_coarse = Some(sample.timestamp);
            let effects = self.monitor.tick(sample);
            self.apply(effects).await;
        }
    }

    /// Poll until the flight completes, the telemetry source closes, or Ctrl-C.
    pub async fn run(&mut self) -> RunStats {
        let config = self.monitor.config();
        let mut coarse = interval(Duration::from_millis(config.coarse_poll_ms));
        let mut fast = interval(Duration::from_millis(config.fast_poll_ms));
        coarse.set_missed_tick_behavior(MissedTickBehavior::Skip);
        fast.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        log::info!(
            "Polling telemetry every {} ms (vertical speed every {} ms)",
            self.monitor.config().coarse_poll_ms,
            self.monitor.config().fast_poll_ms
        );

        while !self.stopped {
            tokio::select! {
                _ = coarse.tick() => {
                    if self.source.is_closed() {
                        log::info!("Telemetry source closed in phase {}", self.monitor.phase());
                        break;
                    }
                    let phase = self.step().await;
                    let ticks = self.stats.coarse_ticks + self.stats.idle_ticks;
                    if ticks % STATUS_EVERY_TICKS == 0 {
                        log::debug!(
                            "[runner] {} coarse / {} fast / {} idle ticks, phase {}",
                            self.stats.coarse_ticks,
                            self.stats.fast_ticks,
                            self.stats.idle_ticks,
                            phase
                        );
                    }
                }
                _ = fast.tick() => self.fast_step(),
                _ = &mut ctrl_c => {
                    log::info!("Interrupted; stored session left in place for resume");
                    break;
                }
            }
        }

        self.stats
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Persist(snapshot) => {
                    if let Err(e) = self.store.save(&snapshot) {
                        self.stats.persist_failures += 1;
                        log::error!("Failed to save session: {}", e);
                    }
                }
                Effect::ClearSession => {
                    if let Err(e) = self.store.clear() {
                        self.stats.persist_failures += 1;
                        log::error!("Failed to clear session: {}", e);
                    }
                }
                Effect::NotifyReport(report) => {
                    match self.notifier.send_report(&report).await {
                        Ok(()) => self.stats.reports_sent += 1,
                        Err(e) => {
                            self.stats.delivery_failures += 1;
                            log::error!("Failed to send flight log: {}", e);
                        }
                    }
                }
                Effect::NotifyTermination(notice) => {
                    match self.notifier.send_termination(&notice).await {
                        Ok(()) => self.stats.reports_sent += 1,
                        Err(e) => {
                            self.stats.delivery_failures += 1;
                            log::error!("Failed to send termination notice: {}", e);
                        }
                    }
                }
                Effect::Departed { icao } => log::debug!("[runner] airborne from {}", icao),
                Effect::TeleportWarning { count } => {
                    log::warn!(
                        "Teleportation detected ({} warning); one more voids the flight",
                        count
                    );
                }
                Effect::ResetUi => self.monitor.reset(),
                Effect::StopPolling => {
                    if self.stopped {
                        log::debug!("[runner] polling already stopped");
                    } else {
                        self.stopped = true;
                        log::info!("Flight complete, polling stopped");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::airport::{Airport, AirportIndex};
    use crate::config::LoggerConfig;
    use crate::notifier::testing::RecordingNotifier;
    use crate::prompt::DeclinePrompt;
    use crate::report::{FlightIdentity, LandingQuality};
    use crate::storage::MemoryStore;
    use crate::telemetry::{sample_at, ReplaySource};

    const JFK: (f64, f64) = (40.6413, -73.7781);
    const T0: f64 = 1_700_000_000.0;

    fn monitor() -> FlightMonitor {
        FlightMonitor::new(
            LoggerConfig::default(),
            Arc::new(AirportIndex::new(vec![
                Airport::new("KJFK", 40.6398, -73.7789),
                Airport::new("KLGA", 40.7769, -73.8740),
            ])),
            Box::new(DeclinePrompt),
            FlightIdentity::default(),
        )
    }

    fn runner(
        samples: Vec<TelemetrySample>,
        notifier: RecordingNotifier,
    ) -> Runner<ReplaySource, MemoryStore, RecordingNotifier> {
        Runner::new(monitor(), ReplaySource::new(samples), MemoryStore::new(), notifier)
    }

    fn landing_sequence(landing: f64) -> Vec<TelemetrySample> {
        vec![
            sample_at(T0, JFK.0, JFK.1, 120.0, false),
            // Last 25 ms before contact: 0.0625 ft down
            sample_at(landing - 0.025, JFK.0, JFK.1, 2.0625, false),
            sample_at(landing, JFK.0, JFK.1, 2.0, false),
            sample_at(landing, JFK.0, JFK.1, 0.0, true),
        ]
    }

    #[tokio::test]
    async fn test_end_to_end_flight() {
        let notifier = RecordingNotifier::default();
        let mut runner = runner(landing_sequence(T0 + 2_400.0), notifier.clone());

        assert_eq!(runner.step().await, FlightPhase::Airborne);
        assert_eq!(runner.monitor().session().unwrap().departure_icao, "KJFK");
        assert!(runner.store().load().is_some());

        runner.fast_step();
        runner.fast_step();
        assert_eq!(runner.step().await, FlightPhase::GroundIdle);

        let reports = notifier.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].quality, LandingQuality::Butter);
        assert_eq!(reports[0].duration, "00:40");
        assert_eq!(reports[0].departure, "KJFK");

        assert!(runner.is_stopped());
        assert!(runner.store().load().is_none());
        assert_eq!(runner.stats().reports_sent, 1);
    }

    #[tokio::test]
    async fn test_stop_fires_once() {
        let notifier = RecordingNotifier::default();
        let mut samples = landing_sequence(T0 + 600.0);
        // Telemetry keeps coming after touchdown
        samples.push(sample_at(T0 + 601.0, JFK.0, JFK.1, 0.0, true));
        samples.push(sample_at(T0 + 602.0, JFK.0, JFK.1, 200.0, false));
        let mut runner = runner(samples, notifier.clone());

        runner.step().await;
        runner.fast_step();
        runner.fast_step();
        runner.step().await;
        assert!(runner.is_stopped());

        runner.step().await;
        runner.step().await;
        assert_eq!(notifier.reports.lock().unwrap().len(), 1);
        assert_eq!(runner.monitor().phase(), FlightPhase::GroundIdle);

        // Explicit restart picks up the next departure
        runner.rearm();
        assert_eq!(runner.step().await, FlightPhase::GroundIdle);
        assert_eq!(runner.step().await, FlightPhase::Airborne);
    }

    #[tokio::test]
    async fn test_two_teleports_void_and_stop_once() {
        let notifier = RecordingNotifier::default();
        let mut samples = vec![sample_at(T0, JFK.0, JFK.1, 120.0, false)];
        for i in 1..=6 {
            samples.push(sample_at(T0 + i as f64, JFK.0, JFK.1, 3_000.0, false));
        }
        // 1.1 km and 5000 ft in a second, out and back
        samples.push(sample_at(T0 + 7.0, JFK.0 + 0.01, JFK.1, 8_000.0, false));
        samples.push(sample_at(T0 + 8.0, JFK.0, JFK.1, 3_000.0, false));
        // Telemetry keeps flowing after the void
        samples.push(sample_at(T0 + 9.0, JFK.0, JFK.1, 3_000.0, false));
        samples.push(sample_at(T0 + 10.0, JFK.0, JFK.1, 0.0, true));
        let mut runner = runner(samples, notifier.clone());

        for _ in 0..8 {
            assert_eq!(runner.step().await, FlightPhase::Airborne);
        }
        assert_eq!(runner.store().load().unwrap().teleport_warnings, 1);
        assert!(notifier.terminations.lock().unwrap().is_empty());

        assert_eq!(runner.step().await, FlightPhase::GroundIdle);
        assert!(runner.is_stopped());

        runner.step().await;
        runner.step().await;

        let terminations = notifier.terminations.lock().unwrap();
        assert_eq!(terminations.len(), 1);
        assert_eq!(terminations[0].teleport_warnings, 2);
        assert!(notifier.reports.lock().unwrap().is_empty());
        assert!(runner.store().load().is_none());
        assert_eq!(runner.monitor().phase(), FlightPhase::GroundIdle);
        assert_eq!(runner.stats().reports_sent, 1);
        assert_eq!(runner.stats().coarse_ticks, 9);
    }

    #[tokio::test]
    async fn test_delivery_failure_still_clears_session() {
        let notifier = RecordingNotifier::failing();
        let mut runner = runner(landing_sequence(T0 + 600.0), notifier.clone());

        runner.step().await;
        runner.fast_step();
        runner.fast_step();
        runner.step().await;

        assert_eq!(notifier.reports.lock().unwrap().len(), 1);
        assert_eq!(runner.stats().delivery_failures, 1);
        assert!(runner.store().load().is_none());
        assert_eq!(runner.monitor().phase(), FlightPhase::GroundIdle);
    }

    #[tokio::test]
    async fn test_resume_from_store() {
        let notifier = RecordingNotifier::default();
        let mut first = runner(vec![sample_at(T0, JFK.0, JFK.1, 120.0, false)], notifier.clone());
        first.step().await;
        let stored = first.store().raw().unwrap().to_string();

        let mut second = Runner::new(
            monitor(),
            ReplaySource::new(Vec::new()),
            MemoryStore::with_raw(stored),
            notifier,
        );
        assert!(second.resume_stored(T0 + 30.0).await);
        assert_eq!(second.monitor().phase(), FlightPhase::Airborne);
        assert_eq!(second.store().save_count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_store_starts_idle() {
        let mut runner = Runner::new(
            monitor(),
            ReplaySource::new(Vec::new()),
            MemoryStore::with_raw("{ broken"),
            RecordingNotifier::default(),
        );
        assert!(!runner.resume_stored(T0).await);
        assert_eq!(runner.monitor().phase(), FlightPhase::GroundIdle);
    }

    #[tokio::test]
    async fn test_idle_when_no_telemetry() {
        let mut runner = runner(Vec::new(), RecordingNotifier::default());
        assert_eq!(runner.step().await, FlightPhase::GroundIdle);
        runner.fast_step();
        assert_eq!(runner.stats().idle_ticks, 1);
        assert_eq!(runner.stats().fast_ticks, 0);
    }

    #[tokio::test]
    async fn test_feed_throttles_coarse_ticks() {
        let notifier = RecordingNotifier::default();
        let mut runner = runner(Vec::new(), notifier.clone());
        let landing = T0 + 1_200.0;

        runner.feed(&sample_at(T0, JFK.0, JFK.1, 120.0, false)).await;
        // 40 Hz approach for the last second, then contact
        for i in 0..40 {
            let t = landing - 1.0 + i as f64 * 0.025;
            let agl = 4.5 - i as f64 * 0.0625;
            runner.feed(&sample_at(t, JFK.0, JFK.1, agl, false)).await;
        }
        // Same AGL as the last fast sample, so the estimate is left alone
        runner.feed(&sample_at(landing + 0.5, JFK.0, JFK.1, 2.0625, true)).await;

        let stats = runner.stats();
        assert_eq!(stats.coarse_ticks, 3);
        assert!(stats.fast_ticks > 40);

        let reports = notifier.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].quality, LandingQuality::Butter);
        assert_eq!(reports[0].duration, "00:20");
    }
}
