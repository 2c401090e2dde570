//! Terrain-calibrated vertical speed estimator
//!
//! Differentiates gear-referenced AGL on a fast (~25 ms) tick. The simulator's own
//! vertical-speed field lags and jitters near touchdown, so the landing rate is taken
//! from this estimate whenever it is plausible.

/// Vertical speed at or beyond this magnitude is treated as a sensor glitch
pub const DEFAULT_GLITCH_FPM: f64 = 5000.0;

/// Where a touchdown vertical speed came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VsSource {
    Calibrated,
    Native,
}

#[derive(Clone, Debug)]
pub struct VerticalSpeedEstimator {
    previous_agl: Option<f64>,
    previous_time: f64,
    vertical_speed_fpm: f64,
    glitch_fpm: f64,
    update_count: u64,
}

impl VerticalSpeedEstimator {
    pub fn new(glitch_fpm: f64) -> Self {
        Self {
            previous_agl: None,
            previous_time: 0.0,
            vertical_speed_fpm: 0.0,
            glitch_fpm,
            update_count: 0,
        }
    }

    /// Feed one AGL reading (feet) taken at `timestamp` (seconds).
    ///
    /// Unavailable or non-finite readings and unchanged AGL leave the last estimate in place.
    pub fn update(&mut self, agl_ft: Option<f64>, timestamp: f64) {
        let Some(agl) = agl_ft.filter(|a| a.is_finite()) else {
            return;
        };

        let Some(previous) = self.previous_agl else {
            // First reading only seeds the baseline
            self.previous_agl = Some(agl);
            self.previous_time = timestamp;
            return;
        };

        if agl == previous {
            return;
        }

        let elapsed_ms = (timestamp - self.previous_time) * 1000.0;
        if elapsed_ms <= 0.0 || !elapsed_ms.is_finite() {
            return;
        }

        self.vertical_speed_fpm = (agl - previous) * (60_000.0 / elapsed_ms);
        self.previous_agl = Some(agl);
        self.previous_time = timestamp;
        self.update_count += 1;
    }

    /// Latest raw estimate in feet per minute (may be a glitch)
    pub fn raw_fpm(&self) -> f64 {
        self.vertical_speed_fpm
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Calibrated estimate if one exists and is physically plausible
    pub fn calibrated_fpm(&self) -> Option<f64> {
        let vs = self.vertical_speed_fpm;
        (vs != 0.0 && vs.is_finite() && vs.abs() < self.glitch_fpm).then_some(vs)
    }

    /// Vertical speed to use at touchdown, falling back to the simulator's reading
    pub fn touchdown_fpm(&self, native_fpm: f64) -> (f64, VsSource) {
        match self.calibrated_fpm() {
            Some(vs) => (vs, VsSource::Calibrated),
            None if native_fpm.is_finite() => (native_fpm, VsSource::Native),
            None => (0.0, VsSource::Native),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.glitch_fpm);
    }
}

impl Default for VerticalSpeedEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_GLITCH_FPM)
    }
}
