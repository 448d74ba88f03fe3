/// Exponentially smoothed iterations-per-second, shown on the overlay.
///
/// Purely diagnostic: nothing in the loop's control flow reads it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateEstimator {
    estimate: f64,
}

impl RateEstimator {
    /// Weight kept from the previous estimate.
    pub const SMOOTHING: f64 = 0.9;
    /// Weight given to the newest instantaneous rate.
    pub const GAIN: f64 = 0.1;

    pub fn new() -> Self {
        Self { estimate: 0.0 }
    }

    /// Fold one inter-iteration interval into the estimate.
    ///
    /// Non-positive (or non-finite) intervals leave the estimate unchanged.
    pub fn update(&mut self, dt_seconds: f64) -> f64 {
        if dt_seconds > 0.0 && dt_seconds.is_finite() {
            self.estimate = self.estimate * Self::SMOOTHING + (1.0 / dt_seconds) * Self::GAIN;
        }
        self.estimate
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }
}
