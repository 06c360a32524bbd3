//! Echo return loss enhancement: how much the linear filter removes.

/// Smoothing factor of the frame power averages.
const SMOOTHING: f32 = 0.05;
const MAX_ERLE_DB: f32 = 60.0;
const POWER_FLOOR: f32 = 1.0;

#[derive(Debug, Clone)]
pub(crate) struct ErleEstimator {
    capture_power: f32,
    error_power: f32,
    erle_db: f32,
}

impl ErleEstimator {
    pub(crate) fn new() -> Self {
        let mut s = Self {
            capture_power: 0.0,
            error_power: 0.0,
            erle_db: 0.0,
        };
        s.reset();
        s
    }

    pub(crate) fn reset(&mut self) {
        self.capture_power = POWER_FLOOR;
        self.error_power = POWER_FLOOR;
        self.erle_db = 0.0;
    }

    /// Updates the estimate with the power of one capture frame before and
    /// after the linear filter. Only call while the far end is active.
    pub(crate) fn update(&mut self, capture_power: f32, error_power: f32) {
        self.capture_power += SMOOTHING * (capture_power - self.capture_power);
        self.error_power += SMOOTHING * (error_power - self.error_power);
        let ratio = (self.capture_power + POWER_FLOOR) / (self.error_power + POWER_FLOOR);
        self.erle_db = (10.0 * ratio.log10()).clamp(0.0, MAX_ERLE_DB);
    }

    pub(crate) fn erle_db(&self) -> f32 {
        self.erle_db
    }
}
