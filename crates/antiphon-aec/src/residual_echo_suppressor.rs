//! Frame gain that removes echo the linear filter left behind.

/// Gain applied when nothing needs suppressing.
const UNITY: f32 = 1.0;
const POWER_FLOOR: f32 = 1.0;

#[derive(Debug, Clone)]
pub(crate) struct ResidualEchoSuppressor {
    /// Fraction of the echo estimate assumed to remain after the filter.
    residual_factor: f32,
    min_gain: f32,
    gain: f32,
}

impl ResidualEchoSuppressor {
    pub(crate) fn new(residual_factor: f32, min_gain: f32) -> Self {
        Self {
            residual_factor,
            min_gain,
            gain: UNITY,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.gain = UNITY;
    }

    pub(crate) fn gain(&self) -> f32 {
        self.gain
    }

    /// Computes the gain for this frame from the echo estimate and the
    /// filter output power, then ramps `frame` from the previous gain to it.
    pub(crate) fn apply(&mut self, echo_power: f32, error_power: f32, frame: &mut [f32]) {
        let target = if echo_power <= POWER_FLOOR {
            UNITY
        } else {
            let residual = self.residual_factor * echo_power;
            (1.0 - residual / (error_power + POWER_FLOOR)).clamp(self.min_gain, UNITY)
        };

        let start = self.gain;
        let step = (target - start) / frame.len().max(1) as f32;
        for (i, s) in frame.iter_mut().enumerate() {
            *s *= start + step * (i + 1) as f32;
        }
        self.gain = target;
    }
}
