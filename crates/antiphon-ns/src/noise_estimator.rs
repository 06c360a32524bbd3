//! Minimum-tracking noise power estimate per band.

use crate::config::{NUM_BANDS, STARTUP_FRAMES};

const POWER_SMOOTHING: f32 = 0.3;
/// Per-frame growth of the estimate while the input stays above it.
const NOISE_RISE: f32 = 1.005;
const POWER_FLOOR: f32 = 1.0;

#[derive(Debug, Clone)]
pub(crate) struct NoiseEstimator {
    smoothed_power: [f32; NUM_BANDS],
    noise_power: [f32; NUM_BANDS],
    frames: u32,
}

impl NoiseEstimator {
    pub(crate) fn new() -> Self {
        let mut s = Self {
            smoothed_power: [0.0; NUM_BANDS],
            noise_power: [0.0; NUM_BANDS],
            frames: 0,
        };
        s.reset();
        s
    }

    pub(crate) fn reset(&mut self) {
        self.smoothed_power = [0.0; NUM_BANDS];
        self.noise_power = [POWER_FLOOR; NUM_BANDS];
        self.frames = 0;
    }

    /// Adds the band powers of one frame.
    pub(crate) fn update(&mut self, band_power: &[f32; NUM_BANDS]) {
        for ((smoothed, noise), &power) in self
            .smoothed_power
            .iter_mut()
            .zip(&mut self.noise_power)
            .zip(band_power)
        {
            if self.frames == 0 {
                *smoothed = power;
            } else {
                *smoothed += POWER_SMOOTHING * (power - *smoothed);
            }

            *noise = if self.frames < STARTUP_FRAMES {
                // Running mean: the first frames are assumed to be noise.
                *noise + (*smoothed - *noise) / (self.frames + 1) as f32
            } else {
                (*noise * NOISE_RISE).min(*smoothed)
            }
            .max(POWER_FLOOR);
        }
        self.frames = self.frames.saturating_add(1);
    }

    pub(crate) fn noise_power(&self) -> &[f32; NUM_BANDS] {
        &self.noise_power
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_constant_power() {
        let mut estimator = NoiseEstimator::new();
        for _ in 0..100 {
            estimator.update(&[400.0, 900.0]);
        }
        let noise = estimator.noise_power();
        assert!((noise[0] - 400.0).abs() < 1.0);
        assert!((noise[1] - 900.0).abs() < 1.0);
    }

    #[test]
    fn drops_fast_and_rises_slowly() {
        let mut estimator = NoiseEstimator::new();
        for _ in 0..50 {
            estimator.update(&[10_000.0; NUM_BANDS]);
        }
        for _ in 0..20 {
            estimator.update(&[100.0; NUM_BANDS]);
        }
        assert!(estimator.noise_power()[0] < 200.0);

        for _ in 0..10 {
            estimator.update(&[10_000.0; NUM_BANDS]);
        }
        assert!(estimator.noise_power()[0] < 110.0);
    }
}
