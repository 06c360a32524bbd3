//! Cascaded biquad (IIR) filter in direct form I.

use std::f32::consts::{FRAC_1_SQRT_2, PI};

use derive_more::Debug;

/// Coefficients of one second-order section, with `a0` normalised to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiQuadCoefficients {
    /// Feed-forward coefficients `b0, b1, b2`.
    pub b: [f32; 3],
    /// Feedback coefficients `a1, a2`.
    pub a: [f32; 2],
}

impl BiQuadCoefficients {
    /// Second-order Butterworth high-pass section for an arbitrary rate
    /// (bilinear transform with pre-warping).
    pub fn butterworth_high_pass(cutoff_hz: f32, sample_rate_hz: u32) -> Self {
        let (_, norm, a) = Self::butterworth_poles(cutoff_hz, sample_rate_hz);
        Self {
            b: [norm, -2.0 * norm, norm],
            a,
        }
    }

    /// Low-pass counterpart of [`butterworth_high_pass`](Self::butterworth_high_pass).
    pub fn butterworth_low_pass(cutoff_hz: f32, sample_rate_hz: u32) -> Self {
        let (k, norm, a) = Self::butterworth_poles(cutoff_hz, sample_rate_hz);
        let b0 = k * k * norm;
        Self {
            b: [b0, 2.0 * b0, b0],
            a,
        }
    }

    /// Pre-warped `tan(w/2)`, the normalisation and the shared feedback
    /// coefficients.
    fn butterworth_poles(cutoff_hz: f32, sample_rate_hz: u32) -> (f32, f32, [f32; 2]) {
        let k = (PI * cutoff_hz / sample_rate_hz as f32).tan();
        let q = FRAC_1_SQRT_2;
        let norm = 1.0 / (1.0 + k / q + k * k);
        (
            k,
            norm,
            [2.0 * (k * k - 1.0) * norm, (1.0 - k / q + k * k) * norm],
        )
    }
}

#[derive(Debug, Clone)]
struct BiQuad {
    coefficients: BiQuadCoefficients,
    x: [f32; 2],
    y: [f32; 2],
}

impl BiQuad {
    fn process_in_place(&mut self, samples: &mut [f32]) {
        let [b0, b1, b2] = self.coefficients.b;
        let [a1, a2] = self.coefficients.a;
        let [mut x0, mut x1] = self.x;
        let [mut y0, mut y1] = self.y;
        for v in samples.iter_mut() {
            let input = *v;
            let output = b0 * input + b1 * x0 + b2 * x1 - a1 * y0 - a2 * y1;
            x1 = x0;
            x0 = input;
            y1 = y0;
            y0 = output;
            *v = output;
        }
        self.x = [x0, x1];
        self.y = [y0, y1];
    }
}

/// Second-order sections applied in series.
#[derive(Debug, Clone)]
pub struct CascadedBiQuadFilter {
    #[debug(skip)]
    biquads: Vec<BiQuad>,
}

impl CascadedBiQuadFilter {
    pub fn new(coefficients: &[BiQuadCoefficients]) -> Self {
        Self {
            biquads: coefficients
                .iter()
                .map(|&coefficients| BiQuad {
                    coefficients,
                    x: [0.0; 2],
                    y: [0.0; 2],
                })
                .collect(),
        }
    }

    /// Filters `samples` in place through every stage.
    pub fn process_in_place(&mut self, samples: &mut [f32]) {
        for biquad in &mut self.biquads {
            biquad.process_in_place(samples);
        }
    }

    /// Clears the filter memory, keeping the coefficients.
    pub fn reset(&mut self) {
        for biquad in &mut self.biquads {
            biquad.x = [0.0; 2];
            biquad.y = [0.0; 2];
        }
    }
}
