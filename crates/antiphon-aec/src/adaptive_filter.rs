//! Normalised least-mean-squares FIR filter modelling the echo path.

use derive_more::Debug;

/// Regularisation per tap, in FloatS16 power. Keeps the step bounded when
/// the reference is quiet.
const REGULARIZATION_PER_TAP: f32 = 100.0;

#[derive(Debug)]
pub(crate) struct AdaptiveFilter {
    /// Taps stored oldest-first, so `weights[j]` multiplies `window[j]`.
    #[debug(skip)]
    weights: Vec<f32>,
    step_size: f32,
    regularization: f32,
}

impl AdaptiveFilter {
    pub(crate) fn new(taps: usize, step_size: f32) -> Self {
        Self {
            weights: vec![0.0; taps],
            step_size,
            regularization: taps as f32 * REGULARIZATION_PER_TAP,
        }
    }

    pub(crate) fn taps(&self) -> usize {
        self.weights.len()
    }

    pub(crate) fn reset(&mut self) {
        self.weights.fill(0.0);
    }

    /// Filters one frame.
    ///
    /// `reference` holds `taps() - 1 + capture.len()` samples, with
    /// `reference[taps() - 1 + n]` aligned to `capture[n]`. The echo
    /// estimate goes to `echo` and `capture - echo` to `error`. Taps are
    /// only updated when `adapt` is set.
    pub(crate) fn process(
        &mut self,
        reference: &[f32],
        capture: &[f32],
        echo: &mut [f32],
        error: &mut [f32],
        adapt: bool,
    ) {
        let taps = self.taps();
        debug_assert_eq!(reference.len(), taps - 1 + capture.len());

        let mut power: f32 = reference[..taps].iter().map(|&r| r * r).sum();
        for (n, ((&d, y), e)) in capture
            .iter()
            .zip(echo.iter_mut())
            .zip(error.iter_mut())
            .enumerate()
        {
            let window = &reference[n..n + taps];
            *y = self.weights.iter().zip(window).map(|(&w, &r)| w * r).sum();
            *e = d - *y;

            if adapt {
                let gain = self.step_size * *e / (power + self.regularization);
                for (w, &r) in self.weights.iter_mut().zip(window) {
                    *w += gain * r;
                }
            }

            if let Some(&incoming) = reference.get(n + taps) {
                let outgoing = reference[n];
                power = (power + incoming * incoming - outgoing * outgoing).max(0.0);
            }
        }
    }
}
