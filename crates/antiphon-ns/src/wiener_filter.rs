//! Decision-directed Wiener gain per band.

use crate::config::NUM_BANDS;
use crate::suppression_params::SuppressionParams;

/// Weight of the previous frame's clean-speech estimate in the prior SNR.
const DECISION_DIRECTED_WEIGHT: f32 = 0.98;

#[derive(Debug, Clone)]
pub(crate) struct WienerFilter {
    params: SuppressionParams,
    prev_clean_power: [f32; NUM_BANDS],
    gains: [f32; NUM_BANDS],
}

impl WienerFilter {
    pub(crate) fn new(params: SuppressionParams) -> Self {
        let mut s = Self {
            params,
            prev_clean_power: [0.0; NUM_BANDS],
            gains: [1.0; NUM_BANDS],
        };
        s.reset();
        s
    }

    pub(crate) fn reset(&mut self) {
        self.prev_clean_power = [0.0; NUM_BANDS];
        self.gains = [1.0; NUM_BANDS];
    }

    pub(crate) fn update(&mut self, signal_power: &[f32; NUM_BANDS], noise_power: &[f32; NUM_BANDS]) {
        for b in 0..NUM_BANDS {
            let noise = noise_power[b];
            let posterior_snr = signal_power[b] / noise;
            let prior_snr = DECISION_DIRECTED_WEIGHT * self.prev_clean_power[b] / noise
                + (1.0 - DECISION_DIRECTED_WEIGHT) * (posterior_snr - 1.0).max(0.0);
            let gain = (prior_snr / (self.params.over_subtraction_factor + prior_snr))
                .clamp(self.params.minimum_attenuating_gain, 1.0);
            self.prev_clean_power[b] = gain * gain * signal_power[b];
            self.gains[b] = gain;
        }
    }

    pub(crate) fn gains(&self) -> &[f32; NUM_BANDS] {
        &self.gains
    }
}
