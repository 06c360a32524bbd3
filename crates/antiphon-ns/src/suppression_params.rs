//! Level-dependent tuning.

use crate::config::SuppressionLevel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SuppressionParams {
    /// Weight of the noise estimate in the gain rule.
    pub(crate) over_subtraction_factor: f32,
    /// Gain floor; sets the maximum attenuation.
    pub(crate) minimum_attenuating_gain: f32,
}

impl SuppressionParams {
    pub(crate) fn new(level: SuppressionLevel) -> Self {
        match level {
            SuppressionLevel::K6dB => Self {
                over_subtraction_factor: 1.0,
                minimum_attenuating_gain: 0.5,
            },
            SuppressionLevel::K12dB => Self {
                over_subtraction_factor: 1.0,
                minimum_attenuating_gain: 0.25,
            },
            SuppressionLevel::K18dB => Self {
                over_subtraction_factor: 1.1,
                minimum_attenuating_gain: 0.125,
            },
            SuppressionLevel::K21dB => Self {
                over_subtraction_factor: 1.25,
                minimum_attenuating_gain: 0.09,
            },
        }
    }
}
