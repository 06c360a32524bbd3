//! Rumble removal ahead of echo cancellation.

use antiphon_common_audio::cascaded_biquad_filter::{BiQuadCoefficients, CascadedBiQuadFilter};

const CUTOFF_HZ: f32 = 80.0;

/// Second-order Butterworth high-pass per channel, designed for the stream
/// rate.
#[derive(Debug)]
pub(crate) struct HighPassFilter {
    filters: Vec<CascadedBiQuadFilter>,
}

impl HighPassFilter {
    pub(crate) fn new(sample_rate_hz: u32, num_channels: usize) -> Self {
        let coefficients = BiQuadCoefficients::butterworth_high_pass(CUTOFF_HZ, sample_rate_hz);
        Self {
            filters: vec![CascadedBiQuadFilter::new(&[coefficients]); num_channels],
        }
    }

    pub(crate) fn process(&mut self, frame: &mut [Vec<f32>]) {
        for (filter, channel) in self.filters.iter_mut().zip(frame.iter_mut()) {
            filter.process_in_place(channel);
        }
    }
}
