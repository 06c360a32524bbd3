//! Two-band noise suppressor.

use antiphon_common_audio::audio_util::mean_square;
use antiphon_common_audio::cascaded_biquad_filter::{BiQuadCoefficients, CascadedBiQuadFilter};
use derive_more::Debug;
use tracing::debug;

use crate::config::{BAND_SPLIT_HZ, NUM_BANDS, NsConfig};
use crate::noise_estimator::NoiseEstimator;
use crate::suppression_params::SuppressionParams;
use crate::wiener_filter::WienerFilter;

#[derive(Debug)]
struct ChannelState {
    analysis_split: CascadedBiQuadFilter,
    synthesis_split: CascadedBiQuadFilter,
    noise: NoiseEstimator,
    filter: WienerFilter,
    /// Gains reached at the end of the last processed frame.
    applied_gains: [f32; NUM_BANDS],
}

impl ChannelState {
    fn new(split: BiQuadCoefficients, params: SuppressionParams) -> Self {
        Self {
            analysis_split: CascadedBiQuadFilter::new(&[split]),
            synthesis_split: CascadedBiQuadFilter::new(&[split]),
            noise: NoiseEstimator::new(),
            filter: WienerFilter::new(params),
            applied_gains: [1.0; NUM_BANDS],
        }
    }

    fn reset(&mut self) {
        self.analysis_split.reset();
        self.synthesis_split.reset();
        self.noise.reset();
        self.filter.reset();
        self.applied_gains = [1.0; NUM_BANDS];
    }
}

/// Suppresses stationary noise in planar FloatS16 frames.
///
/// [`analyze`](Self::analyze) updates the noise estimate and the band gains;
/// [`process`](Self::process) applies the latest gains, ramping from the
/// previous frame's gains across the frame.
#[derive(Debug)]
pub struct NoiseSuppressor {
    config: NsConfig,
    sample_rate_hz: u32,
    channels: Vec<ChannelState>,
    #[debug(skip)]
    low_band: Vec<f32>,
}

impl NoiseSuppressor {
    pub fn new(config: NsConfig, sample_rate_hz: u32, num_channels: usize) -> Self {
        let split = BiQuadCoefficients::butterworth_low_pass(BAND_SPLIT_HZ, sample_rate_hz);
        let params = SuppressionParams::new(config.target_level);
        debug!(
            ?config,
            sample_rate_hz, num_channels, "creating noise suppressor"
        );
        Self {
            config,
            sample_rate_hz,
            channels: (0..num_channels)
                .map(|_| ChannelState::new(split, params))
                .collect(),
            low_band: Vec::with_capacity(sample_rate_hz as usize / 100),
        }
    }

    pub fn config(&self) -> NsConfig {
        self.config
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
    }

    /// Estimates the gains from `frame`. With `freeze_noise_estimate` set,
    /// the noise estimate is left as is and only the gains follow the input.
    pub fn analyze(&mut self, frame: &[Vec<f32>], freeze_noise_estimate: bool) {
        for (state, samples) in self.channels.iter_mut().zip(frame) {
            self.low_band.clear();
            self.low_band.extend_from_slice(samples);
            state.analysis_split.process_in_place(&mut self.low_band);

            let mut high_power = 0.0;
            for (&x, &low) in samples.iter().zip(&self.low_band) {
                let high = x - low;
                high_power += high * high;
            }
            let band_power = [
                mean_square(&self.low_band),
                high_power / samples.len().max(1) as f32,
            ];

            if !freeze_noise_estimate {
                state.noise.update(&band_power);
            }
            state.filter.update(&band_power, state.noise.noise_power());
        }
    }

    /// Applies the gains from the last [`analyze`](Self::analyze) call.
    pub fn process(&mut self, frame: &mut [Vec<f32>]) {
        for (state, samples) in self.channels.iter_mut().zip(frame.iter_mut()) {
            self.low_band.clear();
            self.low_band.extend_from_slice(samples);
            state.synthesis_split.process_in_place(&mut self.low_band);

            let target = *state.filter.gains();
            let start = state.applied_gains;
            let step = 1.0 / samples.len().max(1) as f32;
            for (n, (x, &low)) in samples.iter_mut().zip(&self.low_band).enumerate() {
                let t = (n + 1) as f32 * step;
                let low_gain = start[0] + t * (target[0] - start[0]);
                let high_gain = start[1] + t * (target[1] - start[1]);
                *x = low_gain * low + high_gain * (*x - low);
            }
            state.applied_gains = target;
        }
    }

    /// Current gain per band of `channel`, low band first.
    pub fn band_gains(&self, channel: usize) -> Option<[f32; NUM_BANDS]> {
        self.channels.get(channel).map(|state| *state.filter.gains())
    }
}
