//! Echo canceller front end: render delay line, per-channel adaptive
//! filters and residual suppression.

use antiphon_common_audio::audio_util::{downmix_to_mono, mean_square};
use derive_more::Debug;

use crate::adaptive_filter::AdaptiveFilter;
use crate::erle_estimator::ErleEstimator;
use crate::render_buffer::RenderBuffer;
use crate::residual_echo_suppressor::ResidualEchoSuppressor;
use crate::{AecError, MAX_DELAY_MS};

const SUPPORTED_RATES_HZ: [u32; 4] = [8000, 16000, 32000, 48000];

const TAIL_MS: usize = 32;
const MOBILE_TAIL_MS: usize = 16;
const STEP_SIZE: f32 = 0.5;
const MOBILE_STEP_SIZE: f32 = 0.3;

const RESIDUAL_FACTOR: f32 = 0.05;
const MIN_GAIN: f32 = 0.1;
const MOBILE_RESIDUAL_FACTOR: f32 = 0.2;
const MOBILE_MIN_GAIN: f32 = 0.03;

/// Mean render power (FloatS16) below which the far end counts as silent
/// and the filters stop adapting.
const RENDER_ACTIVITY_POWER: f32 = 100.0;
/// Mean reference power below which filtering is skipped altogether.
const SILENT_REFERENCE_POWER: f32 = 1.0e-3;
/// The filter is reset when its output exceeds the input by this factor.
const DIVERGENCE_FACTOR: f32 = 4.0;

/// Quality figures of the canceller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoCancellerMetrics {
    /// Echo return loss enhancement of the linear filter, in dB.
    pub erle_db: f32,
    /// Render-to-capture delay currently compensated.
    pub delay_ms: u32,
}

/// Time-domain acoustic echo canceller.
///
/// Feed every render frame through [`analyze_render`](Self::analyze_render)
/// before the capture frame of the same block goes through
/// [`process_capture`](Self::process_capture). Both take planar FloatS16
/// frames of 10 ms at the canceller's rate.
#[derive(Debug)]
pub struct EchoCanceller {
    sample_rate_hz: u32,
    mobile_mode: bool,
    delay_ms: u32,
    render: RenderBuffer,
    filters: Vec<AdaptiveFilter>,
    suppressors: Vec<ResidualEchoSuppressor>,
    erle: ErleEstimator,
    #[debug(skip)]
    render_mono: Vec<f32>,
    #[debug(skip)]
    reference: Vec<f32>,
    #[debug(skip)]
    echo: Vec<f32>,
    #[debug(skip)]
    linear: Vec<Vec<f32>>,
}

impl EchoCanceller {
    pub fn new(sample_rate_hz: u32, num_channels: usize, mobile_mode: bool) -> Result<Self, AecError> {
        if !SUPPORTED_RATES_HZ.contains(&sample_rate_hz) {
            return Err(AecError::UnsupportedSampleRate(sample_rate_hz));
        }
        if num_channels == 0 {
            return Err(AecError::InvalidChannelCount);
        }
        let samples_per_ms = sample_rate_hz as usize / 1000;
        let frame_len = sample_rate_hz as usize / 100;
        let (tail_ms, step_size, residual_factor, min_gain) = if mobile_mode {
            (MOBILE_TAIL_MS, MOBILE_STEP_SIZE, MOBILE_RESIDUAL_FACTOR, MOBILE_MIN_GAIN)
        } else {
            (TAIL_MS, STEP_SIZE, RESIDUAL_FACTOR, MIN_GAIN)
        };
        let taps = tail_ms * samples_per_ms;
        let capacity = MAX_DELAY_MS as usize * samples_per_ms + taps + 2 * frame_len;

        tracing::debug!(sample_rate_hz, num_channels, mobile_mode, taps, "creating echo canceller");
        Ok(Self {
            sample_rate_hz,
            mobile_mode,
            delay_ms: 0,
            render: RenderBuffer::new(capacity),
            filters: (0..num_channels)
                .map(|_| AdaptiveFilter::new(taps, step_size))
                .collect(),
            suppressors: vec![ResidualEchoSuppressor::new(residual_factor, min_gain); num_channels],
            erle: ErleEstimator::new(),
            render_mono: vec![0.0; frame_len],
            reference: vec![0.0; taps - 1 + frame_len],
            echo: vec![0.0; frame_len],
            linear: vec![vec![0.0; frame_len]; num_channels],
        })
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn num_channels(&self) -> usize {
        self.filters.len()
    }

    pub fn is_mobile_mode(&self) -> bool {
        self.mobile_mode
    }

    /// Clears the render history and the learned echo path.
    pub fn reset(&mut self) {
        self.render.reset();
        self.filters.iter_mut().for_each(AdaptiveFilter::reset);
        self.suppressors
            .iter_mut()
            .for_each(ResidualEchoSuppressor::reset);
        self.erle.reset();
        self.linear.iter_mut().for_each(|ch| ch.fill(0.0));
    }

    /// Sets the render-to-capture delay, saturating at [`MAX_DELAY_MS`].
    pub fn set_delay_ms(&mut self, delay_ms: u32) {
        self.delay_ms = delay_ms.min(MAX_DELAY_MS);
    }

    pub fn delay_ms(&self) -> u32 {
        self.delay_ms
    }

    /// Adds a render frame to the reference history.
    pub fn analyze_render(&mut self, render: &[Vec<f32>]) {
        let len = render.first().map_or(0, Vec::len);
        self.render_mono.resize(len, 0.0);
        downmix_to_mono(render, &mut self.render_mono);
        self.render.push(&self.render_mono);
    }

    /// Removes echo from `capture` in place. With `freeze_adaptation` set
    /// the echo path model is used but not updated.
    pub fn process_capture(&mut self, capture: &mut [Vec<f32>], freeze_adaptation: bool) {
        debug_assert_eq!(capture.len(), self.filters.len());
        let frame_len = capture.first().map_or(0, Vec::len);
        let taps = self.filters.first().map_or(1, AdaptiveFilter::taps);
        self.reference.resize(taps - 1 + frame_len, 0.0);
        self.echo.resize(frame_len, 0.0);

        let delay_samples = self.delay_ms as usize * self.sample_rate_hz as usize / 1000;
        self.render.read_delayed(delay_samples, &mut self.reference);
        let reference_silent = mean_square(&self.reference) < SILENT_REFERENCE_POWER;
        let render_active = mean_square(&self.reference[taps - 1..]) > RENDER_ACTIVITY_POWER;
        let adapt = render_active && !freeze_adaptation;

        let mut capture_power_sum = 0.0;
        let mut error_power_sum = 0.0;
        for (((channel, linear), filter), suppressor) in capture
            .iter_mut()
            .zip(&mut self.linear)
            .zip(&mut self.filters)
            .zip(&mut self.suppressors)
        {
            linear.resize(frame_len, 0.0);
            let capture_power = mean_square(channel);
            let mut echo_power = 0.0;

            if reference_silent {
                linear.copy_from_slice(channel);
            } else {
                filter.process(&self.reference, channel, &mut self.echo, linear, adapt);
                if mean_square(linear) > DIVERGENCE_FACTOR * capture_power + 1.0 {
                    tracing::debug!("echo path filter diverged, resetting");
                    filter.reset();
                    linear.copy_from_slice(channel);
                } else {
                    echo_power = mean_square(&self.echo);
                }
            }

            let error_power = mean_square(linear);
            capture_power_sum += capture_power;
            error_power_sum += error_power;

            channel.copy_from_slice(linear);
            suppressor.apply(echo_power, error_power, channel);
        }

        if render_active {
            let n = capture.len().max(1) as f32;
            self.erle.update(capture_power_sum / n, error_power_sum / n);
        }
    }

    /// Output of the linear filter for the last capture frame, before
    /// residual suppression. Not produced in mobile mode.
    pub fn linear_output(&self) -> Option<&[Vec<f32>]> {
        (!self.mobile_mode).then_some(self.linear.as_slice())
    }

    pub fn metrics(&self) -> EchoCancellerMetrics {
        EchoCancellerMetrics {
            erle_db: self.erle.erle_db(),
            delay_ms: self.delay_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;
    const FRAME: usize = 160;

    struct Noise(u32);

    impl Noise {
        fn next(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            ((self.0 >> 16) as f32 - 32768.0) / 8.0
        }
    }

    /// Runs `frames` blocks of far-end noise with an echo path of `gain` and
    /// `delay` samples. Returns the mean output power of the last 10 blocks
    /// and the mean capture power.
    fn run_echo(aec: &mut EchoCanceller, frames: usize, delay: usize, gain: f32) -> (f32, f32) {
        let mut noise = Noise(7);
        let mut render_history = vec![0.0f32; delay];
        let mut out_power = 0.0;
        let mut in_power = 0.0;
        for k in 0..frames {
            let render: Vec<f32> = (0..FRAME).map(|_| noise.next()).collect();
            render_history.extend_from_slice(&render);
            let start = render_history.len() - FRAME - delay;
            let mut capture = vec![
                render_history[start..start + FRAME]
                    .iter()
                    .map(|&r| gain * r)
                    .collect::<Vec<f32>>(),
            ];
            aec.analyze_render(&[render]);
            let capture_power = mean_square(&capture[0]);
            aec.process_capture(&mut capture, false);
            if k >= frames - 10 {
                out_power += mean_square(&capture[0]) / 10.0;
                in_power += capture_power / 10.0;
            }
        }
        (out_power, in_power)
    }

    #[test]
    fn rejects_unsupported_formats() {
        assert_eq!(
            EchoCanceller::new(44100, 1, false).err(),
            Some(AecError::UnsupportedSampleRate(44100))
        );
        assert_eq!(
            EchoCanceller::new(16000, 0, false).err(),
            Some(AecError::InvalidChannelCount)
        );
    }

    #[test]
    fn passes_capture_through_without_render() {
        let mut aec = EchoCanceller::new(RATE, 2, false).unwrap();
        let original: Vec<Vec<f32>> = vec![vec![1234.0; FRAME], vec![-321.0; FRAME]];
        for _ in 0..5 {
            let mut capture = original.clone();
            aec.process_capture(&mut capture, false);
            assert_eq!(capture, original);
        }
    }

    #[test]
    fn cancels_echo_within_tail() {
        let mut aec = EchoCanceller::new(RATE, 1, false).unwrap();
        let (out_power, in_power) = run_echo(&mut aec, 300, 40, 0.6);
        assert!(out_power < in_power / 100.0, "{out_power} vs {in_power}");
        assert!(aec.metrics().erle_db > 10.0, "{:?}", aec.metrics());
    }

    #[test]
    fn stream_delay_moves_reference_window() {
        let mut aec = EchoCanceller::new(RATE, 1, false).unwrap();
        aec.set_delay_ms(100);
        // 100 ms plus 20 samples: only reachable through the delay.
        let (out_power, in_power) = run_echo(&mut aec, 300, 1620, 0.5);
        assert!(out_power < in_power / 100.0, "{out_power} vs {in_power}");
        assert_eq!(aec.metrics().delay_ms, 100);
    }

    #[test]
    fn delay_saturates() {
        let mut aec = EchoCanceller::new(RATE, 1, true).unwrap();
        aec.set_delay_ms(10_000);
        assert_eq!(aec.delay_ms(), MAX_DELAY_MS);
    }

    #[test]
    fn linear_output_only_in_full_mode() {
        let mut full = EchoCanceller::new(RATE, 1, false).unwrap();
        let mut mobile = EchoCanceller::new(RATE, 1, true).unwrap();
        let mut capture = vec![vec![50.0; FRAME]];
        full.process_capture(&mut capture, false);
        assert_eq!(full.linear_output().map(|l| l[0].len()), Some(FRAME));
        mobile.process_capture(&mut capture, false);
        assert!(mobile.linear_output().is_none());
    }

    #[test]
    fn mobile_mode_reduces_echo() {
        let mut aec = EchoCanceller::new(RATE, 1, true).unwrap();
        let (out_power, in_power) = run_echo(&mut aec, 300, 20, 0.6);
        assert!(out_power < in_power / 10.0, "{out_power} vs {in_power}");
    }
}
