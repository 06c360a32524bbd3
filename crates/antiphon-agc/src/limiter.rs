//! Peak limiter.
//!
//! The frame is split into sub-frames. A peak envelope with instant attack
//! and exponential release yields one scaling factor per sub-frame; each
//! sub-frame boundary takes the smaller factor of its two neighbours so the
//! linearly interpolated gain never lets a sub-frame peak exceed the
//! threshold. A final hard clip keeps samples in the FloatS16 range.

use antiphon_common_audio::audio_util::{MAX_FLOAT_S16_VALUE, MIN_FLOAT_S16_VALUE};
use derive_more::Debug;

use crate::common::{SUB_FRAMES_IN_FRAME, dbfs_to_float_s16};

/// Envelope decay per sub-frame (about 0.2 dB).
const ENVELOPE_RELEASE: f32 = 0.977;

#[derive(Debug, Clone)]
pub struct Limiter {
    threshold: f32,
    envelope: f32,
    /// Factor of the last sub-frame of the previous frame.
    last_factor: f32,
    #[debug(skip)]
    factors: [f32; SUB_FRAMES_IN_FRAME],
    #[debug(skip)]
    boundaries: [f32; SUB_FRAMES_IN_FRAME + 1],
}

impl Limiter {
    /// Limiter keeping peaks at or below `threshold_dbfs`.
    pub fn new(threshold_dbfs: f32) -> Self {
        let mut s = Self {
            threshold: dbfs_to_float_s16(threshold_dbfs).min(MAX_FLOAT_S16_VALUE),
            envelope: 0.0,
            last_factor: 1.0,
            factors: [1.0; SUB_FRAMES_IN_FRAME],
            boundaries: [1.0; SUB_FRAMES_IN_FRAME + 1],
        };
        s.reset();
        s
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
        self.last_factor = 1.0;
    }

    /// Threshold as a FloatS16 amplitude.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn process(&mut self, frame: &mut [Vec<f32>]) {
        let Some(len) = frame.first().map(Vec::len) else {
            return;
        };
        let sub_len = (len / SUB_FRAMES_IN_FRAME).max(1);

        for (i, factor) in self.factors.iter_mut().enumerate() {
            let range = (i * sub_len).min(len)..((i + 1) * sub_len).min(len);
            let peak = frame
                .iter()
                .flat_map(|channel| &channel[range.clone()])
                .fold(0.0f32, |peak, &x| peak.max(x.abs()));
            self.envelope = peak.max(self.envelope * ENVELOPE_RELEASE);
            *factor = if self.envelope > self.threshold {
                self.threshold / self.envelope
            } else {
                1.0
            };
        }

        self.boundaries[0] = self.last_factor.min(self.factors[0]);
        for i in 1..SUB_FRAMES_IN_FRAME {
            self.boundaries[i] = self.factors[i - 1].min(self.factors[i]);
        }
        self.boundaries[SUB_FRAMES_IN_FRAME] = self.factors[SUB_FRAMES_IN_FRAME - 1];
        self.last_factor = self.factors[SUB_FRAMES_IN_FRAME - 1];

        for channel in frame.iter_mut() {
            for (n, x) in channel.iter_mut().enumerate() {
                let i = (n / sub_len).min(SUB_FRAMES_IN_FRAME - 1);
                let t = ((n - i * sub_len) as f32 / sub_len as f32).min(1.0);
                let gain = self.boundaries[i] + t * (self.boundaries[i + 1] - self.boundaries[i]);
                *x = (*x * gain).clamp(MIN_FLOAT_S16_VALUE, MAX_FLOAT_S16_VALUE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;
    use std::fmt::Debug;

    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;

    fn tone(len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|n| amplitude * (2.0 * PI * 1000.0 * n as f32 / 48000.0).sin())
            .collect()
    }

    #[test]
    fn quiet_signal_passes_unchanged() {
        let mut limiter = Limiter::new(-1.0);
        let input = tone(480, 10_000.0);
        let mut frame = vec![input.clone()];
        limiter.process(&mut frame);
        assert_eq!(frame[0], input);
    }

    #[test]
    fn loud_signal_is_held_below_threshold() {
        let mut limiter = Limiter::new(-1.0);
        let threshold = limiter.threshold();
        for _ in 0..20 {
            let mut frame = vec![tone(480, 60_000.0), tone(480, 40_000.0)];
            limiter.process(&mut frame);
            let peak = frame
                .iter()
                .flatten()
                .fold(0.0f32, |peak, &x| peak.max(x.abs()));
            assert!(peak <= threshold + 1.0, "{peak} > {threshold}");
        }
    }

    #[test]
    fn reset_releases_gain_reduction() {
        let mut limiter = Limiter::new(-1.0);
        let mut frame = vec![tone(160, 60_000.0)];
        limiter.process(&mut frame);
        limiter.reset();
        let input = tone(160, 1000.0);
        let mut frame = vec![input.clone()];
        limiter.process(&mut frame);
        assert_eq!(frame[0], input);
    }

    #[proptest]
    fn output_stays_in_s16_range(
        #[strategy(prop::collection::vec(-1.0e6f32..1.0e6, 160))] samples: Vec<f32>,
        #[strategy(-20.0f32..3.0)] threshold_dbfs: f32,
    ) {
        let mut limiter = Limiter::new(threshold_dbfs);
        let mut frame = vec![samples];
        limiter.process(&mut frame);
        for &x in &frame[0] {
            prop_assert!((MIN_FLOAT_S16_VALUE..=MAX_FLOAT_S16_VALUE).contains(&x));
            prop_assert!(x.abs() <= limiter.threshold() * 1.001 + 1.0);
        }
    }
}
