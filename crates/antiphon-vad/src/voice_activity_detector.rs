//! Chunk-wise voice probability with level gating.
//!
//! Every 10 ms chunk is resampled to 16 kHz. Chunks the level meter reports
//! as silent get a fixed low probability. Other chunks start from the
//! [`StandaloneVad`] decision as a prior and are refined with a likelihood
//! derived from the chunk RMS relative to a tracked noise level.

use antiphon_common_audio::audio_util::root_mean_square_s16;
use antiphon_common_audio::{Resampler, RmsLevel};
use derive_more::Debug;

use crate::VadError;
use crate::standalone_vad::{FRAME_LENGTH, NON_SPEECH_PROBABILITY, StandaloneVad};

const ANALYSIS_RATE_HZ: u32 = 16000;
const SUPPORTED_RATES_HZ: [u32; 4] = [8000, 16000, 32000, 48000];

/// Chunks at or below this level (in -dBFS) count as silence.
const SILENCE_LEVEL: i32 = 70;
const INITIAL_NOISE_RMS: f64 = 30.0;
/// Per-chunk growth factor of the noise estimate while the signal is louder.
const NOISE_RISE: f64 = 1.002;
/// SNR at which the likelihood ratio is one.
const NEUTRAL_SNR_DB: f64 = 10.0;
const SNR_SLOPE_DB: f64 = 4.0;
const MAX_PROBABILITY: f64 = 0.99;

#[derive(Debug)]
pub struct VoiceActivityDetector {
    standalone: StandaloneVad,
    /// Created on the first chunk, once the input rate is known.
    resampler: Option<Resampler>,
    level: RmsLevel,
    noise_rms: f64,
    #[debug(skip)]
    frame: [i16; FRAME_LENGTH],
    #[debug(skip)]
    chunkwise_voice_probabilities: Vec<f64>,
    #[debug(skip)]
    chunkwise_rms: Vec<f64>,
    last_voice_probability: f64,
}

impl Default for VoiceActivityDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceActivityDetector {
    pub fn new() -> Self {
        Self {
            standalone: StandaloneVad::new(),
            resampler: None,
            level: RmsLevel::new(),
            noise_rms: INITIAL_NOISE_RMS,
            frame: [0; FRAME_LENGTH],
            chunkwise_voice_probabilities: Vec::new(),
            chunkwise_rms: Vec::new(),
            last_voice_probability: NON_SPEECH_PROBABILITY,
        }
    }

    /// Analyses one 10 ms mono chunk at `sample_rate_hz` and appends one
    /// probability and one RMS value to the histories.
    pub fn process_chunk(&mut self, chunk: &[i16], sample_rate_hz: u32) -> Result<(), VadError> {
        if !SUPPORTED_RATES_HZ.contains(&sample_rate_hz) {
            return Err(VadError::UnsupportedSampleRate(sample_rate_hz));
        }
        if chunk.len() != sample_rate_hz as usize / 100 {
            return Err(VadError::InvalidFrameLength {
                len: chunk.len(),
                sample_rate_hz,
            });
        }

        let resampler = match self.resampler.take() {
            Some(mut resampler) => {
                resampler.reset_if_needed(sample_rate_hz, ANALYSIS_RATE_HZ, 1)?;
                resampler
            }
            None => Resampler::new(sample_rate_hz, ANALYSIS_RATE_HZ, 1)?,
        };
        let resampled = self.resampler.insert(resampler).process_i16(chunk)?;
        let n = resampled.len().min(FRAME_LENGTH);
        self.frame[..n].copy_from_slice(&resampled[..n]);
        self.frame[n..].fill(0);

        let rms = root_mean_square_s16(&self.frame);
        self.level.analyze_i16(&self.frame);
        let silent = self.level.average() >= SILENCE_LEVEL;

        let probability = if silent {
            NON_SPEECH_PROBABILITY
        } else {
            self.standalone.add_audio(&self.frame)?;
            let prior = self.standalone.get_activity(1)?[0];
            self.refine(prior, rms)
        };

        self.chunkwise_voice_probabilities.push(probability);
        self.chunkwise_rms.push(rms);
        self.last_voice_probability = probability;
        Ok(())
    }

    /// Combines the frame decision with the chunk's SNR against the noise
    /// estimate.
    fn refine(&mut self, prior: f64, rms: f64) -> f64 {
        let snr_db = 20.0 * (rms / self.noise_rms).log10();
        let likelihood_ratio = ((snr_db - NEUTRAL_SNR_DB) / SNR_SLOPE_DB).exp();

        if rms < self.noise_rms {
            self.noise_rms = rms.max(1.0);
        } else {
            self.noise_rms *= NOISE_RISE;
        }

        let posterior = prior * likelihood_ratio / (prior * likelihood_ratio + (1.0 - prior));
        posterior.clamp(NON_SPEECH_PROBABILITY, MAX_PROBABILITY)
    }

    /// Voice probability of every chunk since the last
    /// [`clear_history`](Self::clear_history).
    pub fn chunkwise_voice_probabilities(&self) -> &[f64] {
        &self.chunkwise_voice_probabilities
    }

    /// RMS (S16 scale) of every chunk since the last
    /// [`clear_history`](Self::clear_history).
    pub fn chunkwise_rms(&self) -> &[f64] {
        &self.chunkwise_rms
    }

    pub fn last_voice_probability(&self) -> f64 {
        self.last_voice_probability
    }

    /// Drops the per-chunk histories. The detector never prunes them itself.
    pub fn clear_history(&mut self) {
        self.chunkwise_voice_probabilities.clear();
        self.chunkwise_rms.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;
    use std::fmt::Debug;

    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;

    fn tone(rate: u32, amplitude: f32) -> Vec<i16> {
        (0..rate as usize / 100)
            .map(|n| (amplitude * (2.0 * PI * 440.0 * n as f32 / rate as f32).sin()) as i16)
            .collect()
    }

    #[test]
    fn silence_then_tone_raises_probability() {
        let mut vad = VoiceActivityDetector::new();
        vad.process_chunk(&[0; 480], 48000).unwrap();
        let silent = vad.last_voice_probability();
        vad.process_chunk(&tone(48000, 20000.0), 48000).unwrap();
        assert!(vad.last_voice_probability() > silent);
    }

    #[test]
    fn histories_grow_until_cleared() {
        let mut vad = VoiceActivityDetector::new();
        for _ in 0..5 {
            vad.process_chunk(&tone(16000, 3000.0), 16000).unwrap();
        }
        assert_eq!(vad.chunkwise_voice_probabilities().len(), 5);
        assert_eq!(vad.chunkwise_rms().len(), 5);
        assert!(vad.chunkwise_rms().iter().all(|&rms| rms > 1000.0));

        vad.clear_history();
        assert!(vad.chunkwise_voice_probabilities().is_empty());
        assert!(vad.chunkwise_rms().is_empty());
    }

    #[test]
    fn silence_reports_low_probability() {
        let mut vad = VoiceActivityDetector::new();
        for _ in 0..10 {
            vad.process_chunk(&[0; 320], 32000).unwrap();
        }
        assert!(
            vad.chunkwise_voice_probabilities()
                .iter()
                .all(|&p| p == NON_SPEECH_PROBABILITY)
        );
        assert!(vad.chunkwise_rms().iter().all(|&rms| rms == 0.0));
    }

    #[test]
    fn rejects_unsupported_input() {
        let mut vad = VoiceActivityDetector::new();
        assert_eq!(
            vad.process_chunk(&[0; 441], 44100),
            Err(VadError::UnsupportedSampleRate(44100))
        );
        assert!(matches!(
            vad.process_chunk(&[0; 100], 16000),
            Err(VadError::InvalidFrameLength { len: 100, .. })
        ));
        assert!(vad.chunkwise_rms().is_empty());
    }

    #[proptest]
    fn probabilities_stay_in_unit_range(
        #[strategy(prop::sample::select(vec![8000u32, 16000, 32000, 48000]))] rate: u32,
        #[strategy(prop::collection::vec(0.0f32..30000.0, 1..20))] amplitudes: Vec<f32>,
    ) {
        let mut vad = VoiceActivityDetector::new();
        for amplitude in &amplitudes {
            vad.process_chunk(&tone(rate, *amplitude), rate).unwrap();
        }
        prop_assert_eq!(vad.chunkwise_voice_probabilities().len(), amplitudes.len());
        for &p in vad.chunkwise_voice_probabilities() {
            prop_assert!((0.0..=1.0).contains(&p));
        }
    }
}
