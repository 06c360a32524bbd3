//! Digital-only adaptive gain controller.

use antiphon_common_audio::audio_util::{db_to_ratio, downmix_to_mono, float_s16_to_dbfs, float_s16_to_s16, mean_square};
use antiphon_vad::VoiceActivityDetector;
use derive_more::Debug;
use tracing::debug;

use crate::AgcError;
use crate::common::{FRAME_DURATION_MS, LIMITER_THRESHOLD_DBFS, VAD_CONFIDENCE_THRESHOLD};
use crate::gain_applier::GainApplier;
use crate::limiter::Limiter;

/// Speech RMS level the controller aims for.
const TARGET_SPEECH_LEVEL_DBFS: f32 = -20.0;
const INITIAL_SPEECH_LEVEL_DBFS: f32 = -50.0;
const MAX_GAIN_DB: f32 = 30.0;
/// Amplified noise must stay below this level.
const MAX_OUTPUT_NOISE_LEVEL_DBFS: f32 = -50.0;
const INITIAL_NOISE_LEVEL_DBFS: f32 = -70.0;
/// Per-frame rise of the noise estimate while frames are louder.
const NOISE_LEVEL_RISE_DB: f32 = 0.05;

const MAX_GAIN_INCREASE_DB_PER_SECOND: f32 = 3.0;
const MAX_GAIN_DECREASE_DB_PER_SECOND: f32 = 50.0;
/// Speech time after which the level estimate has mostly converged.
const LEVEL_ESTIMATOR_TIME_TO_CONFIDENCE_MS: f32 = 400.0;

/// Adaptive digital gain followed by a limiter.
///
/// Every frame runs through a [`VoiceActivityDetector`]. Frames it is
/// confident about update the speech level estimate; the rest feed a noise
/// floor estimate. The gain moves towards the value that puts speech at the
/// target level without lifting the noise above a fixed ceiling.
#[derive(Debug)]
pub struct GainController2 {
    sample_rate_hz: u32,
    vad: VoiceActivityDetector,
    speech_level_dbfs: f32,
    noise_level_dbfs: f32,
    gain_db: f32,
    gain_applier: GainApplier,
    limiter: Limiter,
    last_voice_probability: Option<f64>,
    #[debug(skip)]
    mono: Vec<f32>,
    #[debug(skip)]
    mono_s16: Vec<i16>,
}

impl GainController2 {
    pub fn new(sample_rate_hz: u32) -> Self {
        debug!(sample_rate_hz, "creating gain controller 2");
        let frame_len = sample_rate_hz as usize * FRAME_DURATION_MS as usize / 1000;
        let mut s = Self {
            sample_rate_hz,
            vad: VoiceActivityDetector::new(),
            speech_level_dbfs: INITIAL_SPEECH_LEVEL_DBFS,
            noise_level_dbfs: INITIAL_NOISE_LEVEL_DBFS,
            gain_db: 0.0,
            gain_applier: GainApplier::new(1.0),
            limiter: Limiter::new(LIMITER_THRESHOLD_DBFS),
            last_voice_probability: None,
            mono: vec![0.0; frame_len],
            mono_s16: vec![0; frame_len],
        };
        s.reset();
        s
    }

    pub fn reset(&mut self) {
        self.vad = VoiceActivityDetector::new();
        self.speech_level_dbfs = INITIAL_SPEECH_LEVEL_DBFS;
        self.noise_level_dbfs = INITIAL_NOISE_LEVEL_DBFS;
        self.gain_db = 0.0;
        self.gain_applier.set_gain(1.0);
        self.limiter.reset();
        self.last_voice_probability = None;
    }

    /// Processes one frame in place. While `key_pressed` is set the gain is
    /// held.
    pub fn process(&mut self, frame: &mut [Vec<f32>], key_pressed: bool) -> Result<(), AgcError> {
        let len = frame.first().map_or(0, Vec::len);
        self.mono.resize(len, 0.0);
        self.mono_s16.resize(len, 0);
        downmix_to_mono(frame, &mut self.mono);
        for (dst, &src) in self.mono_s16.iter_mut().zip(&self.mono) {
            *dst = float_s16_to_s16(src);
        }

        self.vad.process_chunk(&self.mono_s16, self.sample_rate_hz)?;
        let probability = self.vad.last_voice_probability();
        // Only the latest chunk is needed.
        self.vad.clear_history();
        self.last_voice_probability = Some(probability);

        let level_dbfs = float_s16_to_dbfs(mean_square(&self.mono).sqrt());
        if probability >= VAD_CONFIDENCE_THRESHOLD {
            let weight = FRAME_DURATION_MS as f32 / LEVEL_ESTIMATOR_TIME_TO_CONFIDENCE_MS;
            self.speech_level_dbfs += weight * (level_dbfs - self.speech_level_dbfs);
        } else if level_dbfs < self.noise_level_dbfs {
            self.noise_level_dbfs = level_dbfs;
        } else {
            self.noise_level_dbfs = (self.noise_level_dbfs + NOISE_LEVEL_RISE_DB).min(level_dbfs);
        }

        if !key_pressed {
            self.update_gain();
        }
        self.gain_applier.apply(db_to_ratio(self.gain_db), frame);
        self.limiter.process(frame);
        Ok(())
    }

    fn update_gain(&mut self) {
        let target_db = (TARGET_SPEECH_LEVEL_DBFS - self.speech_level_dbfs)
            .min(MAX_OUTPUT_NOISE_LEVEL_DBFS - self.noise_level_dbfs)
            .clamp(0.0, MAX_GAIN_DB);
        let frame_s = FRAME_DURATION_MS as f32 / 1000.0;
        let delta = (target_db - self.gain_db).clamp(
            -MAX_GAIN_DECREASE_DB_PER_SECOND * frame_s,
            MAX_GAIN_INCREASE_DB_PER_SECOND * frame_s,
        );
        self.gain_db += delta;
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    /// Speech probability of the last processed frame.
    pub fn last_voice_probability(&self) -> Option<f64> {
        self.last_voice_probability
    }

    pub fn speech_level_dbfs(&self) -> f32 {
        self.speech_level_dbfs
    }
}
