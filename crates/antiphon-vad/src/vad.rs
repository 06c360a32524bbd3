//! Frame-level speech / non-speech classifier.
//!
//! Each frame's level is compared against a running noise floor. The floor
//! drops immediately to quieter frames and creeps up slowly otherwise, so
//! steady background noise is absorbed while onsets stand out. A short
//! hangover keeps the decision active across brief gaps between words.

use antiphon_common_audio::audio_util::{float_s16_to_dbfs, root_mean_square_s16};

use crate::VadError;

const VALID_RATES_HZ: [u32; 4] = [8000, 16000, 32000, 48000];
const VALID_FRAME_MS: [usize; 3] = [10, 20, 30];

/// Initial noise floor, in dBFS.
const INITIAL_NOISE_FLOOR_DBFS: f32 = -60.0;
/// How fast the noise floor follows a louder signal.
const NOISE_FLOOR_RISE_DB_PER_S: f32 = 3.0;

/// Aggressiveness of the classifier. Higher modes report speech less often.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VadMode {
    #[default]
    Quality = 0,
    LowBitrate = 1,
    Aggressive = 2,
    VeryAggressive = 3,
}

impl VadMode {
    /// Margin above the noise floor a frame needs to count as speech.
    fn margin_db(self) -> f32 {
        match self {
            Self::Quality => 6.0,
            Self::LowBitrate => 9.0,
            Self::Aggressive => 12.0,
            Self::VeryAggressive => 15.0,
        }
    }

    /// Frames quieter than this are never speech.
    fn min_level_dbfs(self) -> f32 {
        match self {
            Self::Quality => -66.0,
            Self::LowBitrate => -62.0,
            Self::Aggressive => -58.0,
            Self::VeryAggressive => -54.0,
        }
    }

    fn hangover_ms(self) -> u32 {
        match self {
            Self::Quality => 80,
            Self::LowBitrate => 60,
            Self::Aggressive => 40,
            Self::VeryAggressive => 20,
        }
    }
}

impl TryFrom<i32> for VadMode {
    type Error = VadError;

    fn try_from(mode: i32) -> Result<Self, Self::Error> {
        match mode {
            0 => Ok(Self::Quality),
            1 => Ok(Self::LowBitrate),
            2 => Ok(Self::Aggressive),
            3 => Ok(Self::VeryAggressive),
            other => Err(VadError::InvalidMode(other)),
        }
    }
}

impl From<VadMode> for i32 {
    fn from(mode: VadMode) -> Self {
        mode as Self
    }
}

#[derive(Debug, Clone)]
pub struct Vad {
    mode: VadMode,
    noise_floor_dbfs: f32,
    hangover_left_ms: u32,
}

impl Default for Vad {
    fn default() -> Self {
        Self::new()
    }
}

impl Vad {
    pub fn new() -> Self {
        Self::with_mode(VadMode::default())
    }

    pub fn with_mode(mode: VadMode) -> Self {
        Self {
            mode,
            noise_floor_dbfs: INITIAL_NOISE_FLOOR_DBFS,
            hangover_left_ms: 0,
        }
    }

    /// Sets the aggressiveness mode, `0..=3`.
    pub fn set_mode(&mut self, mode: i32) -> Result<(), VadError> {
        self.mode = VadMode::try_from(mode)?;
        Ok(())
    }

    pub fn mode(&self) -> VadMode {
        self.mode
    }

    /// Whether `frame_length` samples at `sample_rate_hz` is a frame the
    /// classifier accepts (10, 20 or 30 ms at 8, 16, 32 or 48 kHz).
    pub fn is_valid_config(sample_rate_hz: u32, frame_length: usize) -> bool {
        VALID_RATES_HZ.contains(&sample_rate_hz)
            && VALID_FRAME_MS
                .iter()
                .any(|&ms| frame_length == sample_rate_hz as usize * ms / 1000)
    }

    /// Classifies one frame and updates the noise floor.
    pub fn is_speech(&mut self, frame: &[i16], sample_rate_hz: u32) -> Result<bool, VadError> {
        if !VALID_RATES_HZ.contains(&sample_rate_hz) {
            return Err(VadError::UnsupportedSampleRate(sample_rate_hz));
        }
        if !Self::is_valid_config(sample_rate_hz, frame.len()) {
            return Err(VadError::InvalidFrameLength {
                len: frame.len(),
                sample_rate_hz,
            });
        }
        let frame_ms = (frame.len() * 1000 / sample_rate_hz as usize) as u32;
        let level_dbfs = float_s16_to_dbfs(root_mean_square_s16(frame) as f32);

        let active = level_dbfs >= self.mode.min_level_dbfs()
            && level_dbfs > self.noise_floor_dbfs + self.mode.margin_db();

        if level_dbfs < self.noise_floor_dbfs {
            self.noise_floor_dbfs = level_dbfs.max(INITIAL_NOISE_FLOOR_DBFS);
        } else {
            let rise = NOISE_FLOOR_RISE_DB_PER_S * frame_ms as f32 / 1000.0;
            self.noise_floor_dbfs = (self.noise_floor_dbfs + rise).min(level_dbfs);
        }

        if active {
            self.hangover_left_ms = self.mode.hangover_ms();
            return Ok(true);
        }
        if self.hangover_left_ms > 0 {
            self.hangover_left_ms = self.hangover_left_ms.saturating_sub(frame_ms);
            return Ok(true);
        }
        Ok(false)
    }
}
