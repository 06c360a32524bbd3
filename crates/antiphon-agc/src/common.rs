//! Shared constants and level helpers.

use antiphon_common_audio::audio_util::{MAX_ABS_FLOAT_S16_VALUE, db_to_ratio, float_s16_to_dbfs};

/// Duration of one audio frame in milliseconds.
pub const FRAME_DURATION_MS: u32 = 10;
/// Number of sub-frames per frame used for gain interpolation.
pub const SUB_FRAMES_IN_FRAME: usize = 20;

pub const MIN_ANALOG_LEVEL: i32 = 0;
pub const MAX_ANALOG_LEVEL: i32 = 255;

/// Peak level the limiter of the digital-only controller allows.
pub const LIMITER_THRESHOLD_DBFS: f32 = -1.0;

/// Speech probability above which a frame counts as speech.
pub const VAD_CONFIDENCE_THRESHOLD: f64 = 0.95;

/// Frames quieter than this carry no level information.
pub const SILENCE_THRESHOLD_DBFS: f32 = -60.0;

/// Converts a dBFS value to a FloatS16 amplitude.
pub fn dbfs_to_float_s16(v: f32) -> f32 {
    db_to_ratio(v) * MAX_ABS_FLOAT_S16_VALUE
}

/// Largest absolute sample over all channels.
pub fn frame_peak(frame: &[Vec<f32>]) -> f32 {
    frame
        .iter()
        .flatten()
        .fold(0.0f32, |peak, &x| peak.max(x.abs()))
}

/// Peak level of the frame in dBFS.
pub fn frame_peak_dbfs(frame: &[Vec<f32>]) -> f32 {
    float_s16_to_dbfs(frame_peak(frame))
}
