#![doc = include_str!("../README.md")]

#![deny(unsafe_code)]

use antiphon_common_audio::ResamplerError;
use derive_more::{Display, Error, From};

pub mod standalone_vad;
pub mod vad;
pub mod voice_activity_detector;

pub use standalone_vad::StandaloneVad;
pub use vad::{Vad, VadMode};
pub use voice_activity_detector::VoiceActivityDetector;

/// Errors reported by the detectors.
#[derive(Debug, Display, Error, From, Clone, Copy, PartialEq, Eq)]
pub enum VadError {
    #[display("aggressiveness mode {_0} is not in 0..=3")]
    InvalidMode(#[error(not(source))] i32),
    #[display("{len} samples is not a valid frame length at {sample_rate_hz} Hz")]
    InvalidFrameLength { len: usize, sample_rate_hz: u32 },
    #[display("unsupported sample rate {_0} Hz")]
    UnsupportedSampleRate(#[error(not(source))] u32),
    #[display("no audio buffered for analysis")]
    NothingBuffered,
    #[display("{requested} probabilities requested, {buffered} frames buffered")]
    NotEnoughSlots { requested: usize, buffered: usize },
    #[display("resampling failed: {_0}")]
    #[from]
    Resampler(ResamplerError),
}
