#![doc = include_str!("../README.md")]

#![deny(unsafe_code)]

pub mod audio_util;
pub mod cascaded_biquad_filter;
pub mod resampler;
pub mod rms_level;

pub use resampler::{Resampler, ResamplerError};
pub use rms_level::{Levels, RmsLevel};
