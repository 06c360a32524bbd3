#![doc = include_str!("../README.md")]

#![deny(unsafe_code)]

mod audio_processing;
pub(crate) mod audio_processing_impl;
pub mod config;
pub mod error;
pub(crate) mod high_pass_filter;
pub(crate) mod output_resampler;
pub mod stats;
pub mod stream_config;
pub(crate) mod submodule_states;

// Public re-exports.
pub use audio_processing::{AudioProcessing, AudioProcessingBuilder};
pub use config::Config;
pub use error::{Error, Warning};
pub use stats::AudioProcessingStats;
pub use stream_config::{
    DEFAULT_BLOCK_MS, DEFAULT_NUM_CHANNELS, DEFAULT_SAMPLE_RATE_HZ, StreamConfig, frame_size,
};

// Standalone utility engines.
pub use antiphon_common_audio::{Levels, Resampler, RmsLevel};
pub use antiphon_vad::{StandaloneVad, Vad, VadMode, VoiceActivityDetector};
