#![doc = include_str!("../README.md")]

#![deny(unsafe_code)]

use derive_more::{Display, Error};

mod adaptive_filter;
mod echo_canceller;
mod erle_estimator;
mod render_buffer;
mod residual_echo_suppressor;

pub use echo_canceller::{EchoCanceller, EchoCancellerMetrics};

/// Longest render-to-capture delay the render buffer can compensate.
pub const MAX_DELAY_MS: u32 = 500;

/// Errors reported when building an [`EchoCanceller`].
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum AecError {
    #[display("unsupported sample rate {_0} Hz")]
    UnsupportedSampleRate(#[error(not(source))] u32),
    #[display("channel count must be non-zero")]
    InvalidChannelCount,
}
