#![doc = include_str!("../README.md")]

#![deny(unsafe_code)]

use antiphon_vad::VadError;
use derive_more::{Display, Error, From};

pub mod common;
pub(crate) mod gain_applier;
pub mod gain_controller1;
pub mod gain_controller2;
pub mod limiter;

pub use gain_controller1::{Agc1Config, Agc1Mode, GainController1};
pub use gain_controller2::GainController2;
pub use limiter::Limiter;

#[derive(Debug, Display, Error, From, Clone, Copy, PartialEq, Eq)]
pub enum AgcError {
    #[display("target level {_0} dBFS is not in 0..=31")]
    TargetLevelOutOfRange(#[error(not(source))] i32),
    #[display("compression gain {_0} dB is not in 0..=90")]
    CompressionGainOutOfRange(#[error(not(source))] i32),
    #[display("voice activity detection failed: {_0}")]
    #[from]
    Vad(VadError),
}
