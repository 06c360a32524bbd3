//! Error and warning codes of the pipeline.

use antiphon_aec::AecError;
use antiphon_agc::AgcError;
use antiphon_common_audio::ResamplerError;
use antiphon_vad::VadError;
use derive_more::{Display, Error};

/// Errors returned by [`AudioProcessing`](crate::AudioProcessing) and the
/// utility engines.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    #[display("unspecified error")]
    Unspecified,
    #[display("a submodule could not be created for the stream format")]
    Initialization,
    #[display("unsupported component")]
    UnsupportedComponent,
    #[display("bad parameter")]
    BadParameter,
    #[display("bad sample rate")]
    BadSampleRate,
    #[display("buffer length does not match the stream format")]
    BadDataLength,
    #[display("bad number of channels")]
    BadNumberChannels,
    #[display("a required stream parameter was never set")]
    StreamParameterNotSet,
    #[display("the submodule is not enabled")]
    NotEnabled,
    #[display("processing failed")]
    Processing,
}

impl Error {
    /// Stable integer code of the error.
    pub fn code(self) -> i32 {
        match self {
            Self::Unspecified | Self::Processing => -1,
            Self::Initialization => -2,
            Self::UnsupportedComponent => -3,
            Self::BadParameter => -6,
            Self::BadSampleRate => -7,
            Self::BadDataLength => -8,
            Self::BadNumberChannels => -9,
            Self::StreamParameterNotSet => -11,
            Self::NotEnabled => -12,
        }
    }
}

/// Non-fatal conditions. Processing went ahead with reduced quality.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Warning {
    /// The stream delay was not set for this block, was clamped, or the
    /// analog level was never set.
    #[display("bad stream parameter")]
    BadStreamParameter,
}

impl Warning {
    pub fn code(self) -> i32 {
        match self {
            Self::BadStreamParameter => -13,
        }
    }
}

impl From<ResamplerError> for Error {
    fn from(err: ResamplerError) -> Self {
        match err {
            ResamplerError::InvalidRate { .. } => Self::BadSampleRate,
            ResamplerError::InvalidChannelCount => Self::BadNumberChannels,
            ResamplerError::InputLength { .. } | ResamplerError::OutputTooSmall { .. } => {
                Self::BadDataLength
            }
        }
    }
}

impl From<VadError> for Error {
    fn from(err: VadError) -> Self {
        match err {
            VadError::InvalidMode(_) => Self::BadParameter,
            VadError::InvalidFrameLength { .. } => Self::BadDataLength,
            VadError::UnsupportedSampleRate(_) => Self::BadSampleRate,
            VadError::NothingBuffered | VadError::NotEnoughSlots { .. } => Self::Processing,
            VadError::Resampler(err) => err.into(),
        }
    }
}

impl From<AecError> for Error {
    fn from(_: AecError) -> Self {
        Self::Initialization
    }
}

impl From<AgcError> for Error {
    fn from(err: AgcError) -> Self {
        match err {
            AgcError::TargetLevelOutOfRange(_) | AgcError::CompressionGainOutOfRange(_) => {
                Self::BadParameter
            }
            AgcError::Vad(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_the_c_api() {
        assert_eq!(Error::Unspecified.code(), -1);
        assert_eq!(Error::Initialization.code(), -2);
        assert_eq!(Error::UnsupportedComponent.code(), -3);
        assert_eq!(Error::BadParameter.code(), -6);
        assert_eq!(Error::BadSampleRate.code(), -7);
        assert_eq!(Error::BadDataLength.code(), -8);
        assert_eq!(Error::BadNumberChannels.code(), -9);
        assert_eq!(Error::StreamParameterNotSet.code(), -11);
        assert_eq!(Error::NotEnabled.code(), -12);
        assert_eq!(Warning::BadStreamParameter.code(), -13);
    }

    #[test]
    fn component_errors_convert() {
        assert_eq!(
            Error::from(VadError::NothingBuffered),
            Error::Processing
        );
        assert_eq!(
            Error::from(ResamplerError::InputLength {
                len: 3,
                num_channels: 2
            }),
            Error::BadDataLength
        );
        assert_eq!(
            Error::from(AgcError::TargetLevelOutOfRange(40)),
            Error::BadParameter
        );
        assert_eq!(
            Error::from(AecError::UnsupportedSampleRate(44100)),
            Error::Initialization
        );
        assert_eq!(
            Error::from(VadError::Resampler(ResamplerError::InvalidChannelCount)),
            Error::BadNumberChannels
        );
    }
}
