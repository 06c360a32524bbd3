//! Pipeline configuration.
//!
//! A [`Config`] is a plain value: build it, hand it to
//! [`AudioProcessingBuilder::config`](crate::AudioProcessingBuilder::config)
//! or [`AudioProcessing::apply_config`](crate::AudioProcessing::apply_config),
//! and read back the effective configuration with
//! [`AudioProcessing::get_config`](crate::AudioProcessing::get_config).

use antiphon_agc::{Agc1Config, Agc1Mode};
use antiphon_ns::{NsConfig, SuppressionLevel};
use tracing::warn;

use crate::Error;

/// Top-level configuration. Every submodule is disabled by default.
///
/// # Example
///
/// ```
/// use antiphon::Config;
/// use antiphon::config::{EchoCanceller, NoiseSuppression, NoiseSuppressionLevel};
///
/// let config = Config {
///     echo_canceller: EchoCanceller {
///         enabled: true,
///         ..Default::default()
///     },
///     noise_suppression: NoiseSuppression {
///         enabled: true,
///         level: NoiseSuppressionLevel::High,
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    pub high_pass_filter: HighPassFilter,
    pub echo_canceller: EchoCanceller,
    pub noise_suppression: NoiseSuppression,
    pub gain_controller1: GainController1,
    pub gain_controller2: GainController2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighPassFilter {
    pub enabled: bool,
    /// Filter the full-band signal rather than only the lowest band
    /// (default: true). The pipeline processes full-band frames, so both
    /// settings behave the same.
    pub apply_in_full_band: bool,
}

impl Default for HighPassFilter {
    fn default() -> Self {
        Self {
            enabled: false,
            apply_in_full_band: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoCanceller {
    pub enabled: bool,
    /// Use the low-complexity canceller with a shorter echo tail. Requires
    /// the stream delay to be set.
    pub mobile_mode: bool,
    /// Keep the linear filter output of every frame for
    /// [`AudioProcessing::linear_aec_output`](crate::AudioProcessing::linear_aec_output).
    /// Not available in mobile mode.
    pub export_linear_aec_output: bool,
    /// Turn the high-pass filter on while the canceller runs (default:
    /// true). No effect in mobile mode.
    pub enforce_high_pass_filtering: bool,
}

impl Default for EchoCanceller {
    fn default() -> Self {
        Self {
            enabled: false,
            mobile_mode: false,
            export_linear_aec_output: false,
            enforce_high_pass_filtering: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoiseSuppression {
    pub enabled: bool,
    pub level: NoiseSuppressionLevel,
    /// Estimate the noise on the linear echo canceller output when it is
    /// exported. The gains are still applied to the echo-cancelled signal.
    pub analyze_linear_aec_output_when_available: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NoiseSuppressionLevel {
    /// About 6 dB.
    Low,
    /// About 12 dB.
    #[default]
    Moderate,
    /// About 18 dB.
    High,
    /// About 21 dB.
    VeryHigh,
}

impl From<NoiseSuppressionLevel> for SuppressionLevel {
    fn from(level: NoiseSuppressionLevel) -> Self {
        match level {
            NoiseSuppressionLevel::Low => Self::K6dB,
            NoiseSuppressionLevel::Moderate => Self::K12dB,
            NoiseSuppressionLevel::High => Self::K18dB,
            NoiseSuppressionLevel::VeryHigh => Self::K21dB,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainController1 {
    pub enabled: bool,
    pub mode: GainController1Mode,
    /// Target peak level in dB below full scale, `0..=31`.
    pub target_level_dbfs: i32,
    /// Maximum digital gain in dB, `0..=90`.
    pub compression_gain_db: i32,
    pub enable_limiter: bool,
}

impl Default for GainController1 {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: GainController1Mode::AdaptiveAnalog,
            target_level_dbfs: 3,
            compression_gain_db: 9,
            enable_limiter: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GainController1Mode {
    #[default]
    AdaptiveAnalog,
    AdaptiveDigital,
    FixedDigital,
}

impl GainController1 {
    pub(crate) fn agc1_config(&self) -> Agc1Config {
        Agc1Config {
            mode: match self.mode {
                GainController1Mode::AdaptiveAnalog => Agc1Mode::AdaptiveAnalog,
                GainController1Mode::AdaptiveDigital => Agc1Mode::AdaptiveDigital,
                GainController1Mode::FixedDigital => Agc1Mode::FixedDigital,
            },
            target_level_dbfs: self.target_level_dbfs,
            compression_gain_db: self.compression_gain_db,
            enable_limiter: self.enable_limiter,
        }
    }

    pub(crate) fn is_analog(&self) -> bool {
        self.enabled && self.mode == GainController1Mode::AdaptiveAnalog
    }
}

/// The digital-only gain controller has no tuning knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GainController2 {
    pub enabled: bool,
}

impl NoiseSuppression {
    pub(crate) fn ns_config(&self) -> NsConfig {
        NsConfig {
            target_level: self.level.into(),
        }
    }
}

impl Config {
    /// Checks parameter ranges. Disabled submodules are checked too.
    pub fn validate(&self) -> Result<(), Error> {
        self.gain_controller1.agc1_config().validate().map_err(|err| {
            warn!(%err, "rejecting configuration");
            Error::from(err)
        })
    }

    /// The configuration the pipeline actually runs.
    ///
    /// The high-pass filter is switched on when a full-mode echo canceller
    /// enforces it, and the linear output export is dropped in mobile mode.
    pub(crate) fn effective(&self) -> Self {
        let mut config = *self;
        let ec = &mut config.echo_canceller;
        if ec.enabled && !ec.mobile_mode && ec.enforce_high_pass_filtering {
            config.high_pass_filter.enabled = true;
        }
        if ec.mobile_mode {
            ec.export_linear_aec_output = false;
        }
        config
    }

    /// Whether the linear canceller output is kept for each frame.
    pub(crate) fn linear_output_exported(&self) -> bool {
        let ec = &self.echo_canceller;
        ec.enabled && !ec.mobile_mode && ec.export_linear_aec_output
    }

    /// Whether the noise suppressor estimates on the linear output.
    pub(crate) fn noise_suppression_on_linear_output(&self) -> bool {
        self.noise_suppression.enabled
            && self.noise_suppression.analyze_linear_aec_output_when_available
            && self.linear_output_exported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_all_disabled() {
        let config = Config::default();
        assert!(!config.high_pass_filter.enabled);
        assert!(config.high_pass_filter.apply_in_full_band);
        assert!(!config.echo_canceller.enabled);
        assert!(config.echo_canceller.enforce_high_pass_filtering);
        assert!(!config.noise_suppression.enabled);
        assert_eq!(config.noise_suppression.level, NoiseSuppressionLevel::Moderate);
        assert!(!config.gain_controller1.enabled);
        assert!(!config.gain_controller2.enabled);
    }

    #[test]
    fn gain_controller1_defaults() {
        let agc = GainController1::default();
        assert_eq!(agc.mode, GainController1Mode::AdaptiveAnalog);
        assert_eq!(agc.target_level_dbfs, 3);
        assert_eq!(agc.compression_gain_db, 9);
        assert!(agc.enable_limiter);
    }

    #[test]
    fn validate_checks_gain_ranges() {
        let mut config = Config::default();
        config.gain_controller1.target_level_dbfs = 32;
        assert_eq!(config.validate(), Err(Error::BadParameter));
        config.gain_controller1.target_level_dbfs = 31;
        config.gain_controller1.compression_gain_db = 91;
        assert_eq!(config.validate(), Err(Error::BadParameter));
        config.gain_controller1.compression_gain_db = 0;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn full_mode_canceller_enforces_high_pass() {
        let mut config = Config::default();
        config.echo_canceller.enabled = true;
        assert!(config.effective().high_pass_filter.enabled);

        config.echo_canceller.enforce_high_pass_filtering = false;
        assert!(!config.effective().high_pass_filter.enabled);

        config.echo_canceller.enforce_high_pass_filtering = true;
        config.echo_canceller.mobile_mode = true;
        assert!(!config.effective().high_pass_filter.enabled);
    }

    #[test]
    fn linear_output_precedence() {
        let mut config = Config::default();
        config.echo_canceller.enabled = true;
        config.echo_canceller.export_linear_aec_output = true;
        config.noise_suppression.enabled = true;
        config.noise_suppression.analyze_linear_aec_output_when_available = true;
        assert!(config.linear_output_exported());
        assert!(config.noise_suppression_on_linear_output());

        config.echo_canceller.mobile_mode = true;
        let effective = config.effective();
        assert!(!effective.echo_canceller.export_linear_aec_output);
        assert!(!effective.linear_output_exported());
        assert!(!effective.noise_suppression_on_linear_output());

        config.echo_canceller.mobile_mode = false;
        config.echo_canceller.export_linear_aec_output = false;
        assert!(!config.noise_suppression_on_linear_output());
    }

    #[test]
    fn suppression_levels_map_in_order() {
        assert_eq!(
            SuppressionLevel::from(NoiseSuppressionLevel::Low),
            SuppressionLevel::K6dB
        );
        assert_eq!(
            SuppressionLevel::from(NoiseSuppressionLevel::VeryHigh),
            SuppressionLevel::K21dB
        );
    }
}
