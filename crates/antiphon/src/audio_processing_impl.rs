//! Submodule composition and the per-frame render and capture paths.
//!
//! [`ProcessingCore`] owns the deinterleaved frame buffers and every
//! enabled submodule. The public facade fills the buffers, calls
//! [`ProcessingCore::process_render`] or [`ProcessingCore::process_capture`]
//! and interleaves the result back.

use antiphon_aec::{EchoCanceller, MAX_DELAY_MS};
use antiphon_agc::{GainController1, GainController2};
use antiphon_common_audio::audio_util::downmix_to_mono;
use antiphon_common_audio::{Resampler, RmsLevel};
use antiphon_ns::NoiseSuppressor;
use derive_more::Debug;
use tracing::debug;

use crate::Error;
use crate::config::Config;
use crate::high_pass_filter::HighPassFilter;
use crate::stats::AudioProcessingStats;
use crate::stream_config::StreamConfig;
use crate::submodule_states::SubmoduleStates;

/// Caller-provided stream parameters for one capture frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CaptureContext {
    pub(crate) stream_delay_ms: i32,
    pub(crate) key_pressed: bool,
}

#[derive(Debug, Default)]
struct Submodules {
    high_pass_filter: Option<HighPassFilter>,
    echo_canceller: Option<EchoCanceller>,
    noise_suppressor: Option<NoiseSuppressor>,
    gain_controller1: Option<GainController1>,
    gain_controller2: Option<GainController2>,
}

#[derive(Debug)]
pub(crate) struct ProcessingCore {
    /// Effective configuration.
    config: Config,
    submodule_states: SubmoduleStates,
    capture_config: StreamConfig,
    submodules: Submodules,
    /// Brings the mono render signal to the capture rate.
    render_resampler: Option<Resampler>,
    output_level: RmsLevel,
    /// Analog level handed to a newly created gain controller.
    stream_analog_level: i32,
    #[debug(skip)]
    pub(crate) capture: Vec<Vec<f32>>,
    #[debug(skip)]
    pub(crate) render: Vec<Vec<f32>>,
    #[debug(skip)]
    render_mono: Vec<f32>,
    #[debug(skip)]
    render_resampled: Vec<Vec<f32>>,
}

impl ProcessingCore {
    /// Creates every submodule `config` enables for the given formats.
    ///
    /// `config` must already be the effective configuration.
    pub(crate) fn new(
        config: &Config,
        capture_config: StreamConfig,
        render_config: StreamConfig,
        stream_analog_level: i32,
    ) -> Result<Self, Error> {
        for stream in [&capture_config, &render_config] {
            if !stream.is_native_rate() || stream.num_channels() == 0 {
                return Err(Error::Initialization);
            }
        }
        let capture_frames = capture_config.num_frames();
        let render_frames = render_config.num_frames();

        let render_resampler = (render_config.sample_rate_hz() != capture_config.sample_rate_hz())
            .then(|| {
                Resampler::new(
                    render_config.sample_rate_hz(),
                    capture_config.sample_rate_hz(),
                    1,
                )
            })
            .transpose()
            .map_err(|_| Error::Initialization)?;
        let resampled_len = render_resampler
            .as_ref()
            .map_or(0, |resampler| resampler.max_output_len(render_frames));

        let submodules = Submodules {
            high_pass_filter: create_high_pass_filter(config, &capture_config),
            echo_canceller: create_echo_canceller(config, &capture_config)?,
            noise_suppressor: create_noise_suppressor(config, &capture_config),
            gain_controller1: create_gain_controller1(config, stream_analog_level)?,
            gain_controller2: create_gain_controller2(config, &capture_config),
        };

        debug!(
            capture_rate = capture_config.sample_rate_hz(),
            capture_channels = capture_config.num_channels(),
            render_rate = render_config.sample_rate_hz(),
            render_channels = render_config.num_channels(),
            "initialized processing pipeline"
        );

        Ok(Self {
            config: *config,
            submodule_states: SubmoduleStates::from_config(config),
            capture_config,
            submodules,
            render_resampler,
            output_level: RmsLevel::new(),
            stream_analog_level,
            capture: vec![vec![0.0; capture_frames]; usize::from(capture_config.num_channels())],
            render: vec![vec![0.0; render_frames]; usize::from(render_config.num_channels())],
            render_mono: vec![0.0; render_frames],
            render_resampled: vec![Vec::with_capacity(resampled_len)],
        })
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn submodule_states(&self) -> SubmoduleStates {
        self.submodule_states
    }

    /// Switches to a new effective configuration, recreating only the
    /// submodules whose settings changed.
    ///
    /// Replacements are built before anything is swapped, so an error leaves
    /// the running pipeline untouched.
    pub(crate) fn apply_config(&mut self, config: &Config) -> Result<(), Error> {
        let old = &self.config;
        let hpf_changed = old.high_pass_filter.enabled != config.high_pass_filter.enabled;
        let ec_changed = old.echo_canceller.enabled != config.echo_canceller.enabled
            || old.echo_canceller.mobile_mode != config.echo_canceller.mobile_mode;
        let ns_changed = old.noise_suppression.enabled != config.noise_suppression.enabled
            || old.noise_suppression.level != config.noise_suppression.level;
        let gc1_changed = old.gain_controller1 != config.gain_controller1;
        let gc2_changed = old.gain_controller2 != config.gain_controller2;

        let echo_canceller = ec_changed
            .then(|| create_echo_canceller(config, &self.capture_config))
            .transpose()?;
        let gain_controller1 = gc1_changed
            .then(|| create_gain_controller1(config, self.stream_analog_level))
            .transpose()?;

        if hpf_changed {
            self.submodules.high_pass_filter = create_high_pass_filter(config, &self.capture_config);
        }
        if let Some(echo_canceller) = echo_canceller {
            self.submodules.echo_canceller = echo_canceller;
        }
        if ns_changed {
            self.submodules.noise_suppressor = create_noise_suppressor(config, &self.capture_config);
        }
        if let Some(gain_controller1) = gain_controller1 {
            self.submodules.gain_controller1 = gain_controller1;
        }
        if gc2_changed {
            self.submodules.gain_controller2 = create_gain_controller2(config, &self.capture_config);
        }

        self.config = *config;
        if self
            .submodule_states
            .update(SubmoduleStates::from_config(config))
        {
            debug!(states = ?self.submodule_states, "active submodules changed");
        }
        Ok(())
    }

    /// Forwards the hardware analog level to the gain controller.
    pub(crate) fn set_stream_analog_level(&mut self, level: i32) {
        self.stream_analog_level = level;
        if let Some(gc1) = &mut self.submodules.gain_controller1 {
            gc1.set_stream_analog_level(level);
        }
    }

    /// Feeds the render frame in [`Self::render`] to the echo canceller.
    pub(crate) fn process_render(&mut self) -> Result<(), Error> {
        if !self.submodule_states.render_analysis_active() {
            return Ok(());
        }
        let Some(aec) = &mut self.submodules.echo_canceller else {
            return Ok(());
        };
        let Some(resampler) = &mut self.render_resampler else {
            aec.analyze_render(&self.render);
            return Ok(());
        };

        downmix_to_mono(&self.render, &mut self.render_mono);
        let resampled = &mut self.render_resampled[0];
        resampled.resize(resampler.max_output_len(self.render_mono.len()), 0.0);
        let written = resampler.process_f32_into(&self.render_mono, resampled)?;
        resampled.truncate(written);
        aec.analyze_render(&self.render_resampled);
        Ok(())
    }

    /// Runs the capture chain on the frame in [`Self::capture`].
    pub(crate) fn process_capture(&mut self, context: CaptureContext) -> Result<(), Error> {
        if self.submodule_states.capture_processing_active() {
            self.run_capture_chain(context)?;
        }
        for channel in &self.capture {
            self.output_level.analyze_f32(channel);
        }
        Ok(())
    }

    fn run_capture_chain(&mut self, context: CaptureContext) -> Result<(), Error> {
        let submodules = &mut self.submodules;

        if let Some(gc1) = &mut submodules.gain_controller1 {
            gc1.analyze_capture(&self.capture);
        }

        if let Some(hpf) = &mut submodules.high_pass_filter {
            hpf.process(&mut self.capture);
        }

        if let Some(aec) = &mut submodules.echo_canceller {
            let delay_ms = u32::try_from(context.stream_delay_ms).unwrap_or(0);
            aec.set_delay_ms(delay_ms.min(MAX_DELAY_MS));
            aec.process_capture(&mut self.capture, context.key_pressed);
        }

        if let Some(ns) = &mut submodules.noise_suppressor {
            let linear = if self.config.noise_suppression_on_linear_output() {
                submodules
                    .echo_canceller
                    .as_ref()
                    .and_then(EchoCanceller::linear_output)
            } else {
                None
            };
            ns.analyze(linear.unwrap_or(&self.capture), context.key_pressed);
            ns.process(&mut self.capture);
        }

        if let Some(gc1) = &mut submodules.gain_controller1 {
            gc1.process(&mut self.capture);
        }

        if let Some(gc2) = &mut submodules.gain_controller2 {
            gc2.process(&mut self.capture, context.key_pressed)?;
        }
        Ok(())
    }

    pub(crate) fn recommended_analog_level(&self) -> Option<i32> {
        self.submodules
            .gain_controller1
            .as_ref()
            .map(GainController1::recommended_analog_level)
    }

    /// The linear echo canceller output of the last capture frame, when it
    /// is exported.
    pub(crate) fn linear_aec_output(&self) -> Option<&[Vec<f32>]> {
        if !self.config.linear_output_exported() {
            return None;
        }
        self.submodules
            .echo_canceller
            .as_ref()
            .and_then(EchoCanceller::linear_output)
    }

    /// Collects the statistics. Reading resets the output level meter.
    pub(crate) fn statistics(&mut self) -> AudioProcessingStats {
        let aec_metrics = self
            .submodules
            .echo_canceller
            .as_ref()
            .map(EchoCanceller::metrics);
        AudioProcessingStats {
            output_rms_dbfs: Some(self.output_level.average()),
            voice_probability: self
                .submodules
                .gain_controller2
                .as_ref()
                .and_then(GainController2::last_voice_probability),
            echo_return_loss_enhancement: aec_metrics.map(|m| f64::from(m.erle_db)),
            delay_ms: aec_metrics.and_then(|m| i32::try_from(m.delay_ms).ok()),
        }
    }
}

fn create_high_pass_filter(config: &Config, capture: &StreamConfig) -> Option<HighPassFilter> {
    config.high_pass_filter.enabled.then(|| {
        HighPassFilter::new(capture.sample_rate_hz(), usize::from(capture.num_channels()))
    })
}

fn create_echo_canceller(
    config: &Config,
    capture: &StreamConfig,
) -> Result<Option<EchoCanceller>, Error> {
    let ec = &config.echo_canceller;
    if !ec.enabled {
        return Ok(None);
    }
    let aec = EchoCanceller::new(
        capture.sample_rate_hz(),
        usize::from(capture.num_channels()),
        ec.mobile_mode,
    )
    .map_err(|_| Error::Initialization)?;
    Ok(Some(aec))
}

fn create_noise_suppressor(config: &Config, capture: &StreamConfig) -> Option<NoiseSuppressor> {
    config.noise_suppression.enabled.then(|| {
        NoiseSuppressor::new(
            config.noise_suppression.ns_config(),
            capture.sample_rate_hz(),
            usize::from(capture.num_channels()),
        )
    })
}

fn create_gain_controller1(
    config: &Config,
    stream_analog_level: i32,
) -> Result<Option<GainController1>, Error> {
    if !config.gain_controller1.enabled {
        return Ok(None);
    }
    let mut gc1 = GainController1::new(config.gain_controller1.agc1_config())?;
    gc1.set_stream_analog_level(stream_analog_level);
    Ok(Some(gc1))
}

fn create_gain_controller2(config: &Config, capture: &StreamConfig) -> Option<GainController2> {
    config
        .gain_controller2
        .enabled
        .then(|| GainController2::new(capture.sample_rate_hz()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EchoCanceller as EchoCancellerConfig, GainController1 as Gc1Config};

    fn aec_config(mobile_mode: bool) -> Config {
        Config {
            echo_canceller: EchoCancellerConfig {
                enabled: true,
                mobile_mode,
                export_linear_aec_output: true,
                ..Default::default()
            },
            ..Default::default()
        }
        .effective()
    }

    #[test]
    fn default_config_creates_nothing() {
        let stream = StreamConfig::new(16000, 1);
        let core = ProcessingCore::new(&Config::default(), stream, stream, 0).unwrap();
        assert!(core.submodules.high_pass_filter.is_none());
        assert!(core.submodules.echo_canceller.is_none());
        assert!(core.render_resampler.is_none());
        assert_eq!(core.capture, vec![vec![0.0; 160]]);
    }

    #[test]
    fn rejects_non_native_rate() {
        let capture = StreamConfig::new(44100, 1);
        let render = StreamConfig::new(16000, 1);
        assert_eq!(
            ProcessingCore::new(&Config::default(), capture, render, 0).unwrap_err(),
            Error::Initialization
        );
    }

    #[test]
    fn enforced_high_pass_filter_is_created() {
        let stream = StreamConfig::new(32000, 2);
        let core = ProcessingCore::new(&aec_config(false), stream, stream, 0).unwrap();
        assert!(core.submodules.high_pass_filter.is_some());
        assert!(core.submodules.echo_canceller.is_some());
        assert_eq!(core.capture.len(), 2);
    }

    #[test]
    fn render_is_resampled_to_the_capture_rate() {
        let capture = StreamConfig::new(16000, 1);
        let render = StreamConfig::new(48000, 2);
        let mut core = ProcessingCore::new(&aec_config(false), capture, render, 0).unwrap();
        assert!(core.render_resampler.is_some());
        for channel in &mut core.render {
            channel.fill(1000.0);
        }
        core.process_render().unwrap();
        let len = core.render_resampled[0].len();
        assert!((159..=161).contains(&len), "{len}");
    }

    #[test]
    fn mobile_mode_has_no_linear_output() {
        let stream = StreamConfig::new(16000, 1);
        let mut core = ProcessingCore::new(&aec_config(true), stream, stream, 0).unwrap();
        core.process_capture(CaptureContext::default()).unwrap();
        assert!(core.linear_aec_output().is_none());

        let mut core = ProcessingCore::new(&aec_config(false), stream, stream, 0).unwrap();
        core.process_capture(CaptureContext::default()).unwrap();
        assert_eq!(core.linear_aec_output().map(<[Vec<f32>]>::len), Some(1));
    }

    #[test]
    fn apply_config_keeps_unchanged_submodules() {
        let stream = StreamConfig::new(16000, 1);
        let mut core = ProcessingCore::new(&aec_config(false), stream, stream, 0).unwrap();
        core.submodules
            .echo_canceller
            .as_mut()
            .unwrap()
            .set_delay_ms(120);

        let mut config = aec_config(false);
        config.noise_suppression.enabled = true;
        core.apply_config(&config).unwrap();
        assert!(core.submodules.noise_suppressor.is_some());
        assert_eq!(
            core.submodules.echo_canceller.as_ref().unwrap().delay_ms(),
            120
        );
        assert!(core.submodule_states().noise_suppressor);
    }

    #[test]
    fn rejected_config_leaves_pipeline_untouched() {
        let stream = StreamConfig::new(16000, 1);
        let mut core = ProcessingCore::new(&Config::default(), stream, stream, 0).unwrap();
        let config = Config {
            gain_controller1: Gc1Config {
                enabled: true,
                target_level_dbfs: 40,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(core.apply_config(&config), Err(Error::BadParameter));
        assert!(core.submodules.gain_controller1.is_none());
        assert_eq!(core.config(), &Config::default());
    }

    #[test]
    fn new_gain_controller_starts_from_stream_level() {
        let stream = StreamConfig::new(16000, 1);
        let mut core = ProcessingCore::new(&Config::default(), stream, stream, 0).unwrap();
        core.set_stream_analog_level(180);
        assert_eq!(core.recommended_analog_level(), None);

        let config = Config {
            gain_controller1: Gc1Config {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        core.apply_config(&config).unwrap();
        assert_eq!(core.recommended_analog_level(), Some(180));
    }

    #[test]
    fn statistics_report_enabled_submodules() {
        let stream = StreamConfig::new(16000, 1);
        let mut core = ProcessingCore::new(&Config::default(), stream, stream, 0).unwrap();
        core.process_capture(CaptureContext::default()).unwrap();
        let stats = core.statistics();
        assert_eq!(stats.output_rms_dbfs, Some(RmsLevel::MIN_LEVEL_DB));
        assert_eq!(stats.echo_return_loss_enhancement, None);
        assert_eq!(stats.delay_ms, None);

        let mut core = ProcessingCore::new(&aec_config(false), stream, stream, 0).unwrap();
        core.process_capture(CaptureContext {
            stream_delay_ms: 40,
            key_pressed: false,
        })
        .unwrap();
        let stats = core.statistics();
        assert_eq!(stats.delay_ms, Some(40));
        assert!(stats.echo_return_loss_enhancement.is_some());
    }
}
