//! Public audio processing API.
//!
//! Provides the user-facing [`AudioProcessing`] struct and
//! [`AudioProcessingBuilder`] for constructing configured instances.

use antiphon_aec::MAX_DELAY_MS;
use antiphon_agc::common::{MAX_ANALOG_LEVEL, MIN_ANALOG_LEVEL};
use antiphon_common_audio::audio_util::{
    deinterleave_f32, deinterleave_s16, interleave_f32, interleave_s16,
};
use tracing::{debug, warn};

use crate::audio_processing_impl::{CaptureContext, ProcessingCore};
use crate::config::Config;
use crate::error::{Error, Warning};
use crate::output_resampler::{OutputResampler, output_resampler};
use crate::stats::AudioProcessingStats;
use crate::stream_config::StreamConfig;

/// Initial analog level, the middle of the hardware range.
const DEFAULT_ANALOG_LEVEL: i32 = 127;

/// Interleaved sample formats accepted at the API boundary.
trait Sample: Copy {
    fn deinterleave(src: &[Self], dst: &mut [Vec<f32>]);
    fn interleave(src: &[Vec<f32>], dst: &mut [Self]);
}

impl Sample for i16 {
    fn deinterleave(src: &[Self], dst: &mut [Vec<f32>]) {
        deinterleave_s16(src, dst);
    }

    fn interleave(src: &[Vec<f32>], dst: &mut [Self]) {
        interleave_s16(src, dst);
    }
}

impl Sample for f32 {
    fn deinterleave(src: &[Self], dst: &mut [Vec<f32>]) {
        deinterleave_f32(src, dst);
    }

    fn interleave(src: &[Vec<f32>], dst: &mut [Self]) {
        interleave_f32(src, dst);
    }
}

// ─── Format validation ──────────────────────────────────────────────

fn validate_formats(
    input_config: &StreamConfig,
    output_config: &StreamConfig,
    src_len: usize,
    dest_len: usize,
) -> Result<(), Error> {
    if !input_config.is_native_rate() || !output_config.is_native_rate() {
        return Err(Error::BadSampleRate);
    }
    let in_ch = input_config.num_channels();
    let out_ch = output_config.num_channels();
    if in_ch == 0 || (out_ch != 1 && out_ch != in_ch) {
        return Err(Error::BadNumberChannels);
    }
    if src_len != input_config.num_samples() || dest_len != output_config.num_samples() {
        return Err(Error::BadDataLength);
    }
    Ok(())
}

// ─── AudioProcessingBuilder ─────────────────────────────────────────

/// Builder for constructing an [`AudioProcessing`] instance.
///
/// # Example
/// ```
/// use antiphon::{AudioProcessing, Config, StreamConfig};
///
/// let mut config = Config::default();
/// config.echo_canceller.enabled = true;
/// config.noise_suppression.enabled = true;
///
/// let apm = AudioProcessing::builder()
///     .config(config)
///     .capture_config(StreamConfig::new(16000, 1))
///     .render_config(StreamConfig::new(48000, 2))
///     .build()
///     .unwrap();
/// assert!(apm.get_config().high_pass_filter.enabled);
/// ```
#[derive(Debug, Default)]
pub struct AudioProcessingBuilder {
    config: Config,
    capture_config: StreamConfig,
    render_config: StreamConfig,
}

impl AudioProcessingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Format of the capture (near-end) stream. Defaults to 32 kHz mono.
    pub fn capture_config(mut self, capture_config: StreamConfig) -> Self {
        self.capture_config = capture_config;
        self
    }

    /// Format of the render (far-end) stream. Defaults to 32 kHz mono.
    pub fn render_config(mut self, render_config: StreamConfig) -> Self {
        self.render_config = render_config;
        self
    }

    /// Validates the configuration and creates every enabled submodule.
    pub fn build(self) -> Result<AudioProcessing, Error> {
        self.config.validate()?;
        let core = ProcessingCore::new(
            &self.config.effective(),
            self.capture_config,
            self.render_config,
            DEFAULT_ANALOG_LEVEL,
        )?;
        Ok(AudioProcessing {
            capture_config: self.capture_config,
            render_config: self.render_config,
            stream_delay_ms: 0,
            was_stream_delay_set: false,
            stream_delay_ever_set: false,
            stream_analog_level: DEFAULT_ANALOG_LEVEL,
            was_analog_level_set: false,
            key_pressed: false,
            warned: false,
            capture_output: None,
            render_output: None,
            core,
        })
    }
}

// ─── AudioProcessing ────────────────────────────────────────────────

/// Duplex voice processing pipeline: echo cancellation, noise suppression,
/// gain control and high-pass filtering on 10 ms frames.
///
/// # Usage
///
/// 1. Create an instance via [`AudioProcessing::builder()`].
/// 2. For each 10 ms frame:
///    - Call [`process_reverse_stream_f32()`](AudioProcessing::process_reverse_stream_f32)
///      with the far-end (render/playback) audio.
///    - Set the stream parameters: [`set_stream_delay_ms()`](AudioProcessing::set_stream_delay_ms),
///      [`set_stream_analog_level()`](AudioProcessing::set_stream_analog_level).
///    - Call [`process_stream_f32()`](AudioProcessing::process_stream_f32)
///      with the near-end (capture/microphone) audio.
/// 3. Apply configuration changes between frames via
///    [`apply_config()`](AudioProcessing::apply_config).
///
/// Both f32 and i16 interleaved interfaces are provided.
#[derive(Debug)]
pub struct AudioProcessing {
    capture_config: StreamConfig,
    render_config: StreamConfig,
    stream_delay_ms: i32,
    /// Set since the last capture frame.
    was_stream_delay_set: bool,
    stream_delay_ever_set: bool,
    stream_analog_level: i32,
    was_analog_level_set: bool,
    key_pressed: bool,
    /// A warning was logged and has not cleared since.
    warned: bool,
    /// Present while the capture output rate differs from the input rate.
    capture_output: Option<OutputResampler>,
    render_output: Option<OutputResampler>,
    core: ProcessingCore,
}

impl AudioProcessing {
    /// Returns a builder for constructing an instance with custom configuration.
    pub fn builder() -> AudioProcessingBuilder {
        AudioProcessingBuilder::new()
    }

    /// Recreates every submodule for the current stream formats, dropping
    /// all adaptive state.
    pub fn initialize(&mut self) -> Result<(), Error> {
        self.reinitialize(self.capture_config, self.render_config)
    }

    fn reinitialize(
        &mut self,
        capture_config: StreamConfig,
        render_config: StreamConfig,
    ) -> Result<(), Error> {
        let core = ProcessingCore::new(
            self.core.config(),
            capture_config,
            render_config,
            self.stream_analog_level,
        )?;
        self.core = core;
        self.capture_output = None;
        self.render_output = None;
        self.capture_config = capture_config;
        self.render_config = render_config;
        Ok(())
    }

    /// Applies a new configuration, selectively reinitializing submodules
    /// as needed. On error the previous configuration stays in effect.
    pub fn apply_config(&mut self, config: Config) -> Result<(), Error> {
        config.validate()?;
        self.core.apply_config(&config.effective())?;
        debug!(config = ?self.core.config(), "applied configuration");
        Ok(())
    }

    /// Returns the configuration in effect, after enforced substitutions.
    pub fn get_config(&self) -> Config {
        *self.core.config()
    }

    pub fn capture_config(&self) -> StreamConfig {
        self.capture_config
    }

    pub fn render_config(&self) -> StreamConfig {
        self.render_config
    }

    // ─── Stream parameters ───────────────────────────────────────

    /// Sets the delay between a render frame reaching the speaker and its
    /// echo reaching the microphone. Must be set before every capture frame
    /// when the full-mode echo canceller runs.
    ///
    /// Values outside `0..=500` are clamped and reported with a warning.
    pub fn set_stream_delay_ms(&mut self, delay_ms: i32) -> Option<Warning> {
        let max = MAX_DELAY_MS as i32;
        let clamped = delay_ms.clamp(0, max);
        self.stream_delay_ms = clamped;
        self.was_stream_delay_set = true;
        self.stream_delay_ever_set = true;
        (clamped != delay_ms).then(|| {
            warn!(delay_ms, clamped, "stream delay out of range");
            Warning::BadStreamParameter
        })
    }

    pub fn stream_delay_ms(&self) -> i32 {
        self.stream_delay_ms
    }

    /// Sets the analog level the hardware applied to the next capture frame,
    /// clamped to `0..=255`.
    pub fn set_stream_analog_level(&mut self, level: i32) {
        let level = level.clamp(MIN_ANALOG_LEVEL, MAX_ANALOG_LEVEL);
        self.stream_analog_level = level;
        self.was_analog_level_set = true;
        self.core.set_stream_analog_level(level);
    }

    /// Analog level to apply before the next capture frame.
    ///
    /// Returns [`Error::NotEnabled`] when gain controller 1 is disabled.
    pub fn recommended_stream_analog_level(&self) -> Result<i32, Error> {
        self.core
            .recommended_analog_level()
            .ok_or(Error::NotEnabled)
    }

    /// Freezes echo path adaptation and noise estimation while keys are
    /// pressed. Persists until changed.
    pub fn set_stream_key_pressed(&mut self, key_pressed: bool) {
        self.key_pressed = key_pressed;
    }

    pub fn stream_key_pressed(&self) -> bool {
        self.key_pressed
    }

    // ─── Processing ──────────────────────────────────────────────

    /// Processes one interleaved S16 capture frame and writes it to `dest`
    /// in the `output_config` format.
    pub fn process_stream_i16(
        &mut self,
        src: &[i16],
        input_config: &StreamConfig,
        output_config: &StreamConfig,
        dest: &mut [i16],
    ) -> Result<Option<Warning>, Error> {
        self.process_stream(src, input_config, output_config, dest)
    }

    /// Processes one interleaved float capture frame, nominally in
    /// `[-1.0, 1.0]`, and writes it to `dest` in the `output_config` format.
    pub fn process_stream_f32(
        &mut self,
        src: &[f32],
        input_config: &StreamConfig,
        output_config: &StreamConfig,
        dest: &mut [f32],
    ) -> Result<Option<Warning>, Error> {
        self.process_stream(src, input_config, output_config, dest)
    }

    /// Feeds one interleaved S16 render frame and copies it to `dest`,
    /// converted to `output_config`.
    pub fn process_reverse_stream_i16(
        &mut self,
        src: &[i16],
        input_config: &StreamConfig,
        output_config: &StreamConfig,
        dest: &mut [i16],
    ) -> Result<(), Error> {
        self.process_reverse_stream(src, input_config, output_config, dest)
    }

    /// Feeds one interleaved float render frame and copies it to `dest`,
    /// converted to `output_config`.
    pub fn process_reverse_stream_f32(
        &mut self,
        src: &[f32],
        input_config: &StreamConfig,
        output_config: &StreamConfig,
        dest: &mut [f32],
    ) -> Result<(), Error> {
        self.process_reverse_stream(src, input_config, output_config, dest)
    }

    fn process_stream<T: Sample>(
        &mut self,
        src: &[T],
        input_config: &StreamConfig,
        output_config: &StreamConfig,
        dest: &mut [T],
    ) -> Result<Option<Warning>, Error> {
        validate_formats(input_config, output_config, src.len(), dest.len())?;
        if *input_config != self.capture_config {
            self.reinitialize(*input_config, self.render_config)?;
        }
        self.check_stream_delay_ever_set()?;

        let warning = self.stream_parameter_warning();
        T::deinterleave(src, &mut self.core.capture);
        self.core.process_capture(CaptureContext {
            stream_delay_ms: self.stream_delay_ms,
            key_pressed: self.key_pressed,
        })?;
        if output_config.sample_rate_hz() == input_config.sample_rate_hz() {
            self.capture_output = None;
            T::interleave(&self.core.capture, dest);
        } else {
            let resampler = output_resampler(
                &mut self.capture_output,
                input_config,
                output_config.sample_rate_hz(),
            )?;
            T::interleave(resampler.process(&self.core.capture)?, dest);
        }
        self.was_stream_delay_set = false;

        match warning {
            Some(warning) if !self.warned => {
                warn!(%warning, "stream parameters missing for capture frame");
                self.warned = true;
            }
            Some(_) => {}
            None => self.warned = false,
        }
        Ok(warning)
    }

    fn process_reverse_stream<T: Sample>(
        &mut self,
        src: &[T],
        input_config: &StreamConfig,
        output_config: &StreamConfig,
        dest: &mut [T],
    ) -> Result<(), Error> {
        validate_formats(input_config, output_config, src.len(), dest.len())?;
        if *input_config != self.render_config {
            self.reinitialize(self.capture_config, *input_config)?;
        }
        self.check_stream_delay_ever_set()?;

        T::deinterleave(src, &mut self.core.render);
        self.core.process_render()?;
        if output_config.sample_rate_hz() == input_config.sample_rate_hz() {
            self.render_output = None;
            T::interleave(&self.core.render, dest);
        } else {
            let resampler = output_resampler(
                &mut self.render_output,
                input_config,
                output_config.sample_rate_hz(),
            )?;
            T::interleave(resampler.process(&self.core.render)?, dest);
        }
        Ok(())
    }

    /// The mobile echo canceller cannot run without a delay.
    fn check_stream_delay_ever_set(&self) -> Result<(), Error> {
        if self.core.submodule_states().mobile_echo_canceller && !self.stream_delay_ever_set {
            return Err(Error::StreamParameterNotSet);
        }
        Ok(())
    }

    fn stream_parameter_warning(&self) -> Option<Warning> {
        let states = self.core.submodule_states();
        let delay_missing = states.echo_canceller && !self.was_stream_delay_set;
        let level_missing = states.gain_controller1
            && self.core.config().gain_controller1.is_analog()
            && !self.was_analog_level_set;
        (delay_missing || level_missing).then_some(Warning::BadStreamParameter)
    }

    // ─── Outputs ─────────────────────────────────────────────────

    /// Returns processing statistics gathered since the last call.
    pub fn statistics(&mut self) -> AudioProcessingStats {
        self.core.statistics()
    }

    /// The linear echo canceller output of the last capture frame, one
    /// FloatS16 buffer per capture channel.
    ///
    /// Returns [`Error::NotEnabled`] unless `export_linear_aec_output` is in
    /// effect.
    pub fn linear_aec_output(&self) -> Result<&[Vec<f32>], Error> {
        self.core.linear_aec_output().ok_or(Error::NotEnabled)
    }
}
