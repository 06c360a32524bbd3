//! Legacy gain controller.
//!
//! In [`Agc1Mode::AdaptiveAnalog`] the controller closes a loop through the
//! caller's hardware: every block it measures the capture peak level and
//! recommends the analog level that would bring it to the target, moving at
//! most [`MAX_ANALOG_STEP`] units per block. The digital modes apply gain in
//! software instead.

use antiphon_common_audio::audio_util::db_to_ratio;
use tracing::debug;

use crate::AgcError;
use crate::common::{MAX_ANALOG_LEVEL, MIN_ANALOG_LEVEL, SILENCE_THRESHOLD_DBFS, frame_peak_dbfs};
use crate::gain_applier::GainApplier;
use crate::limiter::Limiter;

/// Errors within this margin around the target leave the analog level alone.
const ANALOG_DEADBAND_DB: f32 = 1.0;
/// Largest change of the recommended analog level per block.
pub const MAX_ANALOG_STEP: i32 = 16;

const DIGITAL_GAIN_INCREASE_DB_PER_FRAME: f32 = 0.1;
const DIGITAL_GAIN_DECREASE_DB_PER_FRAME: f32 = 1.0;
const LEVEL_ATTACK: f32 = 0.5;
const LEVEL_DECAY: f32 = 0.05;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Agc1Mode {
    /// Recommends a hardware input level; no software gain.
    #[default]
    AdaptiveAnalog,
    /// Software gain of up to `compression_gain_db`, adapted to the level.
    AdaptiveDigital,
    /// Software gain of exactly `compression_gain_db`.
    FixedDigital,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Agc1Config {
    pub mode: Agc1Mode,
    /// Target peak level in dB below full scale, `0..=31`.
    pub target_level_dbfs: i32,
    /// Maximum digital gain in dB, `0..=90`.
    pub compression_gain_db: i32,
    pub enable_limiter: bool,
}

impl Default for Agc1Config {
    fn default() -> Self {
        Self {
            mode: Agc1Mode::AdaptiveAnalog,
            target_level_dbfs: 3,
            compression_gain_db: 9,
            enable_limiter: true,
        }
    }
}

impl Agc1Config {
    pub const MAX_TARGET_LEVEL_DBFS: i32 = 31;
    pub const MAX_COMPRESSION_GAIN_DB: i32 = 90;

    pub fn validate(&self) -> Result<(), AgcError> {
        if !(0..=Self::MAX_TARGET_LEVEL_DBFS).contains(&self.target_level_dbfs) {
            return Err(AgcError::TargetLevelOutOfRange(self.target_level_dbfs));
        }
        if !(0..=Self::MAX_COMPRESSION_GAIN_DB).contains(&self.compression_gain_db) {
            return Err(AgcError::CompressionGainOutOfRange(
                self.compression_gain_db,
            ));
        }
        Ok(())
    }

    fn target_peak_dbfs(&self) -> f32 {
        -(self.target_level_dbfs as f32)
    }
}

#[derive(Debug)]
pub struct GainController1 {
    config: Agc1Config,
    stream_analog_level: i32,
    recommended_analog_level: i32,
    /// Peak envelope used by the adaptive digital mode.
    level_dbfs: f32,
    digital_gain_db: f32,
    gain_applier: GainApplier,
    limiter: Option<Limiter>,
}

impl GainController1 {
    pub fn new(config: Agc1Config) -> Result<Self, AgcError> {
        config.validate()?;
        debug!(?config, "creating gain controller 1");
        let limiter = config
            .enable_limiter
            .then(|| Limiter::new(config.target_peak_dbfs()));
        let mut s = Self {
            config,
            stream_analog_level: MAX_ANALOG_LEVEL / 2,
            recommended_analog_level: MAX_ANALOG_LEVEL / 2,
            level_dbfs: SILENCE_THRESHOLD_DBFS,
            digital_gain_db: 0.0,
            gain_applier: GainApplier::new(1.0),
            limiter,
        };
        s.reset();
        Ok(s)
    }

    pub fn config(&self) -> Agc1Config {
        self.config
    }

    pub fn reset(&mut self) {
        self.recommended_analog_level = self.stream_analog_level;
        self.level_dbfs = SILENCE_THRESHOLD_DBFS;
        self.digital_gain_db = match self.config.mode {
            Agc1Mode::FixedDigital => self.config.compression_gain_db as f32,
            Agc1Mode::AdaptiveAnalog | Agc1Mode::AdaptiveDigital => 0.0,
        };
        self.gain_applier.set_gain(db_to_ratio(self.digital_gain_db));
        if let Some(limiter) = &mut self.limiter {
            limiter.reset();
        }
    }

    /// Records the analog level the hardware applies to the next capture
    /// frame. Until that frame is analyzed the recommendation equals it.
    pub fn set_stream_analog_level(&mut self, level: i32) {
        let level = level.clamp(MIN_ANALOG_LEVEL, MAX_ANALOG_LEVEL);
        self.stream_analog_level = level;
        self.recommended_analog_level = level;
    }

    /// Measures the unprocessed capture frame and updates the
    /// recommendation for the next block.
    pub fn analyze_capture(&mut self, frame: &[Vec<f32>]) {
        let level = self.stream_analog_level;
        self.recommended_analog_level = level;
        if self.config.mode != Agc1Mode::AdaptiveAnalog {
            return;
        }

        let peak_dbfs = frame_peak_dbfs(frame);
        if peak_dbfs < SILENCE_THRESHOLD_DBFS {
            return;
        }
        let error_db = self.config.target_peak_dbfs() - peak_dbfs;
        if error_db.abs() <= ANALOG_DEADBAND_DB {
            return;
        }
        // The analog level is taken to scale the amplitude linearly.
        let desired = (level.max(1) as f32 * db_to_ratio(error_db)).round() as i32;
        let step = (desired - level).clamp(-MAX_ANALOG_STEP, MAX_ANALOG_STEP);
        self.recommended_analog_level = (level + step).clamp(MIN_ANALOG_LEVEL, MAX_ANALOG_LEVEL);
    }

    /// Level to apply in hardware before the next block.
    pub fn recommended_analog_level(&self) -> i32 {
        self.recommended_analog_level
    }

    pub fn stream_analog_level(&self) -> i32 {
        self.stream_analog_level
    }

    /// Current software gain in dB.
    pub fn digital_gain_db(&self) -> f32 {
        self.digital_gain_db
    }

    /// Applies the digital gain and the limiter to the processed frame.
    pub fn process(&mut self, frame: &mut [Vec<f32>]) {
        if self.config.mode == Agc1Mode::AdaptiveDigital {
            self.update_adaptive_gain(frame);
        }
        self.gain_applier
            .apply(db_to_ratio(self.digital_gain_db), frame);
        if let Some(limiter) = &mut self.limiter {
            limiter.process(frame);
        }
    }

    fn update_adaptive_gain(&mut self, frame: &[Vec<f32>]) {
        let peak_dbfs = frame_peak_dbfs(frame);
        if peak_dbfs < SILENCE_THRESHOLD_DBFS {
            return;
        }
        let smoothing = if peak_dbfs > self.level_dbfs {
            LEVEL_ATTACK
        } else {
            LEVEL_DECAY
        };
        self.level_dbfs += smoothing * (peak_dbfs - self.level_dbfs);

        let target_gain_db = (self.config.target_peak_dbfs() - self.level_dbfs)
            .clamp(0.0, self.config.compression_gain_db as f32);
        let delta = target_gain_db - self.digital_gain_db;
        self.digital_gain_db += delta.clamp(
            -DIGITAL_GAIN_DECREASE_DB_PER_FRAME,
            DIGITAL_GAIN_INCREASE_DB_PER_FRAME,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;
    use crate::common::{dbfs_to_float_s16, frame_peak};

    fn tone(len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|n| amplitude * (2.0 * PI * 1000.0 * n as f32 / 16000.0).sin())
            .collect()
    }

    fn controller(mode: Agc1Mode, compression_gain_db: i32) -> GainController1 {
        GainController1::new(Agc1Config {
            mode,
            compression_gain_db,
            ..Agc1Config::default()
        })
        .unwrap()
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let config = Agc1Config {
            target_level_dbfs: 32,
            ..Agc1Config::default()
        };
        assert_eq!(
            GainController1::new(config).err(),
            Some(AgcError::TargetLevelOutOfRange(32))
        );
        let config = Agc1Config {
            compression_gain_db: -1,
            ..Agc1Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(AgcError::CompressionGainOutOfRange(-1))
        );
        assert!(
            Agc1Config {
                target_level_dbfs: 31,
                compression_gain_db: 90,
                ..Agc1Config::default()
            }
            .validate()
            .is_ok()
        );
    }

    #[test]
    fn analog_loop_converges() {
        let mut agc = controller(Agc1Mode::AdaptiveAnalog, 9);
        // Simulated hardware: the capture amplitude scales with the level.
        let mut level = 128;
        let mut history = Vec::new();
        for _ in 0..30 {
            let frame = vec![tone(160, 100.0 * level as f32)];
            agc.set_stream_analog_level(level);
            agc.analyze_capture(&frame);
            level = agc.recommended_analog_level();
            history.push(level);
        }
        assert!(history[0] > 128);
        assert!(history[10..].windows(2).all(|w| (w[0] - w[1]).abs() <= 1));
        let target_level = dbfs_to_float_s16(-3.0) / 100.0;
        assert!((level as f32 - target_level).abs() < 20.0, "{level}");
    }

    #[test]
    fn analog_level_is_kept_on_silence() {
        let mut agc = controller(Agc1Mode::AdaptiveAnalog, 9);
        agc.set_stream_analog_level(77);
        agc.analyze_capture(&[vec![0.0; 160]]);
        assert_eq!(agc.recommended_analog_level(), 77);
        agc.set_stream_analog_level(300);
        assert_eq!(agc.recommended_analog_level(), 255);
        agc.analyze_capture(&[vec![0.0; 160]]);
        assert_eq!(agc.recommended_analog_level(), 255);
    }

    #[test]
    fn digital_modes_pass_the_analog_level_through() {
        let mut agc = controller(Agc1Mode::FixedDigital, 9);
        agc.set_stream_analog_level(42);
        agc.analyze_capture(&[tone(160, 100.0)]);
        assert_eq!(agc.recommended_analog_level(), 42);
    }

    #[test]
    fn fixed_digital_applies_compression_gain() {
        let mut agc = controller(Agc1Mode::FixedDigital, 6);
        let mut frame = vec![tone(160, 1000.0)];
        agc.process(&mut frame);
        let ratio = frame_peak(&frame) / frame_peak(&[tone(160, 1000.0)]);
        assert!((ratio - db_to_ratio(6.0)).abs() < 0.01, "{ratio}");
    }

    #[test]
    fn adaptive_digital_raises_quiet_input() {
        let mut agc = controller(Agc1Mode::AdaptiveDigital, 9);
        let input_peak = dbfs_to_float_s16(-30.0);
        let mut frame = Vec::new();
        for _ in 0..200 {
            frame = vec![tone(160, input_peak)];
            agc.process(&mut frame);
        }
        assert!((agc.digital_gain_db() - 9.0).abs() < 1e-3);
        let gain = frame_peak(&frame) / frame_peak(&[tone(160, input_peak)]);
        assert!((gain - db_to_ratio(9.0)).abs() < 0.01);
    }

    #[test]
    fn adaptive_digital_does_not_boost_loud_input() {
        let mut agc = controller(Agc1Mode::AdaptiveDigital, 20);
        for _ in 0..100 {
            let mut frame = vec![tone(160, dbfs_to_float_s16(-2.0))];
            agc.process(&mut frame);
        }
        assert_eq!(agc.digital_gain_db(), 0.0);
    }

    #[test]
    fn limiter_holds_the_target_peak() {
        let mut agc = controller(Agc1Mode::FixedDigital, 20);
        let threshold = dbfs_to_float_s16(-3.0);
        for _ in 0..10 {
            let mut frame = vec![tone(160, dbfs_to_float_s16(-10.0))];
            agc.process(&mut frame);
            assert!(frame_peak(&frame) <= threshold + 1.0);
        }
    }
}
