//! RMS level meter reporting in `-dBFS` (RFC 6465 audio level indication).
//!
//! Levels are positive integers in `0..=127`: `0` is a full-scale square
//! wave, `127` is digital silence. A signal that carried any non-zero energy
//! but rounds down to the floor is reported as [`RmsLevel::INAUDIBLE_BUT_NOT_MUTED`].

const FULL_SCALE_ENERGY: f64 = 32768.0 * 32768.0;
/// `10^(-127 / 10)`, the normalised energy floor.
const ENERGY_FLOOR: f64 = 1.995_262_314_968_883e-13;

fn energy_to_level(mean_square: f64) -> i32 {
    let normalised = mean_square / FULL_SCALE_ENERGY;
    if normalised <= ENERGY_FLOOR {
        return RmsLevel::MIN_LEVEL_DB;
    }
    let db = -10.0 * normalised.log10();
    ((db + 0.5) as i32).clamp(0, RmsLevel::MIN_LEVEL_DB)
}

/// Average and peak levels of one measurement period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Levels {
    pub average: i32,
    /// Loudest single block of the period.
    pub peak: i32,
}

/// Accumulates signal energy between reads.
///
/// Feed blocks with the `analyze_*` methods and read the level with
/// [`average`](Self::average) or [`average_and_peak`](Self::average_and_peak),
/// which both restart the measurement. Changing the block length also
/// restarts it, since the peak is tracked per block.
#[derive(Debug, Clone, Default)]
pub struct RmsLevel {
    energy: f64,
    samples: usize,
    peak_block_energy: f64,
    block_len: Option<usize>,
}

impl RmsLevel {
    /// Level reported for digital silence.
    pub const MIN_LEVEL_DB: i32 = 127;
    /// Level reported for a non-silent signal below the floor.
    pub const INAUDIBLE_BUT_NOT_MUTED: i32 = 126;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Adds a block of S16 samples.
    pub fn analyze_i16(&mut self, block: &[i16]) {
        self.accumulate(block.len(), block.iter().map(|&s| f64::from(s)));
    }

    /// Adds a block of FloatS16 samples. Samples are truncated to S16 first.
    pub fn analyze_f32(&mut self, block: &[f32]) {
        self.accumulate(
            block.len(),
            block
                .iter()
                .map(|&s| f64::from(s.clamp(-32768.0, 32767.0) as i16)),
        );
    }

    /// Accounts for `len` samples of muted (zero) signal.
    pub fn analyze_muted(&mut self, len: usize) {
        self.set_block_len(len);
        self.samples += len;
    }

    /// Returns the average level since the last read and restarts.
    pub fn average(&mut self) -> i32 {
        let level = match self.samples {
            0 => Self::MIN_LEVEL_DB,
            n => {
                let level = energy_to_level(self.energy / n as f64);
                if level == Self::MIN_LEVEL_DB && self.energy > 0.0 {
                    Self::INAUDIBLE_BUT_NOT_MUTED
                } else {
                    level
                }
            }
        };
        self.reset();
        level
    }

    /// Returns the average and the per-block peak level and restarts.
    pub fn average_and_peak(&mut self) -> Levels {
        let levels = match (self.samples, self.block_len) {
            (n, Some(block_len)) if n > 0 && block_len > 0 => Levels {
                average: energy_to_level(self.energy / n as f64),
                peak: energy_to_level(self.peak_block_energy / block_len as f64),
            },
            _ => Levels {
                average: Self::MIN_LEVEL_DB,
                peak: Self::MIN_LEVEL_DB,
            },
        };
        self.reset();
        levels
    }

    fn accumulate(&mut self, len: usize, samples: impl Iterator<Item = f64>) {
        if len == 0 {
            return;
        }
        self.set_block_len(len);
        let block_energy: f64 = samples.map(|s| s * s).sum();
        self.energy += block_energy;
        self.samples += len;
        self.peak_block_energy = self.peak_block_energy.max(block_energy);
    }

    fn set_block_len(&mut self, len: usize) {
        if self.block_len != Some(len) {
            self.reset();
            self.block_len = Some(len);
        }
    }
}
