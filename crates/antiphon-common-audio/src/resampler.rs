//! Streaming sample-rate converter for interleaved audio.
//!
//! Each channel is filtered with a Blackman-windowed sinc kernel. Kernels for
//! a grid of sub-sample offsets are precomputed and linearly interpolated.
//! The read position is tracked as an exact rational (`index + phase / den`),
//! so long runs do not drift.
//!
//! A call does not map input blocks to output blocks one-to-one: the number
//! of output frames depends on the ratio and on the phase left by earlier
//! calls. History carries over between calls until [`Resampler::reset`].

use std::f64::consts::PI;
use std::mem;

use derive_more::{Debug, Display, Error};

use crate::audio_util::float_s16_to_s16;

const HALF_KERNEL: usize = 16;
const KERNEL_SIZE: usize = 2 * HALF_KERNEL;
/// Number of precomputed sub-sample offsets.
const KERNEL_OFFSETS: usize = 32;
/// Extra output frames reserved in scratch space.
const GUARD_FRAMES: usize = 16;
/// Passband as a fraction of the lower Nyquist frequency.
const CUTOFF_FRACTION: f64 = 0.9;

/// Errors reported by [`Resampler`].
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResamplerError {
    #[display("sample rates must be non-zero (in {input_rate_hz}, out {output_rate_hz})")]
    InvalidRate {
        input_rate_hz: u32,
        output_rate_hz: u32,
    },
    #[display("channel count must be non-zero")]
    InvalidChannelCount,
    #[display("{len} samples is not a multiple of {num_channels} channels")]
    InputLength { len: usize, num_channels: usize },
    #[display("output holds {available} samples, {needed} required")]
    OutputTooSmall { needed: usize, available: usize },
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn blackman(distance: f64) -> f64 {
    let x = distance / HALF_KERNEL as f64;
    if x.abs() >= 1.0 {
        return 0.0;
    }
    0.42 + 0.5 * (PI * x).cos() + 0.08 * (2.0 * PI * x).cos()
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Builds the kernel table. Row `i` holds the taps for a read position
/// `i / KERNEL_OFFSETS` of a sample past an integer index.
fn build_kernels(input_rate_hz: u32, output_rate_hz: u32) -> Vec<[f32; KERNEL_SIZE]> {
    let cutoff = (f64::from(output_rate_hz) / f64::from(input_rate_hz)).min(1.0) * CUTOFF_FRACTION;
    (0..=KERNEL_OFFSETS)
        .map(|i| {
            let offset = i as f64 / KERNEL_OFFSETS as f64;
            let mut taps = [0.0f64; KERNEL_SIZE];
            for (k, tap) in taps.iter_mut().enumerate() {
                let distance = k as f64 - (HALF_KERNEL as f64 - 1.0) - offset;
                *tap = cutoff * sinc(cutoff * distance) * blackman(distance);
            }
            let sum: f64 = taps.iter().sum();
            let mut kernel = [0.0f32; KERNEL_SIZE];
            for (dst, tap) in kernel.iter_mut().zip(taps) {
                *dst = (tap / sum) as f32;
            }
            kernel
        })
        .collect()
}

/// Streaming resampler with per-channel history.
#[derive(Debug)]
pub struct Resampler {
    input_rate_hz: u32,
    output_rate_hz: u32,
    num_channels: usize,
    /// Input frames advanced per output frame, as `step_num / step_den`.
    step_num: u64,
    step_den: u64,
    /// Integer part of the read position into `history ++ input`.
    index: usize,
    /// Fractional part of the read position, in units of `1 / step_den`.
    phase: u64,
    #[debug(skip)]
    kernels: Vec<[f32; KERNEL_SIZE]>,
    #[debug(skip)]
    history: Vec<[f32; KERNEL_SIZE]>,
    #[debug(skip)]
    extended: Vec<f32>,
    #[debug(skip)]
    scratch_in: Vec<f32>,
    #[debug(skip)]
    scratch_out: Vec<f32>,
}

impl Resampler {
    pub fn new(
        input_rate_hz: u32,
        output_rate_hz: u32,
        num_channels: usize,
    ) -> Result<Self, ResamplerError> {
        let mut resampler = Self {
            input_rate_hz: 0,
            output_rate_hz: 0,
            num_channels: 0,
            step_num: 1,
            step_den: 1,
            index: HALF_KERNEL,
            phase: 0,
            kernels: Vec::new(),
            history: Vec::new(),
            extended: Vec::new(),
            scratch_in: Vec::new(),
            scratch_out: Vec::new(),
        };
        resampler.reset(input_rate_hz, output_rate_hz, num_channels)?;
        Ok(resampler)
    }

    /// Reconfigures the resampler and discards all history.
    pub fn reset(
        &mut self,
        input_rate_hz: u32,
        output_rate_hz: u32,
        num_channels: usize,
    ) -> Result<(), ResamplerError> {
        if input_rate_hz == 0 || output_rate_hz == 0 {
            return Err(ResamplerError::InvalidRate {
                input_rate_hz,
                output_rate_hz,
            });
        }
        if num_channels == 0 {
            return Err(ResamplerError::InvalidChannelCount);
        }
        tracing::trace!(input_rate_hz, output_rate_hz, num_channels, "resampler reset");

        let divisor = gcd(u64::from(input_rate_hz), u64::from(output_rate_hz));
        self.step_num = u64::from(input_rate_hz) / divisor;
        self.step_den = u64::from(output_rate_hz) / divisor;
        if (input_rate_hz, output_rate_hz) != (self.input_rate_hz, self.output_rate_hz) {
            self.kernels = build_kernels(input_rate_hz, output_rate_hz);
        }
        self.input_rate_hz = input_rate_hz;
        self.output_rate_hz = output_rate_hz;
        self.num_channels = num_channels;
        self.index = HALF_KERNEL;
        self.phase = 0;
        self.history = vec![[0.0; KERNEL_SIZE]; num_channels];
        Ok(())
    }

    /// Same as [`reset`](Self::reset), but keeps the history when nothing
    /// changed.
    pub fn reset_if_needed(
        &mut self,
        input_rate_hz: u32,
        output_rate_hz: u32,
        num_channels: usize,
    ) -> Result<(), ResamplerError> {
        if (input_rate_hz, output_rate_hz, num_channels)
            == (self.input_rate_hz, self.output_rate_hz, self.num_channels)
        {
            return Ok(());
        }
        self.reset(input_rate_hz, output_rate_hz, num_channels)
    }

    pub fn input_rate_hz(&self) -> u32 {
        self.input_rate_hz
    }

    pub fn output_rate_hz(&self) -> u32 {
        self.output_rate_hz
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Upper bound on the output samples produced for `input_len` input
    /// samples.
    pub fn max_output_len(&self, input_len: usize) -> usize {
        let frames = (input_len / self.num_channels) as u64;
        let out_frames = (frames * u64::from(self.output_rate_hz))
            .div_ceil(u64::from(self.input_rate_hz)) as usize;
        (out_frames + GUARD_FRAMES) * self.num_channels
    }

    /// Resamples interleaved float samples. The scale is preserved, so both
    /// Float and FloatS16 input work.
    pub fn process_f32(&mut self, input: &[f32]) -> Result<Vec<f32>, ResamplerError> {
        let mut output = vec![0.0; self.max_output_len(input.len())];
        let written = self.process_f32_into(input, &mut output)?;
        output.truncate(written);
        Ok(output)
    }

    /// Resamples interleaved S16 samples.
    pub fn process_i16(&mut self, input: &[i16]) -> Result<Vec<i16>, ResamplerError> {
        let mut output = vec![0; self.max_output_len(input.len())];
        let written = self.process_i16_into(input, &mut output)?;
        output.truncate(written);
        Ok(output)
    }

    /// Resamples into `output` and returns the number of samples written.
    ///
    /// Fails without touching any state if `output` is too small.
    pub fn process_f32_into(
        &mut self,
        input: &[f32],
        output: &mut [f32],
    ) -> Result<usize, ResamplerError> {
        self.check_input(input.len())?;
        let needed = self.output_frames(input.len() / self.num_channels) * self.num_channels;
        if output.len() < needed {
            return Err(ResamplerError::OutputTooSmall {
                needed,
                available: output.len(),
            });
        }
        if self.step_num == self.step_den {
            output[..input.len()].copy_from_slice(input);
            return Ok(input.len());
        }
        self.convert(input, &mut output[..needed]);
        Ok(needed)
    }

    /// S16 flavour of [`process_f32_into`](Self::process_f32_into).
    pub fn process_i16_into(
        &mut self,
        input: &[i16],
        output: &mut [i16],
    ) -> Result<usize, ResamplerError> {
        self.check_input(input.len())?;
        let needed = self.output_frames(input.len() / self.num_channels) * self.num_channels;
        if output.len() < needed {
            return Err(ResamplerError::OutputTooSmall {
                needed,
                available: output.len(),
            });
        }
        if self.step_num == self.step_den {
            output[..input.len()].copy_from_slice(input);
            return Ok(input.len());
        }

        let mut scratch_in = mem::take(&mut self.scratch_in);
        let mut scratch_out = mem::take(&mut self.scratch_out);
        scratch_in.clear();
        scratch_in.extend(input.iter().map(|&s| f32::from(s)));
        scratch_out.clear();
        scratch_out.resize(self.max_output_len(input.len()), 0.0);

        self.convert(&scratch_in, &mut scratch_out[..needed]);
        for (dst, &src) in output.iter_mut().zip(&scratch_out[..needed]) {
            *dst = float_s16_to_s16(src);
        }

        self.scratch_in = scratch_in;
        self.scratch_out = scratch_out;
        Ok(needed)
    }

    fn check_input(&self, len: usize) -> Result<(), ResamplerError> {
        if len % self.num_channels != 0 {
            return Err(ResamplerError::InputLength {
                len,
                num_channels: self.num_channels,
            });
        }
        Ok(())
    }

    /// Output frames the next call produces for `frames` input frames.
    fn output_frames(&self, frames: usize) -> usize {
        if self.step_num == self.step_den {
            return frames;
        }
        let (mut index, mut phase) = (self.index, self.phase);
        let mut count = 0;
        while index < HALF_KERNEL + frames {
            count += 1;
            (index, phase) = self.advance(index, phase);
        }
        count
    }

    fn advance(&self, index: usize, phase: u64) -> (usize, u64) {
        let phase = phase + self.step_num;
        (
            index + (phase / self.step_den) as usize,
            phase % self.step_den,
        )
    }

    /// Runs the filter over every channel. `output` has exactly the size
    /// reported by `output_frames`.
    fn convert(&mut self, input: &[f32], output: &mut [f32]) {
        let num_channels = self.num_channels;
        let frames = input.len() / num_channels;
        let (mut end_index, mut end_phase) = (self.index, self.phase);

        for ch in 0..num_channels {
            self.extended.clear();
            self.extended.extend_from_slice(&self.history[ch]);
            self.extended
                .extend(input.iter().skip(ch).step_by(num_channels).copied());

            let (mut index, mut phase) = (self.index, self.phase);
            for out in output.iter_mut().skip(ch).step_by(num_channels) {
                *out = self.interpolate(index, phase);
                (index, phase) = self.advance(index, phase);
            }
            (end_index, end_phase) = (index, phase);

            let tail = self.extended.len() - KERNEL_SIZE;
            self.history[ch].copy_from_slice(&self.extended[tail..]);
        }

        self.index = end_index - frames;
        self.phase = end_phase;
    }

    fn interpolate(&self, index: usize, phase: u64) -> f32 {
        let position = phase as f64 / self.step_den as f64 * KERNEL_OFFSETS as f64;
        let row = (position as usize).min(KERNEL_OFFSETS - 1);
        let weight = (position - row as f64) as f32;
        let start = index + 1 - HALF_KERNEL;
        let window = &self.extended[start..start + KERNEL_SIZE];

        let (mut lower, mut upper) = (0.0f32, 0.0f32);
        for ((&s, &a), &b) in window
            .iter()
            .zip(&self.kernels[row])
            .zip(&self.kernels[row + 1])
        {
            lower += s * a;
            upper += s * b;
        }
        lower + weight * (upper - lower)
    }
}
