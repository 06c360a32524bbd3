//! Rate conversion from the processing format to the caller's output format.

use antiphon_common_audio::Resampler;
use derive_more::Debug;

use crate::Error;
use crate::stream_config::{StreamConfig, frame_size};

/// Resamples deinterleaved 10 ms frames, one resampler per channel.
#[derive(Debug)]
pub(crate) struct OutputResampler {
    input_rate_hz: u32,
    output_rate_hz: u32,
    output_frames: usize,
    resamplers: Vec<Resampler>,
    #[debug(skip)]
    output: Vec<Vec<f32>>,
}

impl OutputResampler {
    pub(crate) fn new(input: &StreamConfig, output_rate_hz: u32) -> Result<Self, Error> {
        let num_channels = usize::from(input.num_channels());
        let resamplers = (0..num_channels)
            .map(|_| Resampler::new(input.sample_rate_hz(), output_rate_hz, 1))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Error::Initialization)?;
        let output_frames = frame_size(output_rate_hz);
        Ok(Self {
            input_rate_hz: input.sample_rate_hz(),
            output_rate_hz,
            output_frames,
            resamplers,
            output: vec![vec![0.0; output_frames]; num_channels],
        })
    }

    fn converts(&self, input: &StreamConfig, output_rate_hz: u32) -> bool {
        self.input_rate_hz == input.sample_rate_hz()
            && self.output_rate_hz == output_rate_hz
            && self.resamplers.len() == usize::from(input.num_channels())
    }

    /// Resamples `frame` and returns exactly one output block per channel.
    pub(crate) fn process(&mut self, frame: &[Vec<f32>]) -> Result<&[Vec<f32>], Error> {
        for ((resampler, src), dst) in self
            .resamplers
            .iter_mut()
            .zip(frame)
            .zip(&mut self.output)
        {
            dst.resize(resampler.max_output_len(src.len()), 0.0);
            let written = resampler.process_f32_into(src, dst)?;
            dst.truncate(written);
            dst.resize(self.output_frames, 0.0);
        }
        Ok(&self.output)
    }
}

/// Returns the resampler in `slot`, replacing it when the formats changed.
pub(crate) fn output_resampler<'a>(
    slot: &'a mut Option<OutputResampler>,
    input: &StreamConfig,
    output_rate_hz: u32,
) -> Result<&'a mut OutputResampler, Error> {
    let resampler = match slot.take() {
        Some(resampler) if resampler.converts(input, output_rate_hz) => resampler,
        _ => OutputResampler::new(input, output_rate_hz)?,
    };
    Ok(slot.insert(resampler))
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    fn tone(rate: u32, frames: usize, offset: usize) -> Vec<f32> {
        (0..frames)
            .map(|n| 8000.0 * (2.0 * PI * 500.0 * (offset + n) as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn every_block_has_output_length() {
        for (input_rate, output_rate) in [(48000, 16000), (16000, 48000), (32000, 48000), (8000, 32000)] {
            let input = StreamConfig::new(input_rate, 2);
            let mut resampler = OutputResampler::new(&input, output_rate).unwrap();
            let frames = input.num_frames();
            for block in 0..20 {
                let channel = tone(input_rate, frames, block * frames);
                let out = resampler.process(&[channel.clone(), channel]).unwrap();
                assert_eq!(out.len(), 2);
                assert!(out.iter().all(|c| c.len() == frame_size(output_rate)));
            }
        }
    }

    #[test]
    fn downsampled_tone_keeps_amplitude() {
        let input = StreamConfig::new(48000, 1);
        let mut resampler = OutputResampler::new(&input, 16000).unwrap();
        let mut peak = 0.0f32;
        for block in 0..20 {
            let out = resampler.process(&[tone(48000, 480, block * 480)]).unwrap();
            if block >= 5 {
                peak = out[0].iter().fold(peak, |m, &s| m.max(s.abs()));
            }
        }
        assert!((7000.0..9000.0).contains(&peak), "{peak}");
    }

    #[test]
    fn slot_is_rebuilt_on_format_change() {
        let mut slot = None;
        let mono = StreamConfig::new(32000, 1);
        output_resampler(&mut slot, &mono, 16000).unwrap();
        assert!(slot.as_ref().unwrap().converts(&mono, 16000));

        let stereo = StreamConfig::new(32000, 2);
        output_resampler(&mut slot, &stereo, 16000).unwrap();
        assert!(slot.as_ref().unwrap().converts(&stereo, 16000));
        assert!(!slot.as_ref().unwrap().converts(&stereo, 8000));
    }
}
