//! Buffered 16 kHz detector reporting speech probabilities.

use derive_more::Debug;

use crate::VadError;
use crate::vad::{Vad, VadMode};

const SAMPLE_RATE_HZ: u32 = 16000;
/// One 10 ms frame at 16 kHz.
pub const FRAME_LENGTH: usize = 160;
/// Frames buffered before the oldest audio is overwritten.
const MAX_FRAMES: usize = 3;

/// Probability reported for frames classified as speech.
pub const SPEECH_PROBABILITY: f64 = 0.5;
/// Probability reported for frames classified as non-speech.
pub const NON_SPEECH_PROBABILITY: f64 = 0.01;

/// Collects up to three 10 ms frames and classifies them together.
///
/// ```
/// use antiphon_vad::StandaloneVad;
///
/// let mut vad = StandaloneVad::new();
/// vad.add_audio(&[0; 160]).unwrap();
/// vad.add_audio(&[0; 160]).unwrap();
/// let p = vad.get_activity(2).unwrap();
/// assert!(p.iter().all(|&p| p < 0.1));
/// ```
#[derive(Debug)]
pub struct StandaloneVad {
    vad: Vad,
    #[debug(skip)]
    buffer: [i16; FRAME_LENGTH * MAX_FRAMES],
    buffered: usize,
}

impl Default for StandaloneVad {
    fn default() -> Self {
        Self::new()
    }
}

impl StandaloneVad {
    pub fn new() -> Self {
        Self {
            vad: Vad::with_mode(VadMode::VeryAggressive),
            buffer: [0; FRAME_LENGTH * MAX_FRAMES],
            buffered: 0,
        }
    }

    pub fn set_mode(&mut self, mode: i32) -> Result<(), VadError> {
        self.vad.set_mode(mode)
    }

    pub fn mode(&self) -> i32 {
        self.vad.mode().into()
    }

    /// Number of frames waiting for [`get_activity`](Self::get_activity).
    pub fn buffered_frames(&self) -> usize {
        self.buffered / FRAME_LENGTH
    }

    /// Buffers one 10 ms frame of 16 kHz audio. When the buffer is full
    /// it starts over, dropping the frames that were never read.
    pub fn add_audio(&mut self, frame: &[i16]) -> Result<(), VadError> {
        if frame.len() != FRAME_LENGTH {
            return Err(VadError::InvalidFrameLength {
                len: frame.len(),
                sample_rate_hz: SAMPLE_RATE_HZ,
            });
        }
        if self.buffered == self.buffer.len() {
            self.buffered = 0;
        }
        self.buffer[self.buffered..self.buffered + FRAME_LENGTH].copy_from_slice(frame);
        self.buffered += FRAME_LENGTH;
        Ok(())
    }

    /// Classifies the buffered audio and empties the buffer.
    ///
    /// Returns `slots` values. The first [`buffered_frames`](Self::buffered_frames)
    /// hold the probability of the buffered audio; any remaining slots are
    /// zero.
    pub fn get_activity(&mut self, slots: usize) -> Result<Vec<f64>, VadError> {
        let frames = self.buffered_frames();
        if frames == 0 {
            return Err(VadError::NothingBuffered);
        }
        if slots < frames {
            return Err(VadError::NotEnoughSlots {
                requested: slots,
                buffered: frames,
            });
        }
        let speech = self
            .vad
            .is_speech(&self.buffer[..self.buffered], SAMPLE_RATE_HZ)?;
        let probability = if speech {
            SPEECH_PROBABILITY
        } else {
            NON_SPEECH_PROBABILITY
        };
        self.buffered = 0;

        let mut activity = vec![0.0; slots];
        activity[..frames].fill(probability);
        Ok(activity)
    }
}
