//! Stream format descriptors.

/// Sample rate used when no stream format has been given.
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 32_000;
/// Channel count used when no stream format has been given.
pub const DEFAULT_NUM_CHANNELS: u16 = 1;
/// Length of one processing block.
pub const DEFAULT_BLOCK_MS: u32 = 10;

/// Rates the pipeline processes natively.
pub(crate) const NATIVE_SAMPLE_RATES_HZ: [u32; 4] = [8_000, 16_000, 32_000, 48_000];

/// Samples per channel in one block at `sample_rate_hz`.
pub const fn frame_size(sample_rate_hz: u32) -> usize {
    sample_rate_hz as usize / (1000 / DEFAULT_BLOCK_MS) as usize
}

/// Sample rate and channel count of an interleaved stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamConfig {
    sample_rate_hz: u32,
    num_channels: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE_HZ, DEFAULT_NUM_CHANNELS)
    }
}

impl StreamConfig {
    /// The pipeline validates the format on use: only 8, 16, 32 and 48 kHz
    /// are processed.
    pub const fn new(sample_rate_hz: u32, num_channels: u16) -> Self {
        Self {
            sample_rate_hz,
            num_channels,
        }
    }

    #[inline]
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    #[inline]
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    pub fn set_sample_rate_hz(&mut self, sample_rate_hz: u32) {
        self.sample_rate_hz = sample_rate_hz;
    }

    pub fn set_num_channels(&mut self, num_channels: u16) {
        self.num_channels = num_channels;
    }

    /// Frames (samples per channel) in one 10 ms block.
    #[inline]
    pub fn num_frames(&self) -> usize {
        frame_size(self.sample_rate_hz)
    }

    /// Interleaved samples in one 10 ms block.
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.num_channels as usize * self.num_frames()
    }

    pub(crate) fn is_native_rate(&self) -> bool {
        NATIVE_SAMPLE_RATES_HZ.contains(&self.sample_rate_hz)
    }
}
