//! Noise suppression configuration.

/// Split frequency between the two analysis bands.
pub const BAND_SPLIT_HZ: f32 = 1000.0;

/// Number of analysis bands per channel.
pub const NUM_BANDS: usize = 2;

/// Frames after start-up during which the noise estimate follows the input
/// directly.
pub const STARTUP_FRAMES: u32 = 20;

/// Maximum attenuation applied to noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuppressionLevel {
    K6dB,
    #[default]
    K12dB,
    K18dB,
    K21dB,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NsConfig {
    pub target_level: SuppressionLevel,
}
