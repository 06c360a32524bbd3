//! Pipeline statistics.

/// Figures gathered since the last call to
/// [`AudioProcessing::statistics`](crate::AudioProcessing::statistics).
///
/// `None` means the statistic is unavailable, usually because the submodule
/// producing it is disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioProcessingStats {
    /// Output level in `-dBFS` (0 is full scale, 127 digital silence),
    /// averaged over the frames processed since the previous read.
    pub output_rms_dbfs: Option<i32>,
    /// Speech probability of the last frame, from the gain controller 2
    /// voice activity detector.
    pub voice_probability: Option<f64>,
    /// Echo Return Loss Enhancement in dB: `ERLE = 10 log10(P_echo / P_out)`.
    pub echo_return_loss_enhancement: Option<f64>,
    /// Render-to-capture delay the echo canceller compensates.
    pub delay_ms: Option<i32>,
}
