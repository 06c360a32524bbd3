use antiphon_common_audio::audio_util::{MAX_FLOAT_S16_VALUE, MIN_FLOAT_S16_VALUE};

/// Applies a linear gain, ramping from the previous frame's gain to avoid
/// discontinuities.
#[derive(Debug, Clone)]
pub(crate) struct GainApplier {
    current_gain: f32,
}

impl GainApplier {
    pub(crate) fn new(initial_gain: f32) -> Self {
        Self {
            current_gain: initial_gain,
        }
    }

    pub(crate) fn set_gain(&mut self, gain: f32) {
        self.current_gain = gain;
    }

    pub(crate) fn apply(&mut self, target_gain: f32, frame: &mut [Vec<f32>]) {
        let start = self.current_gain;
        self.current_gain = target_gain;
        if start == 1.0 && target_gain == 1.0 {
            return;
        }
        for channel in frame.iter_mut() {
            let step = (target_gain - start) / channel.len().max(1) as f32;
            let mut gain = start;
            for x in channel.iter_mut() {
                gain += step;
                *x = (*x * gain).clamp(MIN_FLOAT_S16_VALUE, MAX_FLOAT_S16_VALUE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramps_to_target() {
        let mut applier = GainApplier::new(1.0);
        let mut frame = vec![vec![100.0; 4]];
        applier.apply(2.0, &mut frame);
        assert_eq!(frame[0], vec![125.0, 150.0, 175.0, 200.0]);

        let mut frame = vec![vec![100.0; 4]];
        applier.apply(2.0, &mut frame);
        assert_eq!(frame[0], vec![200.0; 4]);
    }

    #[test]
    fn clamps_to_s16_range() {
        let mut applier = GainApplier::new(10.0);
        let mut frame = vec![vec![10_000.0, -10_000.0]];
        applier.apply(10.0, &mut frame);
        assert_eq!(frame[0], vec![MAX_FLOAT_S16_VALUE, MIN_FLOAT_S16_VALUE]);
    }
}
