use crate::config::Config;

/// Which submodules run, derived from the effective configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SubmoduleStates {
    pub(crate) high_pass_filter: bool,
    pub(crate) echo_canceller: bool,
    pub(crate) mobile_echo_canceller: bool,
    pub(crate) noise_suppressor: bool,
    pub(crate) gain_controller1: bool,
    pub(crate) gain_controller2: bool,
}

impl SubmoduleStates {
    pub(crate) fn from_config(config: &Config) -> Self {
        let ec = &config.echo_canceller;
        Self {
            high_pass_filter: config.high_pass_filter.enabled,
            echo_canceller: ec.enabled && !ec.mobile_mode,
            mobile_echo_canceller: ec.enabled && ec.mobile_mode,
            noise_suppressor: config.noise_suppression.enabled,
            gain_controller1: config.gain_controller1.enabled,
            gain_controller2: config.gain_controller2.enabled,
        }
    }

    /// Stores `new` and reports whether anything changed.
    pub(crate) fn update(&mut self, new: Self) -> bool {
        let changed = *self != new;
        *self = new;
        changed
    }

    pub(crate) fn any_echo_canceller(&self) -> bool {
        self.echo_canceller || self.mobile_echo_canceller
    }

    /// Whether render frames feed any submodule.
    pub(crate) fn render_analysis_active(&self) -> bool {
        self.any_echo_canceller()
    }

    /// Whether any submodule modifies the capture signal.
    pub(crate) fn capture_processing_active(&self) -> bool {
        self.high_pass_filter
            || self.any_echo_canceller()
            || self.noise_suppressor
            || self.gain_controller1
            || self.gain_controller2
    }
}
