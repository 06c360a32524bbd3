#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use antiphon::{AudioProcessing, Config, StreamConfig};
use antiphon::config::{
    EchoCanceller, GainController1, GainController1Mode, GainController2, HighPassFilter,
    NoiseSuppression, NoiseSuppressionLevel,
};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    configs: Vec<FuzzConfig>,
    /// Audio samples to process between config changes
    samples: Vec<f32>,
}

#[derive(Debug, Arbitrary)]
struct FuzzConfig {
    hpf_enabled: bool,
    ec_enabled: bool,
    ec_mobile: bool,
    ec_export_linear: bool,
    ns_enabled: bool,
    ns_level: u8,
    ns_on_linear: bool,
    agc1_enabled: bool,
    agc1_mode: u8,
    agc1_target: i32,
    agc1_gain: i32,
    agc2_enabled: bool,
}

fn ns_level(idx: u8) -> NoiseSuppressionLevel {
    match idx % 4 {
        0 => NoiseSuppressionLevel::Low,
        1 => NoiseSuppressionLevel::Moderate,
        2 => NoiseSuppressionLevel::High,
        _ => NoiseSuppressionLevel::VeryHigh,
    }
}

fn agc1_mode(idx: u8) -> GainController1Mode {
    match idx % 3 {
        0 => GainController1Mode::AdaptiveAnalog,
        1 => GainController1Mode::AdaptiveDigital,
        _ => GainController1Mode::FixedDigital,
    }
}

fuzz_target!(|input: FuzzInput| {
    let stream = StreamConfig::new(16000, 1);
    let frames = stream.num_samples();

    if input.samples.len() < frames || input.configs.is_empty() {
        return;
    }

    let Ok(mut apm) = AudioProcessing::builder()
        .capture_config(stream)
        .render_config(stream)
        .build()
    else {
        return;
    };
    let src: Vec<f32> = input.samples[..frames]
        .iter()
        .map(|s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 })
        .collect();
    let mut dest = vec![0.0f32; frames];

    for cfg in &input.configs {
        let config = Config {
            high_pass_filter: HighPassFilter {
                enabled: cfg.hpf_enabled,
                ..Default::default()
            },
            echo_canceller: EchoCanceller {
                enabled: cfg.ec_enabled,
                mobile_mode: cfg.ec_mobile,
                export_linear_aec_output: cfg.ec_export_linear,
                ..Default::default()
            },
            noise_suppression: NoiseSuppression {
                enabled: cfg.ns_enabled,
                level: ns_level(cfg.ns_level),
                analyze_linear_aec_output_when_available: cfg.ns_on_linear,
            },
            gain_controller1: GainController1 {
                enabled: cfg.agc1_enabled,
                mode: agc1_mode(cfg.agc1_mode),
                target_level_dbfs: cfg.agc1_target,
                compression_gain_db: cfg.agc1_gain,
                ..Default::default()
            },
            gain_controller2: GainController2 {
                enabled: cfg.agc2_enabled,
            },
        };
        let previous = apm.get_config();
        if apm.apply_config(config).is_err() {
            assert_eq!(apm.get_config(), previous);
        }

        apm.set_stream_delay_ms(0);
        let _ = apm.process_reverse_stream_f32(&src, &stream, &stream, &mut dest);
        let _ = apm.process_stream_f32(&src, &stream, &stream, &mut dest);
        if apm.get_config().echo_canceller.export_linear_aec_output {
            assert!(apm.linear_aec_output().is_ok());
        }
    }
});
