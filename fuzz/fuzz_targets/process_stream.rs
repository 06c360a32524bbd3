#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use antiphon::config::{EchoCanceller, GainController1, GainController2, NoiseSuppression};
use antiphon::{AudioProcessing, Config, StreamConfig};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    /// Sample rate index: 0=8k, 1=16k, 2=32k, 3=48k
    capture_rate_idx: u8,
    render_rate_idx: u8,
    /// Number of channels (clamped to 1-2)
    channels: u8,
    mobile_mode: bool,
    stream_delay_ms: i32,
    analog_level: i32,
    key_pressed: bool,
    /// Interleaved capture samples; the render stream reuses them.
    samples: Vec<f32>,
}

fn sample_rate(idx: u8) -> u32 {
    match idx % 4 {
        0 => 8000,
        1 => 16000,
        2 => 32000,
        _ => 48000,
    }
}

/// Clamp to valid audio range [-1, 1], replacing NaN/inf with 0.
fn sanitize_sample(s: f32) -> f32 {
    if s.is_finite() {
        s.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

fuzz_target!(|input: FuzzInput| {
    let channels = u16::from(input.channels % 2) + 1;
    let capture = StreamConfig::new(sample_rate(input.capture_rate_idx), channels);
    let render = StreamConfig::new(sample_rate(input.render_rate_idx), channels);
    let needed = capture.num_samples().max(render.num_samples());
    if input.samples.len() < needed {
        return;
    }

    let config = Config {
        echo_canceller: EchoCanceller {
            enabled: true,
            mobile_mode: input.mobile_mode,
            ..Default::default()
        },
        noise_suppression: NoiseSuppression {
            enabled: true,
            ..Default::default()
        },
        gain_controller1: GainController1 {
            enabled: true,
            ..Default::default()
        },
        gain_controller2: GainController2 { enabled: true },
        ..Default::default()
    };
    let Ok(mut apm) = AudioProcessing::builder()
        .config(config)
        .capture_config(capture)
        .render_config(render)
        .build()
    else {
        return;
    };

    let sanitized: Vec<f32> = input.samples.iter().copied().map(sanitize_sample).collect();
    let mut render_out = vec![0.0f32; render.num_samples()];
    let _ = apm.process_reverse_stream_f32(
        &sanitized[..render.num_samples()],
        &render,
        &render,
        &mut render_out,
    );

    apm.set_stream_delay_ms(input.stream_delay_ms);
    apm.set_stream_analog_level(input.analog_level);
    apm.set_stream_key_pressed(input.key_pressed);
    let mut dest = vec![0.0f32; capture.num_samples()];
    if apm
        .process_stream_f32(&sanitized[..capture.num_samples()], &capture, &capture, &mut dest)
        .is_ok()
    {
        assert!(dest.iter().all(|s| s.is_finite()));
    }
    let _ = apm.recommended_stream_analog_level();
    let _ = apm.statistics();
});
