//! Benchmarks for the antiphon pipeline and components.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use antiphon::config::{EchoCanceller, GainController2, NoiseSuppression};
use antiphon::{AudioProcessing, Config, Resampler, StandaloneVad, StreamConfig};
use antiphon_ns::{NoiseSuppressor, NsConfig};

// ---------------------------------------------------------------------------
// Full pipeline benchmarks
// ---------------------------------------------------------------------------

fn make_apm(sample_rate: u32, channels: u16) -> (AudioProcessing, StreamConfig) {
    let config = Config {
        echo_canceller: EchoCanceller {
            enabled: true,
            ..Default::default()
        },
        noise_suppression: NoiseSuppression {
            enabled: true,
            ..Default::default()
        },
        gain_controller2: GainController2 { enabled: true },
        ..Default::default()
    };
    let stream = StreamConfig::new(sample_rate, channels);
    let mut apm = AudioProcessing::builder()
        .config(config)
        .capture_config(stream)
        .render_config(stream)
        .build()
        .unwrap();

    // Warm up the internal state with a few frames so we bench steady-state.
    let src = signal(stream.num_samples());
    let mut dst = vec![0.0f32; stream.num_samples()];
    for _ in 0..20 {
        apm.process_reverse_stream_f32(&src, &stream, &stream, &mut dst)
            .unwrap();
        apm.set_stream_delay_ms(0);
        apm.process_stream_f32(&src, &stream, &stream, &mut dst)
            .unwrap();
    }
    (apm, stream)
}

fn signal(len: usize) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * 0.01).sin() * 0.1).collect()
}

fn bench_process_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_stream");

    for (name, rate, channels) in [
        ("16k_mono", 16000, 1),
        ("48k_mono", 48000, 1),
        ("48k_stereo", 48000, 2),
    ] {
        let (mut apm, stream) = make_apm(rate, channels);
        let src = signal(stream.num_samples());
        let mut dst = vec![0.0f32; stream.num_samples()];

        group.bench_function(name, |b| {
            b.iter(|| {
                apm.process_reverse_stream_f32(black_box(&src), &stream, &stream, &mut dst)
                    .unwrap();
                apm.set_stream_delay_ms(0);
                apm.process_stream_f32(black_box(&src), &stream, &stream, &mut dst)
                    .unwrap();
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Component benchmarks
// ---------------------------------------------------------------------------

fn bench_noise_suppressor(c: &mut Criterion) {
    let mut group = c.benchmark_group("noise_suppressor");
    let mut ns = NoiseSuppressor::new(NsConfig::default(), 16000, 1);

    let mut frame = vec![signal(160).iter().map(|s| s * 32768.0).collect::<Vec<f32>>()];

    // Warm up
    for _ in 0..50 {
        ns.analyze(&frame, false);
        ns.process(&mut frame);
    }

    group.bench_function("analyze_and_process", |b| {
        b.iter(|| {
            ns.analyze(black_box(&frame), false);
            ns.process(black_box(&mut frame));
        });
    });

    group.finish();
}

fn bench_resampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("resampler");

    let mut resampler = Resampler::new(48000, 16000, 1).unwrap();
    let input = signal(480);
    let mut output = vec![0.0f32; resampler.max_output_len(input.len())];

    // Warm up
    for _ in 0..20 {
        resampler.process_f32_into(&input, &mut output).unwrap();
    }

    group.bench_function("48k_to_16k", |b| {
        b.iter(|| {
            resampler
                .process_f32_into(black_box(&input), &mut output)
                .unwrap();
        });
    });

    group.finish();
}

fn bench_standalone_vad(c: &mut Criterion) {
    let mut group = c.benchmark_group("standalone_vad");
    let mut vad = StandaloneVad::new();
    let frame: Vec<i16> = signal(160).iter().map(|s| (s * 32767.0) as i16).collect();

    group.bench_function("add_and_get_activity", |b| {
        b.iter(|| {
            vad.add_audio(black_box(&frame)).unwrap();
            vad.get_activity(1).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_process_stream,
    bench_noise_suppressor,
    bench_resampler,
    bench_standalone_vad,
);
criterion_main!(benches);
