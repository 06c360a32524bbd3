//! Process raw PCM files offline: echo cancellation, analog AGC, AGC2 and
//! the high-pass filter on a recorded capture stream.
//!
//! Inputs are headerless 16-bit little-endian PCM. The playback file is the
//! far-end (render) signal, the recording the near-end (capture) signal.
//!
//! ```sh
//! cargo run -p antiphon --features examples --example offline -- play.raw rec.raw out.raw
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use antiphon::config::{GainController1, GainController1Mode};
use antiphon::{
    AudioProcessing, Config, DEFAULT_NUM_CHANNELS, DEFAULT_SAMPLE_RATE_HZ, StreamConfig,
};

#[derive(Parser, Debug)]
#[command(about = "Process raw 16-bit PCM files through antiphon")]
struct Args {
    /// Far-end (render) audio.
    play_file: PathBuf,

    /// Near-end (capture) audio.
    rec_file: PathBuf,

    /// Destination for the processed capture audio.
    out_file: PathBuf,

    /// Sample rate of all three files.
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE_HZ)]
    rate: u32,

    /// Interleaved channels in all three files.
    #[arg(long, default_value_t = DEFAULT_NUM_CHANNELS)]
    channels: u16,

    /// Delay between playback and its echo in the recording.
    #[arg(long, default_value_t = 0)]
    delay_ms: i32,

    /// Enable noise suppression as well.
    #[arg(long)]
    ns: bool,
}

fn read_pcm(path: &PathBuf) -> Result<Vec<i16>> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let play = read_pcm(&args.play_file)?;
    let rec = read_pcm(&args.rec_file)?;

    let mut config = Config::default();
    config.echo_canceller.enabled = true;
    config.gain_controller1 = GainController1 {
        enabled: true,
        mode: GainController1Mode::AdaptiveAnalog,
        ..Default::default()
    };
    config.gain_controller2.enabled = true;
    config.high_pass_filter.enabled = true;
    config.noise_suppression.enabled = args.ns;

    let stream = StreamConfig::new(args.rate, args.channels);
    ensure!(stream.num_samples() > 0, "empty frame for {stream:?}");
    let mut apm = AudioProcessing::builder()
        .config(config)
        .capture_config(stream)
        .render_config(stream)
        .build()
        .context("creating the pipeline")?;

    let frame_len = stream.num_samples();
    let num_frames = play.len().min(rec.len()) / frame_len;
    info!(num_frames, frame_len, "processing");

    let mut play_out = vec![0i16; frame_len];
    let mut out = Vec::with_capacity(num_frames * frame_len * 2);
    let mut analog_level = 127;
    let mut warnings = 0usize;
    for (play_frame, rec_frame) in play
        .chunks_exact(frame_len)
        .zip(rec.chunks_exact(frame_len))
    {
        apm.process_reverse_stream_i16(play_frame, &stream, &stream, &mut play_out)?;

        apm.set_stream_delay_ms(args.delay_ms);
        apm.set_stream_analog_level(analog_level);
        let mut processed = vec![0i16; frame_len];
        if apm
            .process_stream_i16(rec_frame, &stream, &stream, &mut processed)?
            .is_some()
        {
            warnings += 1;
        }
        analog_level = apm.recommended_stream_analog_level()?;

        out.extend(processed.iter().flat_map(|s| s.to_le_bytes()));
    }

    fs::write(&args.out_file, &out)
        .with_context(|| format!("writing {}", args.out_file.display()))?;

    let stats = apm.statistics();
    println!(
        "processed {num_frames} frames ({:.2} s), {warnings} warnings",
        num_frames as f64 * 0.01
    );
    println!("  final analog level: {analog_level}");
    if let Some(erle) = stats.echo_return_loss_enhancement {
        println!("  ERLE: {erle:.1} dB");
    }
    if let Some(rms) = stats.output_rms_dbfs {
        println!("  output level: -{rms} dBFS");
    }
    Ok(())
}
