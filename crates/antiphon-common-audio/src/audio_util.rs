//! Sample format conversions and channel layout helpers.
//!
//! | Name      | Type    | Range                     |
//! |-----------|---------|---------------------------|
//! | S16       | `i16`   | \[-32768, 32767\]         |
//! | Float     | `f32`   | \[-1.0, 1.0\]             |
//! | FloatS16  | `f32`   | \[-32768.0, 32767.0\]     |
//!
//! All processing inside the pipeline happens on FloatS16 planar buffers.

/// Smallest FloatS16 sample value.
pub const MIN_FLOAT_S16_VALUE: f32 = -32768.0;
/// Largest FloatS16 sample value.
pub const MAX_FLOAT_S16_VALUE: f32 = 32767.0;
/// Magnitude of a full-scale FloatS16 sample.
pub const MAX_ABS_FLOAT_S16_VALUE: f32 = 32768.0;

/// dBFS value of a single LSB, `20 * log10(1 / 32768)`.
pub const MIN_DBFS: f32 = -90.309;

/// Rounds a FloatS16 sample to S16, saturating.
#[inline]
pub fn float_s16_to_s16(v: f32) -> i16 {
    let v = v.clamp(MIN_FLOAT_S16_VALUE, MAX_FLOAT_S16_VALUE);
    (v + f32::copysign(0.5, v)) as i16
}

/// Scales a Float sample into the FloatS16 range.
#[inline]
pub fn float_to_float_s16(v: f32) -> f32 {
    v.clamp(-1.0, 1.0) * MAX_ABS_FLOAT_S16_VALUE
}

/// Scales a FloatS16 sample back into the Float range.
#[inline]
pub fn float_s16_to_float(v: f32) -> f32 {
    v.clamp(MIN_FLOAT_S16_VALUE, MAX_ABS_FLOAT_S16_VALUE) / MAX_ABS_FLOAT_S16_VALUE
}

/// Converts a dB value to a linear amplitude ratio.
#[inline]
pub fn db_to_ratio(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Converts a non-negative FloatS16 amplitude to dBFS.
#[inline]
pub fn float_s16_to_dbfs(v: f32) -> f32 {
    debug_assert!(v >= 0.0);
    if v <= 1.0 {
        return MIN_DBFS;
    }
    20.0 * v.log10() + MIN_DBFS
}

/// Splits an interleaved S16 buffer into FloatS16 channel buffers.
///
/// `dst.len()` is the channel count; every channel must already hold
/// `src.len() / dst.len()` samples.
pub fn deinterleave_s16(src: &[i16], dst: &mut [Vec<f32>]) {
    let num_channels = dst.len();
    debug_assert_eq!(src.len() % num_channels, 0);
    for (ch, channel) in dst.iter_mut().enumerate() {
        for (d, &s) in channel
            .iter_mut()
            .zip(src.iter().skip(ch).step_by(num_channels))
        {
            *d = f32::from(s);
        }
    }
}

/// Splits an interleaved Float buffer into FloatS16 channel buffers.
pub fn deinterleave_f32(src: &[f32], dst: &mut [Vec<f32>]) {
    let num_channels = dst.len();
    debug_assert_eq!(src.len() % num_channels, 0);
    for (ch, channel) in dst.iter_mut().enumerate() {
        for (d, &s) in channel
            .iter_mut()
            .zip(src.iter().skip(ch).step_by(num_channels))
        {
            *d = float_to_float_s16(s);
        }
    }
}

/// Writes FloatS16 channel buffers into an interleaved S16 buffer.
///
/// When `dst` has room for a single channel only, the channels are averaged.
pub fn interleave_s16(src: &[Vec<f32>], dst: &mut [i16]) {
    let num_frames = src.first().map_or(0, Vec::len);
    if num_frames == 0 {
        return;
    }
    let dst_channels = dst.len() / num_frames;
    if dst_channels == 1 && src.len() > 1 {
        let scale = 1.0 / src.len() as f32;
        for (i, d) in dst.iter_mut().enumerate() {
            let sum: f32 = src.iter().map(|channel| channel[i]).sum();
            *d = float_s16_to_s16(sum * scale);
        }
        return;
    }
    for (ch, channel) in src.iter().enumerate().take(dst_channels) {
        for (d, &s) in dst.iter_mut().skip(ch).step_by(dst_channels).zip(channel) {
            *d = float_s16_to_s16(s);
        }
    }
}

/// Writes FloatS16 channel buffers into an interleaved Float buffer.
///
/// When `dst` has room for a single channel only, the channels are averaged.
pub fn interleave_f32(src: &[Vec<f32>], dst: &mut [f32]) {
    let num_frames = src.first().map_or(0, Vec::len);
    if num_frames == 0 {
        return;
    }
    let dst_channels = dst.len() / num_frames;
    if dst_channels == 1 && src.len() > 1 {
        let scale = 1.0 / src.len() as f32;
        for (i, d) in dst.iter_mut().enumerate() {
            let sum: f32 = src.iter().map(|channel| channel[i]).sum();
            *d = float_s16_to_float(sum * scale);
        }
        return;
    }
    for (ch, channel) in src.iter().enumerate().take(dst_channels) {
        for (d, &s) in dst.iter_mut().skip(ch).step_by(dst_channels).zip(channel) {
            *d = float_s16_to_float(s);
        }
    }
}

/// Averages all channels into `dst`.
pub fn downmix_to_mono(src: &[Vec<f32>], dst: &mut [f32]) {
    match src {
        [] => dst.fill(0.0),
        [mono] => dst.copy_from_slice(&mono[..dst.len()]),
        channels => {
            let scale = 1.0 / channels.len() as f32;
            for (i, d) in dst.iter_mut().enumerate() {
                *d = channels.iter().map(|channel| channel[i]).sum::<f32>() * scale;
            }
        }
    }
}

/// Mean energy of a FloatS16 signal.
pub fn mean_square(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32
}

/// Linear root-mean-square of an S16 signal.
pub fn root_mean_square_s16(signal: &[i16]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let energy: f64 = signal.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (energy / signal.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_s16_to_s16_rounds_and_saturates() {
        assert_eq!(float_s16_to_s16(0.4), 0);
        assert_eq!(float_s16_to_s16(0.6), 1);
        assert_eq!(float_s16_to_s16(-0.6), -1);
        assert_eq!(float_s16_to_s16(40_000.0), i16::MAX);
        assert_eq!(float_s16_to_s16(-40_000.0), i16::MIN);
    }

    #[test]
    fn deinterleave_then_interleave_stereo() {
        let src: Vec<i16> = vec![1, -1, 2, -2, 3, -3];
        let mut planar = vec![vec![0.0; 3]; 2];
        deinterleave_s16(&src, &mut planar);
        assert_eq!(planar[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(planar[1], vec![-1.0, -2.0, -3.0]);

        let mut out = vec![0i16; 6];
        interleave_s16(&planar, &mut out);
        assert_eq!(out, src);
    }

    #[test]
    fn interleave_to_single_channel_averages() {
        let planar = vec![vec![100.0, 200.0], vec![300.0, 0.0]];
        let mut out = vec![0i16; 2];
        interleave_s16(&planar, &mut out);
        assert_eq!(out, vec![200, 100]);
    }

    #[test]
    fn float_round_trip_stays_in_range() {
        let src = [0.5f32, -0.25, 1.0, -1.0];
        let mut planar = vec![vec![0.0; 4]];
        deinterleave_f32(&src, &mut planar);
        assert_eq!(planar[0][0], 16384.0);
        let mut out = [0.0f32; 4];
        interleave_f32(&planar, &mut out);
        for (a, b) in src.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn full_scale_is_zero_dbfs() {
        assert!(float_s16_to_dbfs(32768.0).abs() < 0.01);
        assert_eq!(float_s16_to_dbfs(0.5), MIN_DBFS);
    }

    #[test]
    fn rms_of_constant_signal() {
        assert_eq!(root_mean_square_s16(&[1000; 160]), 1000.0);
        assert_eq!(root_mean_square_s16(&[]), 0.0);
    }
}
