//! Sample-rate and channel-layout conversion for loaded assets.
//!
//! Book audio arrives at whatever rate and channel count it was authored
//! with; the output device dictates its own format.  Assets are converted
//! once at load time so starting a playback span later is a cheap copy:
//!
//! 1. [`downmix_to_mono`] — average any number of interleaved channels.
//! 2. [`resample`] — linear interpolation to the device rate.
//! 3. [`adapt_to_device`] — the composition, fanning mono back out to the
//!    device channel count.
//!
//! ## Upgrade note
//!
//! The resampler uses linear interpolation (fast, zero extra deps).  For
//! better quality replace the inner loop with the `rubato` crate
//! (`SincFixedIn` + `BlackmanHarris2` window) — rubato is already listed
//! in `Cargo.toml` for that upgrade path.

use super::backend::AudioData;

// ---------------------------------------------------------------------------
// downmix_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all
/// channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input is returned as an owned `Vec` unchanged.
/// * If `channels == 0` an empty vector is returned.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `source_rate` Hz to `target_rate` Hz using
/// linear interpolation.
///
/// * If the rates match, the input is cloned and returned unchanged.
/// * If `samples` is empty an empty vector is returned.
///
/// The output length is approximately
/// `samples.len() * target_rate / source_rate`.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }

    if samples.is_empty() || source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            // Linear interpolation between adjacent samples
            samples[idx] * (1.0 - frac as f32) + samples[idx + 1] * frac as f32
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// adapt_to_device
// ---------------------------------------------------------------------------

/// Convert `data` to the device's sample rate and channel count.
///
/// The asset is downmixed to mono, resampled, then the mono signal is
/// duplicated across all `target_channels`.  Returns interleaved samples
/// ready for the output callback.
pub fn adapt_to_device(data: &AudioData, target_rate: u32, target_channels: u16) -> Vec<f32> {
    let mono = downmix_to_mono(&data.samples, data.channels);
    let resampled = resample(&mono, data.sample_rate, target_rate);

    match target_channels {
        0 => Vec::new(),
        1 => resampled,
        n => {
            let n = n as usize;
            let mut out = Vec::with_capacity(resampled.len() * n);
            for &s in &resampled {
                for _ in 0..n {
                    out.push(s);
                }
            }
            out
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- downmix_to_mono ---------------------------------------------------

    #[test]
    fn downmix_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&input, 1), input);
    }

    #[test]
    fn downmix_two_channel() {
        let input = vec![1.0_f32, -1.0, 0.5, 0.5];
        let out = downmix_to_mono(&input, 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6); // (1.0 + -1.0) / 2
        assert!((out[1] - 0.5).abs() < 1e-6); // (0.5 + 0.5) / 2
    }

    #[test]
    fn downmix_zero_channels() {
        assert!(downmix_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    // ---- resample ----------------------------------------------------------

    #[test]
    fn resample_same_rate_is_noop() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        let out = resample(&input, 44_100, 44_100);
        assert_eq!(out, input);
    }

    #[test]
    fn resample_empty_input() {
        assert!(resample(&[], 44_100, 48_000).is_empty());
    }

    #[test]
    fn resample_downsample_length() {
        // 480 samples @ 48 kHz = 10 ms → 160 samples @ 16 kHz
        let input = vec![0.5_f32; 480];
        assert_eq!(resample(&input, 48_000, 16_000).len(), 160);
    }

    #[test]
    fn resample_upsample_length() {
        // 441 samples @ 44.1 kHz = 10 ms → ~480 samples @ 48 kHz
        let input = vec![0.0_f32; 441];
        let out = resample(&input, 44_100, 48_000);
        assert!(out.len().abs_diff(480) <= 1, "got {}", out.len());
    }

    #[test]
    fn resample_constant_signal_preserves_amplitude() {
        let input = vec![0.5_f32; 480];
        for &s in &resample(&input, 48_000, 44_100) {
            assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
        }
    }

    // ---- adapt_to_device ---------------------------------------------------

    #[test]
    fn adapt_fans_mono_out_to_stereo() {
        let data = AudioData {
            samples: vec![0.25_f32; 100],
            sample_rate: 48_000,
            channels: 1,
        };
        let out = adapt_to_device(&data, 48_000, 2);
        assert_eq!(out.len(), 200);
        assert!((out[0] - 0.25).abs() < 1e-6);
        assert!((out[1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn adapt_stereo_to_mono_device() {
        let data = AudioData {
            samples: vec![0.4_f32, 0.2, 0.4, 0.2],
            sample_rate: 48_000,
            channels: 2,
        };
        let out = adapt_to_device(&data, 48_000, 1);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn adapt_changes_rate_and_channels_together() {
        // 480 stereo frames @ 48 kHz → 160 frames @ 16 kHz, stereo out
        let data = AudioData {
            samples: vec![0.1_f32; 960],
            sample_rate: 48_000,
            channels: 2,
        };
        let out = adapt_to_device(&data, 16_000, 2);
        assert_eq!(out.len(), 320);
    }
}
