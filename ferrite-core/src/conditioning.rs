//! Pure transforms over the sample buffer.
//!
//! Each operation rewrites the buffer in place (or replaces it) and leaves
//! the samples saturated to `[-127, 127]`. They are the manual conditioning
//! steps run before clock recovery and demodulation.

use crate::buffer::{clamp_sample, sat_add, SampleBuffer, SAMPLE_MAX, SAMPLE_MIN};
use crate::clock;
use crate::errors::{ArgError, ClockError, Result};

/// Remove the DC offset so the trace centers around zero.
///
/// After this the residual mean is at most one count.
pub fn hpf(buf: &mut SampleBuffer) {
    let samples = buf.as_mut_slice();
    if samples.is_empty() {
        return;
    }
    let sum: i64 = samples.iter().map(|&s| s as i64).sum();
    let mean = sum / samples.len() as i64;
    for s in samples.iter_mut() {
        *s = clamp_sample(*s as i64 - mean);
    }
}

/// Normalize so the observed swing spans 256 counts around zero.
///
/// The first ten samples are excluded from the min/max scan; a flat trace is
/// left untouched.
pub fn normalize(buf: &mut SampleBuffer) {
    let samples = buf.as_mut_slice();
    if samples.len() <= 10 {
        return;
    }
    let mut max = i32::MIN;
    let mut min = i32::MAX;
    for &s in &samples[10..] {
        max = max.max(s);
        min = min.min(s);
    }
    if max == min {
        return;
    }
    let mid = (max + min) / 2;
    for s in samples.iter_mut() {
        *s = clamp_sample((*s as i64 - mid as i64) * 256 / (max - min) as i64);
    }
}

/// Keep every n-th sample.
pub fn decimate(buf: &mut SampleBuffer, n: usize) -> Result<()> {
    if n < 1 {
        return Err(ArgError::InvalidValue {
            name: "decimation factor",
            value: n as i64,
        }
        .into());
    }
    let kept: Vec<i32> = buf.as_slice().iter().copied().step_by(n).collect();
    buf.replace(kept);
    Ok(())
}

/// Expand each adjacent pair into `n` linearly interpolated samples.
///
/// Output length is capped at the buffer maximum.
pub fn interpolate(buf: &mut SampleBuffer, n: usize) -> Result<()> {
    if n < 1 {
        return Err(ArgError::InvalidValue {
            name: "interpolation factor",
            value: n as i64,
        }
        .into());
    }
    let src = buf.as_slice();
    if src.len() < 2 || n == 1 {
        return Ok(());
    }
    let mut out = Vec::with_capacity((src.len() * n).min(buf.max_len()));
    'outer: for w in src.windows(2) {
        let (a, b) = (w[0] as i64, w[1] as i64);
        for step in 0..n {
            if out.len() >= buf.max_len() {
                break 'outer;
            }
            let v = (a * (n - step) as i64 + b * step as i64) / n as i64;
            out.push(clamp_sample(v));
        }
    }
    buf.replace(out);
    Ok(())
}

/// Add `k` to every sample, saturating.
pub fn shift(buf: &mut SampleBuffer, k: i32) {
    for s in buf.as_mut_slice() {
        *s = sat_add(*s, k);
    }
}

/// Two-sided threshold: rising samples reaching `up` latch +1, falling
/// samples reaching `down` latch -1, everything else holds the prior output.
/// The first output is back-patched from the second.
pub fn directional_threshold(buf: &mut SampleBuffer, up: i32, down: i32) {
    let samples = buf.as_mut_slice();
    if samples.len() < 2 {
        return;
    }
    let mut prev_in = samples[0];
    let mut prev_out = 0;
    samples[0] = 0;
    for i in 1..samples.len() {
        let cur = samples[i];
        let out = if cur >= up && cur > prev_in {
            1
        } else if cur <= down && cur < prev_in {
            -1
        } else {
            prev_out
        };
        samples[i] = out;
        prev_out = out;
        prev_in = cur;
    }
    samples[0] = samples[1];
}

/// Replace each sample with the running count of samples per full period,
/// latched at every positive-going sign change.
///
/// Only meaningful on a zero-mean trace; run [`hpf`] first.
pub fn zero_crossings(buf: &mut SampleBuffer) {
    let samples = buf.as_mut_slice();
    let mut sign = 1;
    let mut count = 0;
    let mut last_period = 0;
    let mut primed = false;
    for s in samples.iter_mut() {
        count += 1;
        if *s * sign < 0 {
            sign = -sign;
            if sign > 0 {
                // the leading partial period is measurement noise
                if primed {
                    last_period = count;
                }
                primed = true;
                count = 0;
            }
        }
        *s = last_period;
    }
}

/// Rail the output high on jumps of at least `threshold` up, low on jumps of
/// at least `threshold` down, holding in between.
pub fn edge_detect(buf: &mut SampleBuffer, threshold: i32) {
    let src: Vec<i32> = buf.as_slice().to_vec();
    let samples = buf.as_mut_slice();
    let mut last = 0;
    for i in 1..src.len() {
        let step = src[i] - src[i - 1];
        if step >= threshold {
            last = SAMPLE_MAX;
        } else if step <= -threshold {
            last = SAMPLE_MIN;
        }
        samples[i - 1] = last;
    }
}

/// One-register low-pass IIR; `k` selects the shift factor (falls back to 4
/// when out of range).
pub fn iir_lowpass(buf: &mut SampleBuffer, k: u8) {
    const DEFAULT_SHIFT: u32 = 4;
    let shift = if k <= 8 { k as u32 } else { DEFAULT_SHIFT };
    let mut reg: i64 = 0;
    for s in buf.as_mut_slice() {
        reg = reg - (reg >> shift) + *s as i64;
        *s = clamp_sample(reg >> shift);
    }
}

/// Matched-filter template for one bit period of an FSK tone.
///
/// `fc` is the number of samples per full carrier cycle. The left/right
/// padding is asymmetric on purpose: `clk % fc` leftover samples are split
/// with the odd one leading, which keeps long traces aligned at the edges.
pub(crate) fn build_tone(clk: usize, fc: usize) -> Vec<i32> {
    let leftover = clk % fc;
    let left_pad = leftover % 2 + leftover / 2;
    let right_pad = leftover / 2;
    let left_half = fc % 2 + fc / 2;
    let cycles = clk / fc;

    let mut tone = vec![0i32; clk];
    for v in tone.iter_mut().take(left_pad) {
        *v = 1;
    }
    for cycle in 0..cycles {
        for j in 0..fc {
            tone[left_pad + cycle * fc + j] = if j < left_half { 1 } else { -1 };
        }
    }
    for k in 0..right_pad {
        tone[left_pad + cycles * fc + k] = -1;
    }
    tone
}

/// Project an FSK wave onto an NRZ-style wave whose sign encodes the
/// dominant tone: positive when the short (higher) tone wins, negative for
/// the long (lower) tone.
///
/// `fc_high` is the longer field clock (lower tone), `fc_low` the shorter
/// one. Zero parameters are filled in by FSK clock detection; detection
/// failure is a soft error. The trace shortens by `clk + fc_high` samples.
pub fn fsk_to_nrz(
    buf: &mut SampleBuffer,
    noise_floor: i32,
    clk: usize,
    fc_high: usize,
    fc_low: usize,
) -> Result<(usize, usize, usize)> {
    let (clk, fc_high, fc_low) = if clk == 0 || fc_high == 0 || fc_low == 0 {
        let props = buf.properties(noise_floor);
        let found = clock::fsk_clocks(buf.as_slice(), &props)?;
        (found.clock, found.fc_high as usize, found.fc_low as usize)
    } else {
        (clk, fc_high, fc_low)
    };
    // only field clocks in the 4..=10 range are known FSK modulations;
    // anything else would shred ASK/PSK waves
    if clk == 0 || fc_high == 0 || fc_low == 0 || fc_high > 10 || fc_low < 4 {
        return Err(ClockError::NoFieldClocks.into());
    }

    let samples = buf.as_slice();
    if samples.len() <= clk + fc_high {
        return Err(ClockError::NoFieldClocks.into());
    }

    let long_tone = build_tone(clk, fc_high);
    let short_tone = build_tone(clk, fc_low);

    // first pass: per-offset matched-filter responses, packed (short << 16) | long
    let mut packed = vec![0u32; samples.len() - clk];
    for i in 0..samples.len() - clk {
        let mut long_sum: i64 = 0;
        let mut short_sum: i64 = 0;
        for j in 0..clk {
            long_sum += (long_tone[j] * samples[i + j]) as i64;
            short_sum += (short_tone[j] * samples[i + j]) as i64;
        }
        let long_resp = (100 * long_sum / clk as i64).unsigned_abs() as u32;
        let short_resp = (100 * short_sum / clk as i64).unsigned_abs() as u32;
        packed[i] = (short_resp.min(0xffff) << 16) | long_resp.min(0xffff);
    }

    // second pass: field-clock-wide totals; the short-tone total minus the
    // long-tone total becomes the wave
    let out_len = samples.len() - clk - fc_high;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let mut long_tot: i64 = 0;
        let mut short_tot: i64 = 0;
        for j in 0..fc_high {
            long_tot += (packed[i + j] & 0xffff) as i64;
        }
        for j in 0..fc_low {
            short_tot += (packed[i + j] >> 16) as i64;
        }
        out.push(clamp_sample((short_tot - long_tot) / 100));
    }
    buf.replace(out);
    Ok((clk, fc_high, fc_low))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(samples: Vec<i32>) -> SampleBuffer {
        let mut buf = SampleBuffer::new(40_000);
        buf.load(samples);
        buf
    }

    #[test]
    fn hpf_centers_trace() {
        let mut buf = buffer_with((0..1000).map(|i| 50 + if i % 2 == 0 { 20 } else { -20 }).collect());
        hpf(&mut buf);
        let sum: i64 = buf.as_slice().iter().map(|&s| s as i64).sum();
        let mean = sum / buf.len() as i64;
        assert!(mean.abs() <= 1);
    }

    #[test]
    fn normalize_spans_256() {
        let mut buf = buffer_with((0..1000).map(|i| if (i / 8) % 2 == 0 { 30 } else { -10 }).collect());
        normalize(&mut buf);
        let slice = &buf.as_slice()[10..];
        let max = slice.iter().max().copied().unwrap();
        let min = slice.iter().min().copied().unwrap();
        assert!(max - min <= 256);
        assert!((max + min).abs() <= 8, "midpoint {} off zero", max + min);
    }

    #[test]
    fn normalize_leaves_flat_trace() {
        let mut buf = buffer_with(vec![42; 100]);
        normalize(&mut buf);
        assert!(buf.as_slice().iter().all(|&s| s == 42));
    }

    #[test]
    fn decimate_then_interpolate_restores_length() {
        let n = 4;
        let mut buf = buffer_with((0..4000).map(|i| ((i % 64) as i32) - 32).collect());
        let original = buf.len();
        decimate(&mut buf, n).unwrap();
        assert_eq!(buf.len(), original / n);
        interpolate(&mut buf, n).unwrap();
        assert!(original.abs_diff(buf.len()) <= n);
    }

    #[test]
    fn shift_saturates() {
        let mut buf = buffer_with(vec![120, -120, 0]);
        shift(&mut buf, 20);
        assert_eq!(buf.as_slice(), &[127, -100, 20]);
    }

    #[test]
    fn directional_threshold_is_ternary() {
        let mut buf = buffer_with((0..500).map(|i| (((i * 7) % 255) as i32) - 127).collect());
        directional_threshold(&mut buf, 30, -30);
        assert!(buf.as_slice().iter().all(|&s| s == -1 || s == 0 || s == 1));
        assert_eq!(buf.get(0), buf.get(1));
    }

    #[test]
    fn zero_crossings_reports_period() {
        // 100-sample square wave, zero mean
        let mut buf = buffer_with((0..2000).map(|i| if (i / 50) % 2 == 0 { 100 } else { -100 }).collect());
        zero_crossings(&mut buf);
        for &v in buf.as_slice().iter().filter(|&&v| v != 0) {
            assert!((99..=101).contains(&v), "period {} out of range", v);
        }
    }

    #[test]
    fn edge_detect_rails() {
        let mut buf = buffer_with(vec![0, 0, 100, 100, 100, 0, 0, 0]);
        edge_detect(&mut buf, 25);
        assert_eq!(&buf.as_slice()[1..5], &[127, 127, 127, -127]);
    }

    #[test]
    fn iir_smooths_step() {
        let mut step = vec![0; 50];
        step.extend(vec![100; 200]);
        let mut buf = buffer_with(step);
        iir_lowpass(&mut buf, 4);
        // settles towards the step level without overshoot
        let tail = &buf.as_slice()[200..];
        assert!(tail.iter().all(|&s| (90..=100).contains(&s)));
    }

    #[test]
    fn tone_template_sums_near_zero() {
        for (clk, fc) in [(50usize, 8usize), (50, 10), (64, 8), (32, 5)] {
            let tone = build_tone(clk, fc);
            assert_eq!(tone.len(), clk);
            let sum: i32 = tone.iter().sum();
            // odd field clocks leave one extra high sample per cycle
            let bound = (clk / fc + clk % fc) as i32;
            assert!(sum.abs() <= bound, "clk {} fc {} sum {}", clk, fc, sum);
        }
    }

    /// Pure carrier tone with `fc` samples per full cycle.
    fn tone_wave(len: usize, fc: usize) -> Vec<i32> {
        (0..len)
            .map(|i| if (i / (fc / 2)) % 2 == 0 { 127 } else { -127 })
            .collect()
    }

    #[test]
    fn fsk_to_nrz_sign_tracks_dominant_tone() {
        // a wave riding the short tone projects positive
        let mut buf = buffer_with(tone_wave(1200, 8));
        fsk_to_nrz(&mut buf, 8, 50, 10, 8).unwrap();
        let positive = buf.as_slice().iter().filter(|&&s| s > 0).count();
        let negative = buf.as_slice().iter().filter(|&&s| s < 0).count();
        assert!(
            positive > negative * 3,
            "short tone: {positive} positive vs {negative} negative"
        );
        let total: i64 = buf.as_slice().iter().map(|&s| s as i64).sum();
        assert!(total > 0, "short tone summed to {total}");

        // and the long tone projects negative
        let mut buf = buffer_with(tone_wave(1200, 10));
        fsk_to_nrz(&mut buf, 8, 50, 10, 8).unwrap();
        let positive = buf.as_slice().iter().filter(|&&s| s > 0).count();
        let negative = buf.as_slice().iter().filter(|&&s| s < 0).count();
        assert!(
            negative > positive * 3,
            "long tone: {positive} positive vs {negative} negative"
        );
        let total: i64 = buf.as_slice().iter().map(|&s| s as i64).sum();
        assert!(total < 0, "long tone summed to {total}");
    }

    #[test]
    fn fsk_to_nrz_shortens_by_clock_and_long_field() {
        let mut buf = buffer_with(tone_wave(1000, 8));
        let (clk, fc_high, fc_low) = fsk_to_nrz(&mut buf, 8, 50, 10, 8).unwrap();
        assert_eq!((clk, fc_high, fc_low), (50, 10, 8));
        assert_eq!(buf.len(), 1000 - 50 - 10);
    }

    #[test]
    fn fsk_to_nrz_without_clocks_is_soft_error() {
        let mut buf = buffer_with(vec![0; 2000]);
        assert!(fsk_to_nrz(&mut buf, 8, 0, 0, 0).is_err());
    }

    #[test]
    fn tone_template_matches_hand_layout() {
        // clk 50, fc 10: no leftover, five clean cycles of 5 high / 5 low
        let tone = build_tone(50, 10);
        for cycle in 0..5 {
            for j in 0..10 {
                assert_eq!(tone[cycle * 10 + j], if j < 5 { 1 } else { -1 });
            }
        }
        // clk 50, fc 8: two leftover samples, one leading high and one trailing low
        let tone = build_tone(50, 8);
        assert_eq!(tone[0], 1);
        assert_eq!(tone[49], -1);
    }
}
