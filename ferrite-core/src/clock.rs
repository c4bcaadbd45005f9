//! Bit-clock, field-clock and carrier recovery.
//!
//! All estimators work on the conditioned trace (DC removed, normalized) and
//! snap their measurements onto the candidate grid of known RF divisors.

use std::collections::BTreeMap;

use crate::buffer::SignalProperties;
use crate::errors::{ArgError, ClockError, DemodError, Result, TraceError};

/// RF divisors the estimators consider.
pub const CLOCK_CANDIDATES: [usize; 8] = [8, 16, 32, 40, 50, 64, 100, 128];

/// Snap a measured period onto the candidate grid.
pub fn closest_clock(measured: usize) -> Option<usize> {
    const TOLERANCE: [usize; 8] = [1, 2, 4, 4, 5, 8, 8, 8];
    CLOCK_CANDIDATES
        .iter()
        .zip(TOLERANCE.iter())
        .find(|(&c, &t)| measured + t >= c && measured <= c + t)
        .map(|(&c, _)| c)
}

/// A recovered bit clock and the sample index it locked onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockEstimate {
    pub clock: usize,
    pub start: usize,
}

/// Recovered FSK timing: the field-clock pair, the bit clock and the first
/// tone-change edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FskClocks {
    pub fc_high: u8,
    pub fc_low: u8,
    pub clock: usize,
    pub first_edge: usize,
}

/// PSK timing: bit clock, first phase shift and carrier cycle length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PskClockEstimate {
    pub clock: usize,
    pub start: usize,
    pub carrier: usize,
}

/// Estimate the ASK bit clock.
///
/// Strong clipped waves are measured directly from the shortest full wave;
/// otherwise every candidate clock is scored by how well trace peaks line up
/// on its multiples, preferring the smaller period on ties.
pub fn detect_ask_clock(
    samples: &[i32],
    props: &SignalProperties,
    hint: usize,
) -> Result<ClockEstimate> {
    if props.is_noise {
        return Err(DemodError::Noise.into());
    }
    let (hi, lo) = props.hi_lo(75, 75).ok_or(ClockError::NotFound)?;
    let hinted = CLOCK_CANDIDATES.contains(&hint);

    if !hinted && is_clean_wave(samples, hi, lo) {
        if let Some(est) = strong_ask_clock(samples, hi, lo) {
            return Ok(est);
        }
    }

    let candidates: &[usize] = if hinted {
        std::slice::from_ref(&hint)
    } else {
        &CLOCK_CANDIDATES
    };
    let len = samples.len();
    let scan = len.min(255);
    let is_peak = |i: usize| samples[i] >= hi || samples[i] <= lo;

    let mut best: Option<(usize, usize, usize)> = None; // (clock, errors, start)
    for &clock in candidates {
        let tol = if clock <= 32 { 1 } else { 0 };
        if len < clock * 2 + tol {
            continue;
        }
        let mut cand_best: Option<(usize, usize)> = None; // (errors, start)
        for start in 0..scan {
            if !is_peak(start) {
                continue;
            }
            let checks = (len - start - tol) / clock;
            if checks < 2 {
                break;
            }
            let mut errors = 0usize;
            for k in 1..checks {
                let pos = start + k * clock;
                let hit = is_peak(pos)
                    || (tol > 0 && (is_peak(pos - tol) || (pos + tol < len && is_peak(pos + tol))));
                if !hit {
                    errors += 1;
                }
            }
            if errors == 0 && clock < 128 {
                return Ok(ClockEstimate { clock, start });
            }
            if cand_best.map_or(true, |(e, _)| errors < e) {
                cand_best = Some((errors, start));
            }
        }
        if let Some((errors, start)) = cand_best {
            let better = match best {
                None => true,
                Some((best_clock, best_errors, _)) => {
                    (len / clock) / errors.max(1) > (len / best_clock) / best_errors.max(1)
                }
            };
            if better {
                best = Some((clock, errors, start));
            }
        }
    }
    best.map(|(clock, _, start)| ClockEstimate { clock, start })
        .ok_or_else(|| ClockError::NotFound.into())
}

/// A trace counts as cleanly clipped when the mid-trace window is all peaks
/// (or nearly so).
fn is_clean_wave(samples: &[i32], hi: i32, lo: i32) -> bool {
    let len = samples.len();
    if len < 300 {
        return false;
    }
    let start = if len > 672 { 160 } else { 0 };
    let end = len.min(start + 512);
    let mut peaks = 0usize;
    let mut all = true;
    for &s in &samples[start..end] {
        if s > lo && s < hi {
            all = false;
        } else {
            peaks += 1;
        }
    }
    all || peaks > 300
}

/// Shortest low-to-low full wave of a clean clipped trace, snapped onto the
/// candidate grid.
fn strong_ask_clock(samples: &[i32], hi: i32, lo: i32) -> Option<ClockEstimate> {
    let len = samples.len();
    let mut i = len.min(100);
    // prime past the current high run and its trailing low edge
    while i < len && samples[i] < hi {
        i += 1;
    }
    while i < len && samples[i] > lo {
        i += 1;
    }
    let mut min_wave = usize::MAX;
    let mut min_idx = 0usize;
    while i < len {
        let start = i;
        while i < len && samples[i] < hi {
            i += 1; // low half
        }
        while i < len && samples[i] > lo {
            i += 1; // high half
        }
        if i >= len {
            break;
        }
        let wave = i - start;
        if wave < min_wave {
            min_wave = wave;
            min_idx = start;
        }
    }
    let clock = closest_clock(min_wave)?;
    Some(ClockEstimate {
        clock,
        start: min_idx,
    })
}

/// Estimate the NRZ bit clock from the sign-run lengths of the hard-sliced
/// trace.
pub fn detect_nrz_clock(
    samples: &[i32],
    props: &SignalProperties,
    hint: usize,
) -> Result<ClockEstimate> {
    if CLOCK_CANDIDATES.contains(&hint) {
        return Ok(ClockEstimate {
            clock: hint,
            start: 0,
        });
    }
    if props.is_noise {
        return Err(DemodError::Noise.into());
    }
    let (hi, lo) = props.hi_lo(90, 90).ok_or(ClockError::NotFound)?;
    let mut runs: Vec<usize> = Vec::new();
    let mut first_edge = 0usize;
    let mut state: Option<bool> = None;
    let mut run_start = 0usize;
    for (i, &s) in samples.iter().enumerate() {
        let class = if s >= hi {
            Some(true)
        } else if s <= lo {
            Some(false)
        } else {
            None
        };
        let Some(c) = class else { continue };
        match state {
            None => {
                state = Some(c);
                run_start = i;
            }
            Some(st) if st != c => {
                if runs.is_empty() {
                    first_edge = i;
                }
                runs.push(i - run_start);
                state = Some(c);
                run_start = i;
            }
            _ => {}
        }
    }
    // the leading run starts at an arbitrary phase, ignore it when we can
    let usable = if runs.len() > 1 { &runs[1..] } else { &runs[..] };
    let clock = snap_min_run(usable).ok_or(ClockError::NotFound)?;
    Ok(ClockEstimate {
        clock,
        start: first_edge,
    })
}

/// Smallest frequent run length, snapped onto the candidate grid.
fn snap_min_run(runs: &[usize]) -> Option<usize> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &r in runs {
        if r >= 8 {
            *counts.entry(r).or_insert(0) += 1;
        }
    }
    let repeated = counts
        .iter()
        .filter(|(_, &c)| c >= 2)
        .map(|(&r, _)| r)
        .min();
    let any = counts.keys().copied().min();
    closest_clock(repeated.or(any)?)
}

/// Indices of rising samples that reach the trace peak. The first cycle
/// boundary of every carrier period qualifies; plateaus do not.
fn up_peaks(samples: &[i32], high: i32) -> Vec<usize> {
    let len = samples.len();
    if len < 40 {
        return Vec::new();
    }
    let from = if len > 360 { 160 } else { 1 };
    let mut peaks = Vec::new();
    for i in from..len.saturating_sub(20) {
        if samples[i] > samples[i - 1] && samples[i] >= high {
            peaks.push(i);
        }
    }
    peaks
}

fn cycle_lengths(peaks: &[usize]) -> Vec<usize> {
    peaks.windows(2).map(|w| w[1] - w[0]).collect()
}

fn top_two_lengths(cycles: &[usize]) -> Option<(usize, usize)> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &c in cycles {
        *counts.entry(c).or_insert(0) += 1;
    }
    let mut ranked: Vec<(usize, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    match ranked.as_slice() {
        [] => None,
        [_] => None,
        [(a, _), (b, _), ..] => Some((*a, *b)),
    }
}

/// Estimate the dominant FSK field-clock pair `(fc_high, fc_low)`.
///
/// Off-by-one cycle measurements at tone changes are folded back onto the
/// canonical field clocks before ranking. Only the known pairs FC 10/8 and
/// FC 8/5 are accepted.
pub fn count_field_clocks(samples: &[i32], props: &SignalProperties) -> Option<(u8, u8)> {
    let mut cycles = cycle_lengths(&up_peaks(samples, props.max));
    let mut last = 0usize;
    for c in cycles.iter_mut() {
        let mut v = *c;
        if last == 5 && v == 9 {
            v = 8;
        }
        if v == 9 || v == 4 {
            v += 1;
        }
        last = v;
        *c = v;
    }
    let (a, b) = top_two_lengths(&cycles)?;
    let (fc_high, fc_low) = if a >= b { (a, b) } else { (b, a) };
    if (fc_high == 10 && fc_low == 8) || (fc_high == 8 && fc_low == 5) {
        Some((fc_high as u8, fc_low as u8))
    } else {
        None
    }
}

/// Estimate the PSK carrier cycle length (samples per half-cycle pair).
///
/// Phase shifts elongate single cycles, so the carrier is the smaller of the
/// two most common cycle lengths.
pub fn detect_carrier(samples: &[i32], props: &SignalProperties) -> Option<usize> {
    let cycles = cycle_lengths(&up_peaks(samples, props.max));
    if let Some((a, b)) = top_two_lengths(&cycles) {
        return Some(a.min(b));
    }
    // uniform carrier with no phase shifts
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &c in &cycles {
        *counts.entry(c).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by_key(|&(_, count)| count)
        .map(|(len, _)| len)
}

/// Estimate the FSK bit clock by measuring how many samples each
/// same-tone stretch spans.
pub fn detect_fsk_bit_clock(
    samples: &[i32],
    props: &SignalProperties,
    fc_high: u8,
    fc_low: u8,
) -> Option<(usize, usize)> {
    let fc_high = fc_high as usize;
    let fc_low = fc_low as usize;
    if fc_high <= fc_low {
        return None;
    }
    let fc_tol = (fc_high * 100 - fc_low * 100 + 100) / 200;
    let peaks = up_peaks(samples, props.max);
    if peaks.len() < 4 {
        return None;
    }

    let mut buckets: Vec<(usize, usize)> = Vec::new(); // (run length, count)
    let mut last_fc = 0usize;
    let mut changes = 0usize;
    let mut first_edge = 0usize;
    let mut last_change_pos = peaks[0];
    for w in peaks.windows(2) {
        let cycle = w[1] - w[0];
        let class = if cycle < fc_low + fc_tol { fc_low } else { fc_high };
        if class != last_fc {
            let run = w[1] - last_change_pos;
            if changes >= 2 {
                match buckets
                    .iter_mut()
                    .find(|(l, _)| run + 4 >= *l && run <= *l + 4)
                {
                    Some((_, count)) => *count += 1,
                    None => buckets.push((run, 1)),
                }
            } else {
                first_edge = w[1];
                changes += 1;
            }
            last_change_pos = w[1];
            last_fc = class;
        }
    }
    if buckets.is_empty() {
        return None;
    }
    buckets.sort_by(|a, b| b.1.cmp(&a.1));
    let top: Vec<usize> = buckets.iter().take(3).map(|&(l, _)| l).collect();

    // a run that was measured one field clock short or long still has to land
    // on a clock multiple
    let tol1 = fc_high + 1;
    for &cand in CLOCK_CANDIDATES.iter().rev() {
        if cand < 32 {
            break;
        }
        let fits = top.iter().all(|&l| {
            let rem = l % cand;
            rem < tol1 || rem > cand - tol1
        });
        if fits {
            return Some((cand, first_edge));
        }
    }
    None
}

/// Recover the full FSK timing of the current trace.
pub fn fsk_clocks(samples: &[i32], props: &SignalProperties) -> Result<FskClocks> {
    if props.is_noise {
        return Err(DemodError::Noise.into());
    }
    let (fc_high, fc_low) =
        count_field_clocks(samples, props).ok_or(ClockError::NoFieldClocks)?;
    let (clock, first_edge) = detect_fsk_bit_clock(samples, props, fc_high, fc_low)
        .ok_or(ClockError::NotFound)?;
    Ok(FskClocks {
        fc_high,
        fc_low,
        clock,
        first_edge,
    })
}

/// Estimate the PSK bit clock.
///
/// The wave is reduced to an NRZ-style phase trace first (phase flips show as
/// elongated carrier cycles), then the NRZ run-length estimator runs on the
/// distances between flips.
pub fn detect_psk_clock(
    samples: &[i32],
    props: &SignalProperties,
    hint: usize,
) -> Result<PskClockEstimate> {
    if props.is_noise {
        return Err(DemodError::Noise.into());
    }
    let carrier = detect_carrier(samples, props).ok_or(ClockError::NoCarrier)?;
    if !matches!(carrier, 2 | 4 | 8) {
        return Err(ClockError::NoCarrier.into());
    }
    let peaks = up_peaks(samples, props.max);
    let mut flips: Vec<usize> = Vec::new();
    for w in peaks.windows(2) {
        if w[1] - w[0] > carrier {
            flips.push(w[1]);
        }
    }
    let start = flips.first().copied().unwrap_or(0);
    let clock = if CLOCK_CANDIDATES.contains(&hint) {
        hint
    } else {
        let runs: Vec<usize> = flips.windows(2).map(|w| w[1] - w[0]).collect();
        snap_min_run(&runs).ok_or(ClockError::NotFound)?
    };
    Ok(PskClockEstimate {
        clock,
        start,
        carrier,
    })
}

/// Result of a windowed autocorrelation pass.
#[derive(Debug, Clone)]
pub struct AutoCorrelation {
    /// Distance between the two dominant peaks, when they agree within 4%.
    pub distance: Option<usize>,
    /// Last repeat distance tracked while scanning, a fallback estimate.
    pub tracked: usize,
    /// Lag of the dominant peak.
    pub peak: usize,
    /// Lag of the second peak inside the window.
    pub second_peak: usize,
    /// The correlation trace, one value per lag.
    pub trace: Vec<i32>,
}

/// Unbiased autocorrelation for lags `0 .. len - window`.
///
/// The accumulator is reset for every lag.
pub fn autocorrelate(samples: &[i32], window: usize) -> Result<AutoCorrelation> {
    let len = samples.len();
    if len == 0 {
        return Err(TraceError::Empty.into());
    }
    if window >= len {
        return Err(ArgError::WindowTooLarge { window, len }.into());
    }
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / len as f64;
    let variance = samples
        .iter()
        .map(|&s| {
            let d = s as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / len as f64;
    if variance <= f64::EPSILON {
        return Err(ClockError::NotFound.into());
    }

    let centered: Vec<f64> = samples.iter().map(|&s| s as f64 - mean).collect();
    let lags = len - window;
    let mut trace = Vec::with_capacity(lags);
    let mut tracked = 0usize;
    let mut last_max = 0usize;
    for lag in 0..lags {
        let mut acc = 0.0f64;
        for j in 0..len - lag {
            acc += centered[j] * centered[j + lag];
        }
        let autocv = acc / (len - lag) as f64;
        trace.push(autocv as i32);
        if autocv / variance > 1.0 {
            tracked = lag - last_max;
            last_max = lag;
        }
    }

    let mut peak = 0usize;
    let mut peak_val = i32::MIN;
    for (lag, &v) in trace.iter().enumerate() {
        if v > peak_val {
            peak_val = v;
            peak = lag;
        }
    }
    let mut second = 0usize;
    let mut second_val = i32::MIN;
    let upper = window.min(lags.saturating_sub(1));
    for lag in peak + 1..=upper {
        if trace[lag] > second_val {
            second_val = trace[lag];
            second = lag;
        }
    }

    let distance = if second > peak && second_val > i32::MIN {
        let gap = (peak_val - second_val).abs();
        let bar = ((peak_val as i64 + second_val as i64) / 2) as f64 * 0.04;
        if (gap as f64) < bar {
            Some(second - peak)
        } else {
            None
        }
    } else {
        None
    };

    Ok(AutoCorrelation {
        distance,
        tracked,
        peak,
        second_peak: second,
        trace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SignalProperties;

    fn props_of(samples: &[i32]) -> SignalProperties {
        SignalProperties::compute(samples, 8)
    }

    /// Manchester-encode bits at the given clock: `1` -> low then high,
    /// `0` -> high then low.
    fn manchester_wave(bits: &[u8], clock: usize) -> Vec<i32> {
        let half = clock / 2;
        let mut wave = Vec::with_capacity(bits.len() * clock);
        for &b in bits {
            let (first, second) = if b == 1 { (-127, 127) } else { (127, -127) };
            wave.extend(std::iter::repeat(first).take(half));
            wave.extend(std::iter::repeat(second).take(half));
        }
        wave
    }

    #[test]
    fn closest_clock_snaps_within_tolerance() {
        assert_eq!(closest_clock(63), Some(64));
        assert_eq!(closest_clock(72), Some(64));
        assert_eq!(closest_clock(50), Some(50));
        assert_eq!(closest_clock(20), None);
    }

    #[test]
    fn ask_clock_from_clean_manchester() {
        let bits: Vec<u8> = (0..80).map(|i| ((i * 5 + i / 3) % 2) as u8).collect();
        let wave = manchester_wave(&bits, 64);
        let props = props_of(&wave);
        let est = detect_ask_clock(&wave, &props, 0).unwrap();
        assert_eq!(est.clock, 64);
    }

    #[test]
    fn ask_clock_rejects_noise() {
        let wave = vec![0i32; 2000];
        let props = props_of(&wave);
        assert!(detect_ask_clock(&wave, &props, 0).is_err());
    }

    #[test]
    fn nrz_clock_from_run_lengths() {
        // bit pattern with plenty of single-bit runs at RF/32
        let bits = [1u8, 0, 1, 0, 0, 1, 1, 0, 1, 0, 1, 1, 1, 0, 0, 1, 0, 1];
        let mut wave = Vec::new();
        for &b in bits.iter().cycle().take(120) {
            let level = if b == 1 { 127 } else { -127 };
            wave.extend(std::iter::repeat(level).take(32));
        }
        let props = props_of(&wave);
        let est = detect_nrz_clock(&wave, &props, 0).unwrap();
        assert_eq!(est.clock, 32);
    }

    #[test]
    fn nrz_clock_honors_hint() {
        let wave = vec![0i32; 100];
        let props = props_of(&wave);
        let est = detect_nrz_clock(&wave, &props, 64).unwrap();
        assert_eq!(est.clock, 64);
    }

    #[test]
    fn carrier_detected_from_cycles() {
        // square carrier, 4 samples per cycle, with sporadic elongated cycles
        let mut wave = Vec::new();
        for cycle in 0..600 {
            if cycle % 50 == 49 {
                wave.extend_from_slice(&[127, 127, 127, -127, -127, -127]);
            } else {
                wave.extend_from_slice(&[127, 127, -127, -127]);
            }
        }
        let props = props_of(&wave);
        assert_eq!(detect_carrier(&wave, &props), Some(4));
    }

    #[test]
    fn autocorrelation_finds_square_period() {
        let wave: Vec<i32> = (0..2000)
            .map(|i| if (i / 8) % 2 == 0 { 127 } else { -127 })
            .collect();
        let ac = autocorrelate(&wave, 200).unwrap();
        assert_eq!(ac.distance, Some(16));
    }

    #[test]
    fn autocorrelation_rejects_flat_trace() {
        let wave = vec![5i32; 500];
        assert!(autocorrelate(&wave, 100).is_err());
    }

    #[test]
    fn autocorrelation_validates_window() {
        let wave = vec![1i32, -1, 1, -1];
        assert!(autocorrelate(&wave, 10).is_err());
    }
}
