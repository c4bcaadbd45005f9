//! FSK demodulation: classify carrier cycles by their zero-crossing spacing,
//! then aggregate same-tone runs into bits with half-clock rounding.

use crate::buffer::SignalProperties;
use crate::clock;
use crate::errors::{DemodError, Result};
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct FskOptions {
    /// Bit clock; 0 autodetects (default RF/50).
    pub clock: usize,
    pub invert: bool,
    /// Longer field clock; 0 autodetects (default FC/10).
    pub fc_high: u8,
    /// Shorter field clock; 0 autodetects (default FC/8).
    pub fc_low: u8,
}

impl Default for FskOptions {
    fn default() -> Self {
        Self {
            clock: 0,
            invert: false,
            fc_high: 0,
            fc_low: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FskReport {
    pub variant: &'static str,
    pub clock: usize,
    pub fc_high: u8,
    pub fc_low: u8,
    pub bits: usize,
    pub start_idx: i64,
}

/// Conventional name of the `(fc_high, fc_low, invert)` combination.
pub fn variant_name(fc_high: u8, fc_low: u8, invert: bool) -> &'static str {
    match (fc_high, fc_low, invert) {
        (10, 8, false) => "FSK2",
        (10, 8, true) => "FSK2a",
        (8, 5, false) => "FSK1a",
        (8, 5, true) => "FSK1",
        _ => "FSK??",
    }
}

/// Skip leading carrier-only samples until tone-sized waves appear.
fn find_mod_start(samples: &[i32], mean: i32, expected_wave: usize) -> usize {
    let len = samples.len();
    if len < 21 {
        return 0;
    }
    let mut above = samples[0] >= mean;
    let mut wave_cnt = 0usize;
    let mut crossings = 0usize;
    let mut i = 1;
    while i < len - 20 {
        let s = samples[i];
        if s < mean && above {
            crossings += 1;
            if crossings > 2 && wave_cnt < expected_wave + 1 {
                break;
            }
            above = false;
            wave_cnt = 0;
        } else if s >= mean && !above {
            crossings += 1;
            if crossings > 2 && wave_cnt < expected_wave + 1 {
                break;
            }
            above = true;
            wave_cnt = 0;
        } else {
            wave_cnt += 1;
        }
        if crossings > 10 {
            break;
        }
        i += 1;
    }
    i
}

/// Classify each full carrier cycle: 1 for the short (higher) tone, 0 for
/// the long (lower) tone. Returns the tone-per-cycle stream and the sample
/// index of the first classified cycle.
fn classify_cycles(
    samples: &[i32],
    mean: i32,
    fc_high: usize,
    fc_low: usize,
) -> (Vec<u8>, usize) {
    let len = samples.len();
    if len < 1024 {
        return (Vec::new(), 0);
    }
    let scan_start = find_mod_start(samples, mean, fc_high);
    let mut tones: Vec<u8> = Vec::new();
    let mut start_idx = 0usize;
    let mut last_transition = scan_start;
    let mut prev_above = samples[scan_start] >= mean;
    let mut pre_last = 0usize;
    let mut last_len = 0usize;
    for i in (scan_start + 1)..len.saturating_sub(20) {
        let above = samples[i] >= mean;
        if above && !prev_above {
            // rising crossing closes a cycle
            let cur = i - last_transition;
            if cur + 2 < fc_low {
                // sub-tone glitch, ignore
            } else if cur < fc_high - 1 {
                // short-tone cycle; a long measurement sandwiched between
                // short ones was a boundary artefact
                if tones.len() > 1 && last_len > fc_high - 2 && pre_last < fc_high - 1 {
                    let fixup = tones.len() - 1;
                    tones[fixup] = 1;
                }
                tones.push(1);
                if start_idx == 0 {
                    start_idx = i - fc_low;
                }
            } else if cur > fc_high + 1 && tones.len() < 3 {
                // leading garbage, start over
                tones.clear();
            } else if cur == fc_low + 1 && last_len + 1 == fc_low {
                tones.push(1);
                if start_idx == 0 {
                    start_idx = i - fc_low;
                }
            } else {
                tones.push(0);
                if start_idx == 0 {
                    start_idx = i - fc_high;
                }
            }
            pre_last = last_len;
            last_len = cur;
            last_transition = i;
        }
        prev_above = above;
    }
    (tones, start_idx)
}

/// Collapse same-tone cycle runs into bits, rounding each run to the
/// nearest whole number of clocks.
fn aggregate_bits(
    tones: &[u8],
    clock: usize,
    invert: bool,
    fc_high: usize,
    fc_low: usize,
    start_idx: &mut i64,
) -> Vec<u8> {
    let mut out = Vec::new();
    if tones.is_empty() || clock == 0 {
        return out;
    }
    let half = clock / 2;
    let inv = invert as u8;
    let to_bits = |run: usize, tone: u8| -> usize {
        let fc = if tone == 1 { fc_low } else { fc_high };
        ((run * fc + half) / clock).max(1)
    };

    let mut run_start = 0usize;
    let mut first_run = true;
    for i in 1..=tones.len() {
        let run_ended = i == tones.len() || tones[i] != tones[run_start];
        if !run_ended {
            continue;
        }
        let run = i - run_start;
        let tone = tones[run_start];
        if i == tones.len() && run <= clock / fc_high {
            // trailing partial run, too short to trust
            break;
        }
        let n = to_bits(run, tone);
        if first_run {
            // pull the start back onto the bit grid
            let fc = if tone == 1 { fc_low } else { fc_high };
            *start_idx += (fc * i) as i64 - (n * clock) as i64;
            first_run = false;
        }
        out.extend(std::iter::repeat(tone ^ inv).take(n));
        run_start = i;
    }
    out
}

/// Demodulate an FSK wave into bits.
pub fn fsk_demod(
    samples: &[i32],
    props: &SignalProperties,
    clock: usize,
    invert: bool,
    fc_high: u8,
    fc_low: u8,
) -> (Vec<u8>, i64) {
    let (tones, start) = classify_cycles(samples, props.mean, fc_high as usize, fc_low as usize);
    let mut start_idx = start as i64;
    let bits = aggregate_bits(
        &tones,
        clock,
        invert,
        fc_high as usize,
        fc_low as usize,
        &mut start_idx,
    );
    (bits, start_idx)
}

/// FSK entry point: recover field clocks and bit clock (with the classic
/// FC 10/8 at RF/50 defaults), demodulate and install.
pub fn run_fsk(session: &mut Session, opts: &FskOptions) -> Result<FskReport> {
    let props = session.properties();
    if props.is_noise {
        return Err(DemodError::Noise.into());
    }
    let samples: Vec<i32> = session.graph.as_slice().to_vec();
    if samples.is_empty() {
        return Err(DemodError::TooFewSamples {
            needed: 1024,
            have: 0,
        }
        .into());
    }

    let (fc_high, fc_low) = if opts.fc_high == 0 || opts.fc_low == 0 {
        clock::count_field_clocks(&samples, &props).unwrap_or((10, 8))
    } else {
        (opts.fc_high, opts.fc_low)
    };
    let clock = if opts.clock == 0 {
        clock::detect_fsk_bit_clock(&samples, &props, fc_high, fc_low)
            .map(|(clk, _)| clk)
            .unwrap_or(50)
    } else {
        opts.clock
    };

    let (bits, start_idx) = fsk_demod(&samples, &props, clock, opts.invert, fc_high, fc_low);
    if bits.is_empty() {
        return Err(DemodError::NoData { bits: 0 }.into());
    }
    session.install_demod(&bits, clock, start_idx);
    session.log.debug(
        "FSK",
        format!("clock {clock}, fc {fc_high}/{fc_low}, {} bits", bits.len()),
    );
    Ok(FskReport {
        variant: variant_name(fc_high, fc_low, opts.invert),
        clock,
        fc_high,
        fc_low,
        bits: session.demod.len(),
        start_idx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Phase-continuous FSK wave: bit 1 rides the short tone, bit 0 the
    /// long tone.
    pub(crate) fn fsk_wave(bits: &[u8], clock: usize, fc_high: usize, fc_low: usize) -> Vec<i32> {
        let mut wave = Vec::with_capacity(bits.len() * clock);
        let mut level = 127i32;
        let mut run = 0usize;
        for &b in bits {
            let half = if b == 1 { fc_low / 2 } else { fc_high / 2 };
            for _ in 0..clock {
                if run >= half {
                    level = -level;
                    run = 0;
                }
                wave.push(level);
                run += 1;
            }
        }
        wave
    }

    #[test]
    fn variant_names_match_field_clocks() {
        assert_eq!(variant_name(10, 8, false), "FSK2");
        assert_eq!(variant_name(10, 8, true), "FSK2a");
        assert_eq!(variant_name(8, 5, false), "FSK1a");
        assert_eq!(variant_name(8, 5, true), "FSK1");
        assert_eq!(variant_name(9, 6, false), "FSK??");
    }

    #[test]
    fn aggregate_rounds_runs_to_bits() {
        // six short cycles followed by ten long cycles at RF/50 FC 10/8
        let mut tones = vec![1u8; 6];
        tones.extend(vec![0u8; 10]);
        tones.extend(vec![1u8; 7]);
        let mut start = 0i64;
        let bits = aggregate_bits(&tones, 50, false, 10, 8, &mut start);
        assert_eq!(bits, vec![1, 0, 0, 1]);
    }

    #[test]
    fn aggregate_invert_flips() {
        let mut tones = vec![1u8; 6];
        tones.extend(vec![0u8; 10]);
        tones.extend(vec![1u8; 7]);
        let mut start = 0i64;
        let bits = aggregate_bits(&tones, 50, true, 10, 8, &mut start);
        assert_eq!(bits, vec![0, 1, 1, 0]);
    }

    #[test]
    fn fsk2_wave_round_trips() {
        let data: Vec<u8> = [1u8, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 1]
            .iter()
            .cycle()
            .take(64)
            .copied()
            .collect();
        let wave = fsk_wave(&data, 50, 10, 8);
        let props = SignalProperties::compute(&wave, 8);
        let (bits, _) = fsk_demod(&wave, &props, 50, false, 10, 8);
        assert!(bits.len() >= 32, "only {} bits", bits.len());
        // an interior stretch must appear in the (periodic) source pattern;
        // edge bits may be lost to run-boundary rounding
        let haystack: Vec<u8> = data.iter().cycle().take(data.len() * 3).copied().collect();
        let probe: Vec<u8> = bits.iter().skip(2).take(32).copied().collect();
        assert_eq!(probe.len(), 32);
        assert!(
            haystack.windows(probe.len()).any(|w| w == &probe[..]),
            "demodulated stream does not appear in the source pattern"
        );
    }
}
