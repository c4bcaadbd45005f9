//! ASK demodulation: amplification, sequence-terminator handling and the
//! two slicers (run-length for clean clipped waves, threshold-crossing for
//! everything else).

use crate::buffer::{SignalProperties, SAMPLE_MAX, SAMPLE_MIN};
use crate::clock;
use crate::demod::{decode, em410x};
use crate::demodbuf::ERROR_BIT;
use crate::errors::{DemodError, Result};
use crate::session::Session;

/// Raw ASK emits one element per half clock; Manchester folds pairs into
/// bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AskVariant {
    Raw,
    #[default]
    Manchester,
}

#[derive(Debug, Clone)]
pub struct AskOptions {
    /// Bit clock; 0 autodetects.
    pub clock: usize,
    pub invert: bool,
    pub max_err: usize,
    /// Truncate the working trace; 0 means no limit.
    pub max_len: usize,
    pub amplify: bool,
    pub variant: AskVariant,
    /// Run the EM410x format search after a successful demod.
    pub em_search: bool,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            clock: 0,
            invert: false,
            max_err: 100,
            max_len: 0,
            amplify: false,
            variant: AskVariant::Manchester,
            em_search: false,
        }
    }
}

/// Detected sequence-terminator region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StRegion {
    pub start: usize,
    pub end: usize,
    pub found_clock: usize,
}

#[derive(Debug, Clone)]
pub struct AskReport {
    pub clock: usize,
    pub start_idx: i64,
    pub bits: usize,
    pub errors: usize,
    pub st: Option<StRegion>,
    pub em: Option<em410x::Em410x>,
}

/// Rail the wave on steep edges, holding in between. Lifts weak but clean
/// ASK waves up to full swing before slicing.
pub fn amplify(samples: &mut [i32]) {
    let mut last = 0;
    let mut prev = samples.first().copied().unwrap_or(0);
    for s in samples.iter_mut().skip(1) {
        let step = *s - prev;
        prev = *s;
        if step >= 30 {
            last = SAMPLE_MAX;
        } else if step <= -20 {
            last = SAMPLE_MIN;
        }
        *s = last;
    }
}

/// Outcome of the core slicer before session installation.
#[derive(Debug, Clone)]
pub struct AskRaw {
    pub bits: Vec<u8>,
    pub clock: usize,
    pub start_idx: i64,
    pub errors: usize,
}

/// The core ASK detector: recover the clock, pick a slicer, emit the bit
/// stream.
pub fn ask_demod(
    samples: &[i32],
    props: &SignalProperties,
    clock_hint: usize,
    invert: bool,
    variant: AskVariant,
) -> Result<AskRaw> {
    let est = clock::detect_ask_clock(samples, props, clock_hint)?;
    let (hi, lo) = props.hi_lo(75, 75).ok_or(DemodError::Noise)?;

    if is_clean_wave(samples, hi, lo) {
        let (halfbits, mut start_idx, mut errors) = clean_slice(samples, est.clock, invert, hi, lo);
        let mut bits = halfbits;
        if variant == AskVariant::Manchester {
            let folded = decode::manchester_decode(&bits, false)?;
            start_idx += (est.clock as i64 / 2) * folded.offset as i64;
            errors = folded.errors;
            bits = folded.bits;
        }
        return Ok(AskRaw {
            bits,
            clock: est.clock,
            start_idx,
            errors,
        });
    }

    let (bits, errors) = leveled_slice(samples, est.clock, est.start, invert, hi, lo, variant);
    Ok(AskRaw {
        bits,
        clock: est.clock,
        start_idx: est.start as i64 - est.clock as i64 / 2,
        errors,
    })
}

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

/// Run-length slicer for clean clipped waves. Emits two elements per full
/// clock wave and one per half wave; waves longer than a clock and a
/// quarter count as errors.
fn clean_slice(
    samples: &[i32],
    clock: usize,
    invert: bool,
    hi: i32,
    lo: i32,
) -> (Vec<u8>, i64, usize) {
    let inv = invert as u8;
    let mut bits = Vec::new();
    let mut errors = 0usize;
    let mut start_idx: i64 = 0;
    let mut smpl_cnt = 1usize;
    let mut wave_high = samples.first().map_or(false, |&s| s >= hi);
    for (i, &s) in samples.iter().enumerate().skip(1) {
        let same = (s >= hi && wave_high) || (s <= lo && !wave_high);
        let crossed = (s >= hi && !wave_high) || (s <= lo && wave_high);
        if same {
            smpl_cnt += 1;
        } else if crossed {
            if smpl_cnt > clock - clock / 4 - 1 {
                // full clock wave
                if smpl_cnt > clock + clock / 4 + 1 {
                    errors += 1;
                    bits.push(ERROR_BIT);
                } else {
                    let b = if wave_high { inv } else { inv ^ 1 };
                    bits.push(b);
                    bits.push(b);
                }
                if start_idx == 0 {
                    start_idx = i as i64 - clock as i64;
                }
                wave_high = !wave_high;
                smpl_cnt = 0;
            } else if smpl_cnt > clock / 2 - clock / 4 - 1 {
                // half clock wave
                let b = if wave_high { inv } else { inv ^ 1 };
                bits.push(b);
                if start_idx == 0 {
                    start_idx = i as i64 - clock as i64 / 2;
                }
                wave_high = !wave_high;
                smpl_cnt = 0;
            } else {
                // glitch shorter than half a clock
                smpl_cnt += 1;
            }
        } else {
            smpl_cnt += 1;
        }
    }
    (bits, start_idx, errors)
}

/// Threshold-crossing slicer: read the level on the clock grid, carrying a
/// one-sample tolerance for small clocks. Raw mode also samples mid-bit.
fn leveled_slice(
    samples: &[i32],
    clock: usize,
    start: usize,
    invert: bool,
    hi: i32,
    lo: i32,
    variant: AskVariant,
) -> (Vec<u8>, usize) {
    const MAX_BITS: usize = 3072;
    let tol = if clock <= 32 { 1i64 } else { 0i64 };
    let inv = invert as u8;
    let clock_i = clock as i64;
    let mut bits = Vec::new();
    let mut errors = 0usize;
    let mut last_bit = start as i64 - clock_i;
    let mut mid_bit = false;
    let mut i = start;
    while i < samples.len() && bits.len() < MAX_BITS {
        let gap = i as i64 - last_bit;
        if gap >= clock_i - tol {
            if samples[i] >= hi {
                bits.push(inv);
            } else if samples[i] <= lo {
                bits.push(inv ^ 1);
            } else if gap >= clock_i + tol {
                if !bits.is_empty() {
                    bits.push(ERROR_BIT);
                    errors += 1;
                }
            } else {
                // inside tolerance, wait for the peak
                i += 1;
                continue;
            }
            mid_bit = false;
            last_bit += clock_i;
        } else if gap >= clock_i / 2 - tol && !mid_bit && variant == AskVariant::Raw {
            if samples[i] >= hi {
                bits.push(inv);
            } else if samples[i] <= lo {
                bits.push(inv ^ 1);
            } else if gap >= clock_i / 2 + tol {
                let prev = bits.last().copied().unwrap_or(0);
                bits.push(prev);
            } else {
                i += 1;
                continue;
            }
            mid_bit = true;
        }
        i += 1;
    }
    (bits, errors)
}

/// ASK entry point: condition, find terminators, slice, validate, install.
pub fn run_ask(session: &mut Session, opts: &AskOptions) -> Result<AskReport> {
    let mut samples: Vec<i32> = session.graph.as_slice().to_vec();
    if samples.len() < 255 {
        return Err(DemodError::TooFewSamples {
            needed: 255,
            have: samples.len(),
        }
        .into());
    }
    if opts.max_len > 0 && samples.len() > opts.max_len {
        samples.truncate(opts.max_len);
    }
    if opts.amplify {
        amplify(&mut samples);
    }

    let mut clock_hint = opts.clock;
    let mut st_region = None;
    if let Some(st) = detect_sequence_terminator(&samples, session.config.noise_floor) {
        if clock_hint == 0 && (st.region.found_clock == 32 || st.region.found_clock == 64) {
            clock_hint = st.region.found_clock;
        }
        session.markers.a = st.region.start;
        session.markers.b = st.region.end;
        session
            .log
            .debug("ASK", format!("sequence terminator at {}..{}", st.region.start, st.region.end));
        samples = st.trimmed;
        st_region = Some(st.region);
    }

    let props = SignalProperties::compute(&samples, session.config.noise_floor);
    let raw = ask_demod(&samples, &props, clock_hint, opts.invert, opts.variant)?;
    if raw.bits.len() < 16 {
        return Err(DemodError::NoData {
            bits: raw.bits.len(),
        }
        .into());
    }
    if raw.errors > opts.max_err {
        return Err(DemodError::TooManyErrors {
            errors: raw.errors,
            budget: opts.max_err,
        }
        .into());
    }

    session.install_demod(&raw.bits, raw.clock, raw.start_idx);
    let em = if opts.em_search {
        em410x::search_and_install(session)
    } else {
        None
    };
    Ok(AskReport {
        clock: raw.clock,
        start_idx: raw.start_idx,
        bits: session.demod.len(),
        errors: raw.errors,
        st: st_region,
        em,
    })
}

#[derive(Debug, Clone)]
pub struct AskBiphaseOptions {
    pub offset: usize,
    pub clock: usize,
    pub invert: bool,
    pub max_err: usize,
    pub max_len: usize,
    pub amplify: bool,
}

impl Default for AskBiphaseOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            clock: 0,
            invert: false,
            max_err: 50,
            max_len: 0,
            amplify: false,
        }
    }
}

/// ASK raw demod followed by biphase decode; errors from both stages count
/// against the shared budget.
pub fn run_ask_biphase(session: &mut Session, opts: &AskBiphaseOptions) -> Result<AskReport> {
    let mut samples: Vec<i32> = session.graph.as_slice().to_vec();
    if samples.is_empty() {
        return Err(DemodError::TooFewSamples {
            needed: 255,
            have: 0,
        }
        .into());
    }
    if opts.max_len > 0 && samples.len() > opts.max_len {
        samples.truncate(opts.max_len);
    }
    if opts.amplify {
        amplify(&mut samples);
    }
    let props = SignalProperties::compute(&samples, session.config.noise_floor);
    let raw = ask_demod(&samples, &props, opts.clock, false, AskVariant::Raw)?;
    if raw.errors > opts.max_err {
        return Err(DemodError::TooManyErrors {
            errors: raw.errors,
            budget: opts.max_err,
        }
        .into());
    }
    let dec = decode::biphase_decode(&raw.bits, opts.offset, opts.invert)?;
    let total_errors = raw.errors + dec.errors;
    if total_errors > opts.max_err {
        return Err(DemodError::TooManyErrors {
            errors: total_errors,
            budget: opts.max_err,
        }
        .into());
    }
    let start = raw.start_idx + (raw.clock * dec.offset) as i64 / 2;
    session.install_demod(&dec.bits, raw.clock, start);
    Ok(AskReport {
        clock: raw.clock,
        start_idx: start,
        bits: session.demod.len(),
        errors: total_errors,
        st: None,
        em: None,
    })
}

/// One full low-to-low wave: position, total length and high-portion length.
#[derive(Debug, Clone, Copy)]
struct Wave {
    pos: usize,
    len: usize,
    high_len: usize,
}

pub(crate) struct StDetection {
    pub region: StRegion,
    pub trimmed: Vec<i32>,
}

/// Detect sequence terminators and cut them out of the working trace.
///
/// The terminator signature, measured in full waves: a data wave (one to two
/// clocks, short high), a two-clock wave carrying a clock-and-a-half high,
/// a long wave with at least a full-clock high, then a normal data wave.
pub(crate) fn detect_sequence_terminator(samples: &[i32], noise_floor: i32) -> Option<StDetection> {
    let props = SignalProperties::compute(samples, noise_floor);
    if props.is_noise {
        return None;
    }
    let (hi, lo) = props.hi_lo(80, 80)?;
    let waves = collect_waves(samples, hi, lo);
    if waves.len() < 8 {
        return None;
    }
    let min_full = waves.iter().map(|w| w.len).min()?;
    let found_clock = if min_full.abs_diff(32) <= 4 {
        32
    } else if min_full.abs_diff(64) <= 8 {
        64
    } else {
        return None;
    };
    let matches = find_st_pattern(&waves, found_clock);
    let first = *matches.first()?;

    let clk = found_clock;
    let tol = clk / 8;
    // the terminator proper spans the long-high wave and its successor
    let st_start = waves[first + 1].pos;
    let st_len = clk * 4 - tol;
    let st_end = (st_start + st_len).min(samples.len());

    // data span between terminators, rounded onto the clock grid
    let data_start = st_end;
    let data_end = matches
        .iter()
        .skip(1)
        .map(|&m| waves[m + 1].pos)
        .find(|&p| p > data_start)
        .unwrap_or(samples.len());
    let mut data_len = data_end - data_start;
    let rem = data_len % clk;
    if rem <= tol {
        data_len -= rem;
    } else if clk - rem <= tol {
        data_len += clk - rem;
    } else {
        return None;
    }
    if data_len / clk < 16 || data_start + data_len > samples.len() {
        return None;
    }
    let trimmed = samples[data_start..data_start + data_len].to_vec();
    Some(StDetection {
        region: StRegion {
            start: st_start,
            end: st_end,
            found_clock,
        },
        trimmed,
    })
}

fn collect_waves(samples: &[i32], hi: i32, lo: i32) -> Vec<Wave> {
    let len = samples.len();
    let mut i = 0usize;
    // prime to the first rising edge
    while i < len && samples[i] >= lo {
        i += 1;
    }
    while i < len && samples[i] < hi {
        i += 1;
    }
    let mut waves = Vec::new();
    while i < len && waves.len() < 128 {
        let pos = i;
        let high_start = i;
        while i < len && samples[i] > lo {
            i += 1;
        }
        let high_len = i - high_start;
        while i < len && samples[i] < hi {
            i += 1;
        }
        if i >= len {
            break;
        }
        waves.push(Wave {
            pos,
            len: i - pos,
            high_len,
        });
    }
    waves
}

fn find_st_pattern(waves: &[Wave], clk: usize) -> Vec<usize> {
    let tol = clk / 8;
    let mut found = Vec::new();
    for i in 0..waves.len().saturating_sub(3) {
        let w = &waves[i..i + 4];
        let data_before = w[0].len + tol >= clk && w[0].len <= clk * 2 + tol && w[0].high_len < clk + tol;
        let long_high = w[1].len + tol >= clk * 2
            && w[1].len <= clk * 2 + tol
            && w[1].high_len + tol > clk * 3 / 2;
        let tail = w[2].len + tol >= clk * 3 / 2
            && w[2].len <= clk * 2 + tol
            && w[2].high_len + tol > clk;
        let data_after = w[3].len + tol >= clk && w[3].len <= clk * 2 + tol;
        if data_before && long_high && tail && data_after {
            found.push(i);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manchester_wave(bits: &[u8], clock: usize) -> Vec<i32> {
        let half = clock / 2;
        let mut wave = Vec::new();
        for &b in bits {
            let (first, second) = if b == 1 { (127, -127) } else { (-127, 127) };
            wave.extend(std::iter::repeat(first).take(half));
            wave.extend(std::iter::repeat(second).take(half));
        }
        wave
    }

    fn props_of(samples: &[i32]) -> SignalProperties {
        SignalProperties::compute(samples, 8)
    }

    #[test]
    fn amplify_rails_weak_wave() {
        let mut samples = vec![0, 40, 42, 41, 5, 3, 4, 45, 44];
        amplify(&mut samples);
        assert_eq!(&samples[1..], &[127, 127, 127, -127, -127, -127, 127, 127]);
    }

    #[test]
    fn clean_manchester_round_trip() {
        let data: Vec<u8> = (0..48).map(|i| ((i ^ (i >> 2)) % 2) as u8).collect();
        let wave = manchester_wave(&data, 64);
        let props = props_of(&wave);
        let raw = ask_demod(&wave, &props, 0, false, AskVariant::Manchester).unwrap();
        assert_eq!(raw.clock, 64);
        assert_eq!(raw.errors, 0);
        // the slicer loses the unterminated final wave
        assert!(raw.bits.len() >= data.len() - 2);
        assert_eq!(raw.bits[..], data[..raw.bits.len()]);
    }

    #[test]
    fn clean_raw_emits_halfbits() {
        let data: Vec<u8> = (0..40).map(|i| (i % 2) as u8).collect();
        let wave = manchester_wave(&data, 64);
        let props = props_of(&wave);
        let raw = ask_demod(&wave, &props, 0, false, AskVariant::Raw).unwrap();
        // two halfbits per data bit, minus the trailing wave
        assert!(raw.bits.len() >= data.len() * 2 - 3);
        assert_eq!(raw.errors, 0);
    }

    #[test]
    fn invert_flips_output() {
        let data: Vec<u8> = (0..48).map(|i| ((i / 3) % 2) as u8).collect();
        let wave = manchester_wave(&data, 64);
        let props = props_of(&wave);
        let plain = ask_demod(&wave, &props, 0, false, AskVariant::Manchester).unwrap();
        let flipped = ask_demod(&wave, &props, 0, true, AskVariant::Manchester).unwrap();
        let n = plain.bits.len().min(flipped.bits.len());
        for i in 0..n {
            assert_eq!(plain.bits[i] ^ 1, flipped.bits[i]);
        }
    }

    #[test]
    fn run_ask_needs_samples() {
        let mut session = Session::default();
        session.graph.load(vec![0; 100]);
        let err = run_ask(&mut session, &AskOptions::default());
        assert!(err.is_err());
    }

    #[test]
    fn st_pattern_matcher_hits_signature() {
        let clk = 64usize;
        let mk = |len: usize, high_len: usize, pos: usize| Wave { pos, len, high_len };
        let waves = vec![
            mk(64, 32, 0),
            mk(64, 32, 64),
            mk(128, 96, 128),  // terminator: two clocks, 1.5-clock high
            mk(112, 64, 256),
            mk(64, 32, 368),
            mk(64, 32, 432),
            mk(64, 32, 496),
            mk(64, 32, 560),
        ];
        let hits = find_st_pattern(&waves, clk);
        assert_eq!(hits, vec![1]);
    }

    #[test]
    fn no_terminator_in_plain_manchester() {
        let data: Vec<u8> = (0..64).map(|i| ((i * 7) % 2) as u8).collect();
        let wave = manchester_wave(&data, 64);
        assert!(detect_sequence_terminator(&wave, 8).is_none());
    }
}
