//! NRZ / direct demodulation: hard-slice the trace, then read one bit per
//! clock of held level.

use crate::buffer::SignalProperties;
use crate::clock;
use crate::errors::{DemodError, Result};
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct NrzOptions {
    /// Bit clock; 0 autodetects.
    pub clock: usize,
    pub invert: bool,
    pub max_err: usize,
}

impl Default for NrzOptions {
    fn default() -> Self {
        Self {
            clock: 0,
            invert: false,
            max_err: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NrzReport {
    pub clock: usize,
    pub bits: usize,
    pub start_idx: i64,
}

#[derive(Debug, Clone)]
pub struct NrzRaw {
    pub bits: Vec<u8>,
    pub clock: usize,
    pub start_idx: i64,
}

/// Slice the trace by its peaks and emit one bit per clock of held level.
pub fn nrz_demod(
    samples: &[i32],
    props: &SignalProperties,
    clock_hint: usize,
    invert: bool,
) -> Result<NrzRaw> {
    if props.is_noise {
        return Err(DemodError::Noise.into());
    }
    if samples.len() < 96 {
        return Err(DemodError::TooFewSamples {
            needed: 96,
            have: samples.len(),
        }
        .into());
    }
    let est = clock::detect_nrz_clock(samples, props, clock_hint)?;
    let clock = est.clock;
    let (hi, lo) = props.hi_lo(75, 75).ok_or(DemodError::Noise)?;

    // latch the level across the mid-band, skipping the trace edges
    let margin = 20usize.min(samples.len() / 4);
    let mut levels = Vec::with_capacity(samples.len() - 2 * margin);
    let mut level = 0u8;
    for &s in &samples[margin..samples.len() - margin] {
        if s >= hi {
            level = 1;
        } else if s <= lo {
            level = 0;
        }
        levels.push(level);
    }

    let inv = invert as u8;
    let mut bits = Vec::new();
    let mut start_idx: i64 = -1;
    let mut run_start = 0usize;
    for i in 1..=levels.len() {
        let run_ended = i == levels.len() || levels[i] != levels[run_start];
        if !run_ended {
            continue;
        }
        let run = i - run_start;
        let n = (run + clock / 4) / clock;
        if n > 0 && start_idx < 0 {
            // align the first emitted bit back from this run's start
            start_idx = (margin + run_start) as i64;
        }
        bits.extend(std::iter::repeat(levels[run_start] ^ inv).take(n));
        run_start = i;
    }
    Ok(NrzRaw {
        bits,
        clock,
        start_idx: start_idx.max(0),
    })
}

/// NRZ entry point: demodulate, validate, install.
pub fn run_nrz(session: &mut Session, opts: &NrzOptions) -> Result<NrzReport> {
    let props = session.properties();
    let samples: Vec<i32> = session.graph.as_slice().to_vec();
    let raw = nrz_demod(&samples, &props, opts.clock, opts.invert)?;
    if raw.bits.len() < 16 {
        return Err(DemodError::NoData {
            bits: raw.bits.len(),
        }
        .into());
    }
    session.install_demod(&raw.bits, raw.clock, raw.start_idx);
    session.log.debug(
        "NRZ",
        format!("clock {}, {} bits", raw.clock, raw.bits.len()),
    );
    Ok(NrzReport {
        clock: raw.clock,
        bits: session.demod.len(),
        start_idx: raw.start_idx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nrz_wave(bits: &[u8], clock: usize) -> Vec<i32> {
        let mut wave = Vec::with_capacity(bits.len() * clock);
        for &b in bits {
            let level = if b == 1 { 127 } else { -127 };
            wave.extend(std::iter::repeat(level).take(clock));
        }
        wave
    }

    #[test]
    fn clean_nrz_round_trips() {
        let data: Vec<u8> = [1u8, 0, 1, 1, 0, 0, 1, 0, 0, 1, 1, 0, 1, 0, 1, 0]
            .iter()
            .cycle()
            .take(48)
            .copied()
            .collect();
        let wave = nrz_wave(&data, 32);
        let props = SignalProperties::compute(&wave, 8);
        let raw = nrz_demod(&wave, &props, 0, false).unwrap();
        assert_eq!(raw.clock, 32);
        // the margins clip a fraction of the first and last bits
        assert!(raw.bits.len() >= data.len() - 2);
        let probe: Vec<u8> = raw.bits[1..raw.bits.len() - 1].to_vec();
        let haystack: Vec<u8> = data.iter().cycle().take(data.len() * 2).copied().collect();
        assert!(haystack.windows(probe.len()).any(|w| w == &probe[..]));
    }

    #[test]
    fn invert_flips_levels() {
        let data = [1u8, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 0, 1, 1, 0, 1, 0];
        let wave = nrz_wave(&data, 32);
        let props = SignalProperties::compute(&wave, 8);
        let plain = nrz_demod(&wave, &props, 32, false).unwrap();
        let flipped = nrz_demod(&wave, &props, 32, true).unwrap();
        assert_eq!(plain.bits.len(), flipped.bits.len());
        for (a, b) in plain.bits.iter().zip(flipped.bits.iter()) {
            assert_eq!(*a ^ 1, *b);
        }
    }

    #[test]
    fn noise_is_rejected() {
        let wave = vec![0i32; 4000];
        let props = SignalProperties::compute(&wave, 8);
        assert!(nrz_demod(&wave, &props, 0, false).is_err());
    }

    #[test]
    fn short_trace_is_rejected() {
        let wave = vec![100i32; 50];
        let props = SignalProperties::compute(&wave, 8);
        assert!(nrz_demod(&wave, &props, 0, false).is_err());
    }
}
