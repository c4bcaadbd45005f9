//! PSK1 demodulation: correlate each bit window against the reference
//! carrier window; a negative correlation is a phase flip.

use crate::buffer::SignalProperties;
use crate::clock;
use crate::demodbuf::ERROR_BIT;
use crate::errors::{DemodError, Result};
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct PskOptions {
    /// Bit clock; 0 autodetects.
    pub clock: usize,
    pub invert: bool,
    pub max_err: usize,
}

impl Default for PskOptions {
    fn default() -> Self {
        Self {
            clock: 0,
            invert: false,
            max_err: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PskReport {
    pub clock: usize,
    pub carrier: usize,
    pub bits: usize,
    pub errors: usize,
    pub start_idx: i64,
}

#[derive(Debug, Clone)]
pub struct PskRaw {
    pub bits: Vec<u8>,
    pub clock: usize,
    pub carrier: usize,
    pub start_idx: i64,
    pub errors: usize,
}

/// Demodulate a PSK1 wave.
///
/// The first phase shift anchors the bit grid. Every window is correlated
/// against the first one; windows whose correlation magnitude drops under a
/// quarter of the strongest are sentineled.
pub fn psk_demod(
    samples: &[i32],
    props: &SignalProperties,
    clock_hint: usize,
    invert: bool,
) -> Result<PskRaw> {
    if samples.len() < 170 {
        return Err(DemodError::TooFewSamples {
            needed: 170,
            have: samples.len(),
        }
        .into());
    }
    let est = clock::detect_psk_clock(samples, props, clock_hint)?;
    let clock = est.clock;
    let anchor = est.start % clock;
    let windows = (samples.len() - anchor) / clock;
    if windows < 2 {
        return Err(DemodError::NoData { bits: windows }.into());
    }

    let reference = &samples[anchor..anchor + clock];
    let mut correlations = Vec::with_capacity(windows);
    let mut strongest: i64 = 0;
    for k in 0..windows {
        let base = anchor + k * clock;
        let mut corr: i64 = 0;
        for (j, &r) in reference.iter().enumerate() {
            corr += samples[base + j] as i64 * r as i64;
        }
        strongest = strongest.max(corr.abs());
        correlations.push(corr);
    }
    if strongest == 0 {
        return Err(DemodError::Noise.into());
    }

    let inv = invert as u8;
    let floor = strongest / 4;
    let mut bits = Vec::with_capacity(windows);
    let mut errors = 0usize;
    for corr in correlations {
        if corr.abs() < floor {
            bits.push(ERROR_BIT);
            errors += 1;
        } else {
            bits.push(inv ^ (corr < 0) as u8);
        }
    }
    Ok(PskRaw {
        bits,
        clock,
        carrier: est.carrier,
        start_idx: anchor as i64,
        errors,
    })
}

/// PSK1 entry point: demodulate, validate, install.
pub fn run_psk(session: &mut Session, opts: &PskOptions) -> Result<PskReport> {
    let props = session.properties();
    if props.is_noise {
        return Err(DemodError::Noise.into());
    }
    let samples: Vec<i32> = session.graph.as_slice().to_vec();
    let raw = psk_demod(&samples, &props, opts.clock, opts.invert)?;
    if raw.errors > opts.max_err {
        return Err(DemodError::TooManyErrors {
            errors: raw.errors,
            budget: opts.max_err,
        }
        .into());
    }
    if raw.bits.len() < 16 {
        return Err(DemodError::NoData {
            bits: raw.bits.len(),
        }
        .into());
    }
    session.install_demod(&raw.bits, raw.clock, raw.start_idx);
    session.log.debug(
        "PSK",
        format!(
            "clock {}, carrier {}, {} bits, {} errors",
            raw.clock,
            raw.carrier,
            raw.bits.len(),
            raw.errors
        ),
    );
    Ok(PskReport {
        clock: raw.clock,
        carrier: raw.carrier,
        bits: session.demod.len(),
        errors: raw.errors,
        start_idx: raw.start_idx,
    })
}
