//! Synthetic signal generators shared by the integration suites.

#![allow(dead_code)]

/// Manchester-encode data bits into a clipped wave: bit 1 is high-then-low,
/// bit 0 low-then-high.
pub fn manchester_wave(bits: &[u8], clock: usize) -> Vec<i32> {
    let half = clock / 2;
    let mut wave = Vec::with_capacity(bits.len() * clock);
    for &b in bits {
        let (first, second) = if b == 1 { (127, -127) } else { (-127, 127) };
        wave.extend(std::iter::repeat(first).take(half));
        wave.extend(std::iter::repeat(second).take(half));
    }
    wave
}

/// Phase-continuous FSK wave: bit 1 rides the short tone (`fc_low` samples
/// per cycle), bit 0 the long tone.
pub fn fsk_wave(bits: &[u8], clock: usize, fc_high: usize, fc_low: usize) -> Vec<i32> {
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

/// One level per bit, `clock` samples wide.
pub fn nrz_wave(bits: &[u8], clock: usize) -> Vec<i32> {
    let mut wave = Vec::with_capacity(bits.len() * clock);
    for &b in bits {
        let level = if b == 1 { 127 } else { -127 };
        wave.extend(std::iter::repeat(level).take(clock));
    }
    wave
}

/// Square wave with the given full period.
pub fn square_wave(len: usize, period: usize, amplitude: i32) -> Vec<i32> {
    (0..len)
        .map(|i| {
            if (i / (period / 2)) % 2 == 0 {
                amplitude
            } else {
                -amplitude
            }
        })
        .collect()
}

/// Sampled sine with the given period.
pub fn sine_wave(len: usize, period: usize, amplitude: f64) -> Vec<i32> {
    (0..len)
        .map(|i| {
            let phase = std::f64::consts::TAU * i as f64 / period as f64;
            (amplitude * phase.sin()).round() as i32
        })
        .collect()
}

/// A mixed bit pattern with plenty of single-bit runs.
pub fn mixed_bits(len: usize) -> Vec<u8> {
    [1u8, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 1]
        .iter()
        .cycle()
        .take(len)
        .copied()
        .collect()
}
