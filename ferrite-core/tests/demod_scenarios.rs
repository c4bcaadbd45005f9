//! End-to-end demodulation scenarios over synthetic traces.

mod common;

use common::*;
use ferrite_core::bits;
use ferrite_core::clock;
use ferrite_core::conditioning;
use ferrite_core::demod::{ask, decode, em410x, fsk};
use ferrite_core::Session;

/// ASK/Manchester EM410x at RF/64: the demod must land on the 64-bit frame
/// and the format search must recover the id.
#[test]
fn s1_ask_manchester_em410x() {
    let id = 0x8001020304u64;
    let frame = em410x::encode(id);
    let mut bits_stream = Vec::new();
    for _ in 0..3 {
        bits_stream.extend_from_slice(&frame);
    }
    let wave = manchester_wave(&bits_stream, 64);

    let mut session = Session::default();
    session.graph.load(wave);
    let opts = ask::AskOptions {
        em_search: true,
        variant: ask::AskVariant::Manchester,
        ..Default::default()
    };
    let report = ask::run_ask(&mut session, &opts).unwrap();

    assert_eq!(report.clock, 64);
    let em = report.em.expect("EM410x frame not found");
    assert_eq!(em.hi, 0);
    assert_eq!(em.id, id);
    assert_eq!(session.demod.len(), 64, "demod buffer not reframed to the frame");
}

/// FSK2 at RF/50 with FC 10/8: classification, bit count and clock
/// detection must all agree.
#[test]
fn s2_fsk2_rf50() {
    let data = mixed_bits(64);
    let wave = fsk_wave(&data, 50, 10, 8);

    let mut session = Session::default();
    session.graph.load(wave.clone());
    let report = fsk::run_fsk(&mut session, &fsk::FskOptions::default()).unwrap();
    assert_eq!(report.variant, "FSK2");
    assert_eq!(report.clock, 50);
    assert!(report.bits >= 32, "only {} bits", report.bits);

    let props = session.properties();
    let timing = clock::fsk_clocks(&wave, &props).unwrap();
    assert_eq!(timing.clock, 50);
    assert_eq!((timing.fc_high, timing.fc_low), (10, 8));
}

/// Manchester encode then decode is the identity, with zero errors.
#[test]
fn s3_manchester_idempotence() {
    let data: Vec<u8> = (0..200).map(|i| ((i * 11 + i / 7) % 2) as u8).collect();
    let encoded = decode::manchester_encode(&data);

    let mut session = Session::default();
    session.graph.load(vec![0; 300]);
    session.install_demod(&encoded, 32, 0);

    let dec = decode::manchester_decode(session.demod.as_slice(), false).unwrap();
    assert_eq!(dec.errors, 0);
    assert_eq!(dec.bits, data);
}

/// Autocorrelation of a long 64-sample square wave reports 64.
#[test]
fn s4_autocorrelation_square() {
    let wave = square_wave(40_000, 64, 127);
    let ac = clock::autocorrelate(&wave, 4000).unwrap();
    assert_eq!(ac.distance, Some(64));
}

/// Zero-crossing counting on a 100-sample sine settles on the period.
#[test]
fn s5_zero_crossings_sine() {
    let mut session = Session::default();
    session.graph.load(sine_wave(10_000, 100, 100.0));
    conditioning::hpf(&mut session.graph);
    conditioning::zero_crossings(&mut session.graph);
    let nonzero: Vec<i32> = session
        .graph
        .as_slice()
        .iter()
        .copied()
        .filter(|&v| v != 0)
        .collect();
    assert!(!nonzero.is_empty());
    for v in nonzero {
        assert!((99..=101).contains(&v), "period {v} out of range");
    }
}

/// bin2hex and hex2bin agree on the documented example.
#[test]
fn s6_bin_hex_round_trip() {
    let parsed = bits::parse_bin("01010101").unwrap();
    let (hex, padded) = bits::bin_to_hex(&parsed);
    assert_eq!(hex, "55");
    assert_eq!(padded, 0);
    assert_eq!(bits::hex_to_bin("55").unwrap(), parsed);
}
