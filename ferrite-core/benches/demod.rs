//! Benchmarks for the hot scanning loops.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ferrite_core::clock;
use ferrite_core::demod::ask;
use ferrite_core::SignalProperties;

fn manchester_wave(bits: usize, clock: usize) -> Vec<i32> {
    let half = clock / 2;
    let mut wave = Vec::with_capacity(bits * clock);
    for i in 0..bits {
        let b = (i ^ (i >> 2)) % 2;
        let (first, second) = if b == 1 { (127, -127) } else { (-127, 127) };
        wave.extend(std::iter::repeat(first).take(half));
        wave.extend(std::iter::repeat(second).take(half));
    }
    wave
}

fn bench_autocorrelate(c: &mut Criterion) {
    let wave = manchester_wave(120, 64);
    c.bench_function("autocorrelate 7680x512", |b| {
        b.iter(|| clock::autocorrelate(black_box(&wave), 512).unwrap())
    });
}

fn bench_ask_demod(c: &mut Criterion) {
    let wave = manchester_wave(120, 64);
    let props = SignalProperties::compute(&wave, 8);
    c.bench_function("ask demod 120 bits", |b| {
        b.iter(|| {
            ask::ask_demod(
                black_box(&wave),
                &props,
                0,
                false,
                ask::AskVariant::Manchester,
            )
            .unwrap()
        })
    });
}

fn bench_ask_clock(c: &mut Criterion) {
    let wave = manchester_wave(120, 64);
    let props = SignalProperties::compute(&wave, 8);
    c.bench_function("ask clock detect", |b| {
        b.iter(|| clock::detect_ask_clock(black_box(&wave), &props, 0).unwrap())
    });
}

criterion_group!(benches, bench_autocorrelate, bench_ask_demod, bench_ask_clock);
criterion_main!(benches);
