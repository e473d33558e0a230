//! Benchmarks for signal amplification primitives.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_group::dsp::amplify;

use crate::BLOCK_SIZES;

pub fn bench_amplify(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/amplify");

    for &size in BLOCK_SIZES {
        let signal: Vec<f32> = (0..size)
            .map(|i| (i as f32 / size as f32) * 2.0 - 1.0)
            .collect();
        let modulator: Vec<f32> = (0..size).map(|i| i as f32 / size as f32).collect();

        let mut signal_copy = signal.clone();
        group.bench_with_input(
            BenchmarkId::new("multiply_in_place", size),
            &size,
            |b, _| {
                b.iter(|| {
                    signal_copy.copy_from_slice(&signal);
                    amplify::multiply_in_place(black_box(&mut signal_copy), black_box(&modulator))
                })
            },
        );

        // Carrier pitch × group pitch × detune multiplier
        let mut signal_copy = signal.clone();
        group.bench_with_input(
            BenchmarkId::new("multiply_scaled_in_place", size),
            &size,
            |b, _| {
                b.iter(|| {
                    signal_copy.copy_from_slice(&signal);
                    amplify::multiply_scaled_in_place(
                        black_box(&mut signal_copy),
                        black_box(&modulator),
                        black_box(1.07),
                    )
                })
            },
        );

        // FM modulation index: shift then clamp
        let mut signal_copy = signal.clone();
        group.bench_with_input(BenchmarkId::new("fm_shift_clip", size), &size, |b, _| {
            b.iter(|| {
                signal_copy.copy_from_slice(&signal);
                amplify::add_scalar(black_box(&mut signal_copy), 1.0);
                amplify::clip_in_place(black_box(&mut signal_copy), 1e-8, 1000.0)
            })
        });

        let mut signal_copy = signal.clone();
        group.bench_with_input(BenchmarkId::new("apply_gain", size), &size, |b, _| {
            b.iter(|| {
                signal_copy.copy_from_slice(&signal);
                amplify::apply_gain(black_box(&mut signal_copy), black_box(0.5))
            })
        });
    }

    group.finish();
}
