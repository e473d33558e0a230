//! Benchmarks for the unisono detune/spread math.
//!
//! Computed once per block per unisono slot, so cost scales with the
//! unisono amount rather than with the block size.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_group::dsp::detune::DetuneValues;

pub fn bench_detune(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/detune");

    for num_voices in [1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("all_slots", num_voices),
            &num_voices,
            |b, &n| {
                b.iter(|| {
                    let mut acc = 0.0f32;
                    for k in 0..n {
                        let values = DetuneValues::compute(
                            black_box(n),
                            black_box(k),
                            black_box(0.1),
                            black_box(0.8),
                            black_box(0.9),
                            black_box(1.0),
                        );
                        acc += values.multiplier + values.balance_left;
                    }
                    acc
                })
            },
        );
    }

    group.finish();
}
