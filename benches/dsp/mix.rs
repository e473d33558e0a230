//! Benchmarks for signal mixing operations.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_group::dsp::mix;

use crate::BLOCK_SIZES;

pub fn bench_mix(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/mix");

    for &size in BLOCK_SIZES {
        let signal_a: Vec<f32> = (0..size).map(|i| (i as f32 * 0.1).sin()).collect();
        let signal_b: Vec<f32> = (0..size).map(|i| (i as f32 * 0.15).cos()).collect();

        let mut bus = vec![0.0f32; size];
        group.bench_with_input(BenchmarkId::new("sum_in_place", size), &size, |b, _| {
            b.iter(|| {
                bus.copy_from_slice(&signal_a);
                mix::sum_in_place(black_box(&mut bus), black_box(&signal_b));
            })
        });

        group.bench_with_input(BenchmarkId::new("add_scaled", size), &size, |b, _| {
            b.iter(|| {
                bus.copy_from_slice(&signal_a);
                mix::add_scaled(black_box(&mut bus), black_box(&signal_b), black_box(0.7));
            })
        });

        // One child voice into the group voice bus
        let mut left = vec![0.0f32; size];
        let mut right = vec![0.0f32; size];
        group.bench_with_input(BenchmarkId::new("accumulate_stereo", size), &size, |b, _| {
            b.iter(|| {
                mix::accumulate_stereo(
                    [black_box(&mut left[..]), black_box(&mut right[..])],
                    [&signal_a, &signal_b],
                    black_box(0.6),
                    black_box(0.8),
                );
            })
        });
    }

    group.finish();
}
