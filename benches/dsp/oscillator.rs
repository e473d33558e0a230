//! Benchmarks for oscillator waveform generation.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_group::dsp::oscillator::{Oscillator, Waveform};

use crate::BLOCK_SIZES;

pub fn bench_oscillator(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/oscillator");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];
        let flat_pitch = vec![1.0f32; size];
        // An FM-style pitch curve
        let fm_pitch: Vec<f32> = (0..size)
            .map(|i| 1.0 + 0.5 * (i as f32 * 0.05).sin())
            .collect();

        for (name, waveform) in [
            ("sine", Waveform::Sine),
            ("sawtooth", Waveform::Saw),
            ("square", Waveform::Square),
            ("triangle", Waveform::Triangle),
        ] {
            let mut osc = Oscillator::new(waveform);
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| {
                    osc.render(
                        black_box(&mut buffer),
                        black_box(&flat_pitch),
                        black_box(440.0),
                        black_box(48_000.0),
                    );
                })
            });
        }

        let mut osc = Oscillator::new(Waveform::Sine);
        group.bench_with_input(BenchmarkId::new("sine_fm", size), &size, |b, _| {
            b.iter(|| {
                osc.render(
                    black_box(&mut buffer),
                    black_box(&fm_pitch),
                    black_box(440.0),
                    black_box(48_000.0),
                );
            })
        });
    }

    group.finish();
}
