//! Benchmarks for the routing matrix on the audio path.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_group::routing::{Notify, RouteEffect};

use crate::BLOCK_SIZES;

pub fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/routing");

    for &size in BLOCK_SIZES {
        let mut channels: Vec<Vec<f32>> = (0..8)
            .map(|ch| (0..size).map(|i| ((i + ch) as f32 * 0.01).sin()).collect())
            .collect();

        // Fold channels 2..8 onto the first stereo pair
        let fx = RouteEffect::new();
        fx.matrix().set_num_source_channels(8, Notify::Suppress);
        fx.matrix().set_num_destination_channels(8, Notify::Suppress);
        for source in 2..8 {
            fx.matrix().send_connect(source, source % 2);
        }

        group.bench_with_input(BenchmarkId::new("sends_8ch", size), &size, |b, _| {
            b.iter(|| {
                let mut views: Vec<&mut [f32]> = channels.iter_mut().map(Vec::as_mut_slice).collect();
                fx.process(black_box(&mut views));
            })
        });

        fx.matrix().set_editor_shown(true);
        group.bench_with_input(BenchmarkId::new("sends_8ch_metered", size), &size, |b, _| {
            b.iter(|| {
                let mut views: Vec<&mut [f32]> = channels.iter_mut().map(Vec::as_mut_slice).collect();
                fx.process(black_box(&mut views));
            })
        });
    }

    group.finish();
}
