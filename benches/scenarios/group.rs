//! Benchmarks for complete group renders.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_group::{
    graph::OscNode,
    modulation::EnvelopeChain,
    synth::{ChildSynth, Group},
    EngineConfig,
};

use crate::BLOCK_SIZES;

const POLYPHONY: usize = 16;

fn group(block_size: usize, children: usize) -> Group {
    let config = EngineConfig {
        sample_rate: 48_000.0,
        block_size,
        max_polyphony: POLYPHONY,
        seed: Some(7),
        ..Default::default()
    };
    let group = Group::new("bench", config);

    for i in 0..children {
        let synth = ChildSynth::new(format!("osc{i}"), OscNode::sawtooth)
            .with_voices(POLYPHONY)
            // Long sustain so voices keep sounding while the bench runs
            .with_gain_chain(EnvelopeChain::adsr(0.005, 0.1, 0.8, 0.3));
        let _ = group.add_child_with_fixup(synth);
    }
    group.set_gain_chain(EnvelopeChain::adsr(0.005, 0.1, 0.8, 0.3));
    group
}

pub fn bench_group(c: &mut Criterion) {
    let mut bench = c.benchmark_group("scenarios/group");

    for &size in BLOCK_SIZES {
        let mut left = vec![0.0f32; size];
        let mut right = vec![0.0f32; size];

        // === CHORD ===
        // three children, four notes, no unisono
        let chord = group(size, 3);
        for note in [48, 55, 60, 64] {
            chord.note_on(note, 100);
        }
        bench.bench_with_input(BenchmarkId::new("chord_3x4", size), &size, |b, _| {
            b.iter(|| chord.render_block(black_box(&mut left), black_box(&mut right)))
        });

        // === SUPERSAW ===
        // one child, 4-voice unisono with detune and spread
        let supersaw = group(size, 1);
        supersaw.set_unisono_voice_amount(4);
        supersaw.set_unisono_detune(0.05);
        supersaw.set_unisono_spread(0.8);
        for note in [48, 60] {
            supersaw.note_on(note, 100);
        }
        bench.bench_with_input(BenchmarkId::new("unisono_4", size), &size, |b, _| {
            b.iter(|| supersaw.render_block(black_box(&mut left), black_box(&mut right)))
        });

        // === FM PAIR ===
        // modulator → carrier, per-sample pitch on the carrier
        let fm = group(size, 2);
        fm.set_carrier_index(Some(0));
        fm.set_modulator_index(Some(1));
        fm.set_fm_enabled(true);
        for note in [48, 60] {
            fm.note_on(note, 100);
        }
        bench.bench_with_input(BenchmarkId::new("fm_pair", size), &size, |b, _| {
            b.iter(|| fm.render_block(black_box(&mut left), black_box(&mut right)))
        });
    }

    bench.finish();
}
