//! saavy-group - plays a three-oscillator synth group on the default output
//!
//! Run with: cargo run -- [config.json]

mod app;

use std::time::Duration;

use app::Player;
use color_eyre::eyre::WrapErr;
use saavy_group::{
    graph::OscNode,
    modulation::EnvelopeChain,
    synth::{ChildSynth, Group},
    EngineConfig,
};

const CHORDS: [[u8; 3]; 4] = [[48, 55, 63], [53, 60, 65], [51, 58, 67], [50, 55, 62]];

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path).wrap_err_with(|| format!("failed to read {path}"))?;
            EngineConfig::from_json_str(&json)?
        }
        None => EngineConfig {
            max_polyphony: 16,
            ..Default::default()
        },
    };

    let group = Group::new("demo", config.clone());
    for (name, osc) in [("saw", OscNode::sawtooth as fn() -> OscNode), ("square", OscNode::square), ("sine", OscNode::sine)] {
        group.add_child_with_fixup(
            ChildSynth::new(name, osc)
                .with_voices(config.max_polyphony)
                .with_gain(0.25)
                .with_gain_chain(EnvelopeChain::adsr(0.01, 0.2, 0.6, 0.3)),
        )?;
    }
    group.set_gain_chain(EnvelopeChain::adsr(0.005, 0.1, 0.9, 0.4));
    group.set_unisono_voice_amount(3);
    group.set_unisono_detune(0.01);
    group.set_unisono_spread(0.8);

    let mut player = Player::start(group)?;

    println!("Playing... Press Ctrl+C to stop");
    println!();

    for round in 0.. {
        // every other round, pair saw (carrier) with sine (modulator)
        let fm = round % 2 == 1;
        player.group().set_carrier_index(fm.then_some(0));
        player.group().set_modulator_index(fm.then_some(2));
        player.group().set_fm_enabled(fm);
        println!("  Round {round}: {}", player.group().fm_status());

        for chord in CHORDS {
            for note in chord {
                player.note_on(note, 100);
            }
            std::thread::sleep(Duration::from_millis(900));
            for note in chord {
                player.note_off(note);
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    Ok(())
}
