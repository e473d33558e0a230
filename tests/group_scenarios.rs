use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use saavy_group::{
    graph::OscNode,
    modulation::EnvelopeChain,
    notify::ChangeListener,
    synth::{
        group_voice::{GroupChains, UnisonoSettings, VoiceContext},
        ChildList, ChildSynth, FmState, Group, GroupAttribute, GroupVoice, NoteEvent, SynthId, SynthMessage,
        VoiceState,
    },
    EngineConfig, Error,
};

const BLOCK: usize = 128;

fn config(max_polyphony: usize) -> EngineConfig {
    EngineConfig {
        sample_rate: 48_000.0,
        block_size: BLOCK,
        max_polyphony,
        kill_fade_ms: 1.0,
        seed: Some(42),
        ..Default::default()
    }
}

fn osc(name: &str, voices: usize) -> ChildSynth {
    ChildSynth::new(name, OscNode::sine)
        .with_voices(voices)
        .with_gain_chain(EnvelopeChain::adsr(0.001, 0.05, 0.8, 0.005))
}

fn group(children: usize, max_polyphony: usize) -> Group {
    let group = Group::new("group", config(max_polyphony));
    for i in 0..children {
        group
            .add_child_with_fixup(osc(&format!("osc{i}"), max_polyphony))
            .unwrap();
    }
    group.set_gain_chain(EnvelopeChain::adsr(0.001, 0.05, 0.8, 0.005));
    group
}

fn render(group: &Group, blocks: usize) -> (Vec<f32>, Vec<f32>) {
    let mut left = vec![0.0; BLOCK * blocks];
    let mut right = vec![0.0; BLOCK * blocks];
    group.render_block(&mut left, &mut right);
    (left, right)
}

fn energy(signal: &[f32]) -> f32 {
    signal.iter().map(|s| s * s).sum()
}

#[test]
fn three_children_without_fm_are_all_active() {
    let group = group(3, 8);

    let voice = group.note_on(60, 100).unwrap();

    assert_eq!(group.voice_uses_fm(voice), Some(false));
    assert_eq!(group.active_children_for_voice(voice), [SynthId(0), SynthId(1), SynthId(2)]);
    assert_eq!(group.active_child_voice_count(), 3);
}

#[test]
fn enabling_fm_kills_voices_and_restricts_next_note() {
    let group = group(3, 8);
    let first = group.note_on(60, 100).unwrap();

    group.set_carrier_index(Some(2));
    group.set_modulator_index(Some(0));
    group.set_fm_enabled(true);

    assert_eq!(group.fm_status().state, FmState::Working);
    assert_eq!(group.fm_status().message, "FM is working");
    assert_eq!(group.is_voice_killed(first), Some(true));

    // 1 ms kill fade inside one block
    render(&group, 1);
    assert_eq!(group.voice_state(first), Some(VoiceState::Free));

    let next = group.note_on(62, 100).unwrap();
    assert_eq!(group.voice_uses_fm(next), Some(true));

    let mut active = group.active_children_for_voice(next);
    active.sort();
    assert_eq!(active, [SynthId(0), SynthId(2)]);
}

#[test]
fn carrier_equal_to_modulator_falls_back_to_aggregation() {
    let group = group(3, 8);
    group.set_fm_enabled(true);
    group.set_carrier_index(Some(1));
    group.set_modulator_index(Some(1));

    let status = group.fm_status();
    assert_eq!(status.state, FmState::CarrierEqualsModulator);
    assert!(!group.fm_is_correctly_setup());

    let voice = group.note_on(60, 100).unwrap();
    assert_eq!(group.voice_uses_fm(voice), Some(false));
}

#[test]
fn fm_status_messages() {
    let group = group(2, 8);
    group.set_fm_enabled(true);
    assert_eq!(group.fm_status().state, FmState::InvalidCarrier);

    group.set_carrier_index(Some(0));
    assert_eq!(group.fm_status().state, FmState::InvalidModulator);

    group.set_modulator_index(Some(5));
    assert_eq!(group.fm_status().state, FmState::InvalidModulator);

    group.set_fm_enabled(false);
    assert_eq!(group.fm_status().state, FmState::Soloed);
    assert_eq!(group.fm_status().message, "osc0 is soloed (no FM)");

    group.set_carrier_index(None);
    assert_eq!(group.fm_status().message, "FM is deactivated");
}

#[test]
fn solo_carrier_plays_alone() {
    let group = group(3, 8);
    group.set_carrier_index(Some(1));

    let voice = group.note_on(60, 100).unwrap();
    assert_eq!(group.active_children_for_voice(voice), [SynthId(1)]);
    assert_eq!(group.active_child_voice_count(), 1);
}

#[test]
fn bypassed_child_is_not_started() {
    let group = group(3, 8);
    group.with_child_mut(1, |c| c.set_bypassed(true));

    let voice = group.note_on(60, 100).unwrap();
    assert_eq!(group.active_children_for_voice(voice), [SynthId(0), SynthId(2)]);
}

#[test]
fn unisono_starts_one_child_voice_per_slot() {
    let group = group(2, 16);
    group.set_unisono_voice_amount(3);

    let voice = group.note_on(60, 100).unwrap();

    assert_eq!(group.active_child_voice_count(), 6);
    for slot in 0..3 {
        assert_eq!(group.child_voices_for_slot(voice, slot), 2);
    }
    assert_eq!(group.voice_limit(), 5);
}

#[test]
fn polyphony_ceiling_drops_unisono_copies_silently() {
    let mut children = ChildList::new();
    let mut synth = osc("osc", 8);
    synth.prepare(48_000.0, BLOCK, 48);
    assert!(children.push(SynthId(0), synth).is_ok());

    let mut chains = GroupChains::default();
    chains.prepare(48_000.0, 4);

    // voice 1 × 3 copies: global slots 3, 4, 5 against a ceiling of 4
    let mut voice = GroupVoice::new(1, BLOCK, 48, 0);
    voice.add_child_synth(SynthId(0));

    let mod_gain = [1.0; BLOCK];
    let mut ctx = VoiceContext {
        children: &mut children,
        routing: Default::default(),
        unisono: UnisonoSettings {
            voices: 3,
            detune: 0.1,
            spread: 1.0,
        },
        max_polyphony: 4,
        uptime: 0,
        mod_gain_values: &mod_gain,
    };

    let started = voice.start_note(NoteEvent::new(60, 100), 0, &mut ctx, &mut chains);
    assert_eq!(started, 1);
    assert!(voice.render(&mut ctx, &mut chains, BLOCK));
}

#[test]
fn notes_render_and_release_to_silence() {
    let group = group(2, 8);
    group.note_on(69, 127);

    let (left, right) = render(&group, 4);
    assert!(energy(&left) > 0.0);
    assert!(energy(&right) > 0.0);
    assert!(left.iter().chain(right.iter()).all(|s| s.is_finite()));

    group.note_off(69);
    assert_eq!(group.voice_state(0), Some(VoiceState::Releasing));

    // 5 ms release at 48 kHz is 240 samples
    render(&group, 4);
    assert_eq!(group.active_voice_count(), 0);
    assert_eq!(group.active_child_voice_count(), 0);

    let (left, _) = render(&group, 1);
    assert!(left.iter().all(|&s| s == 0.0));
}

#[test]
fn fm_changes_the_carrier_sound() {
    let plain = group(2, 8);
    plain.set_carrier_index(Some(0));

    let fm = group(2, 8);
    fm.set_carrier_index(Some(0));
    fm.set_modulator_index(Some(1));
    fm.set_fm_enabled(true);

    plain.note_on(57, 100);
    fm.note_on(57, 100);

    let (plain_left, _) = render(&plain, 2);
    let (fm_left, _) = render(&fm, 2);

    assert!(energy(&fm_left) > 0.0);
    assert!(fm_left.iter().all(|s| s.is_finite()));
    assert_ne!(plain_left, fm_left);
}

#[test]
fn bypassed_modulator_silences_fm_voices() {
    let group = group(2, 8);
    group.set_carrier_index(Some(0));
    group.set_modulator_index(Some(1));
    group.set_fm_enabled(true);
    group.with_child_mut(1, |c| c.set_bypassed(true));

    group.note_on(60, 100);
    let (left, right) = render(&group, 2);
    assert_eq!(energy(&left) + energy(&right), 0.0);
}

#[test]
fn same_seed_renders_identically() {
    let a = group(2, 8);
    let b = group(2, 8);
    for g in [&a, &b] {
        g.set_unisono_voice_amount(4);
        g.set_unisono_detune(0.02);
        g.set_unisono_spread(0.5);
        g.note_on(48, 90);
        g.note_on(55, 90);
    }

    assert_eq!(render(&a, 3), render(&b, 3));
}

#[test]
fn spread_moves_copies_apart_in_the_stereo_field() {
    let group = group(1, 8);
    group.set_unisono_voice_amount(2);
    group.set_unisono_detune(0.05);
    group.set_unisono_spread(1.0);
    group.note_on(60, 100);

    let (left, right) = render(&group, 2);
    assert!(energy(&left) > 0.0);
    assert!(energy(&right) > 0.0);
    assert_ne!(left, right);
}

#[test]
fn removing_a_child_mid_note_keeps_the_group_playing() {
    let group = group(3, 8);
    let voice = group.note_on(60, 100).unwrap();
    render(&group, 1);

    let removed = group.remove_child(0).unwrap();
    assert_eq!(removed.active_voice_count(), 0);
    assert_eq!(group.num_children(), 2);
    assert_eq!(group.active_children_for_voice(voice), [SynthId(1), SynthId(2)]);

    let (left, _) = render(&group, 1);
    assert!(left.iter().all(|s| s.is_finite()));
}

#[test]
fn allow_bits_follow_child_removal() {
    let group = group(3, 8);
    group.allow_child(1, false);
    assert!(!group.is_child_allowed(1));

    group.remove_child(0);
    assert!(!group.is_child_allowed(0));
    assert!(group.is_child_allowed(1));

    group.set_allow_state_for_all(true);
    assert!(group.is_child_allowed(0));
}

#[test]
fn messages_are_drained_before_rendering() {
    let group = group(1, 8);
    let mut rx: VecDeque<SynthMessage> = VecDeque::from([
        SynthMessage::NoteOn { note: 60, velocity: 100 },
        SynthMessage::NoteOn { note: 64, velocity: 100 },
        SynthMessage::PitchBend { cents: 200.0 },
    ]);

    let mut left = [0.0; BLOCK];
    let mut right = [0.0; BLOCK];
    group.process_block(&mut rx, &mut left, &mut right);

    assert!(rx.is_empty());
    assert_eq!(group.active_voice_count(), 2);
    assert!(energy(&left) > 0.0);

    rx.push_back(SynthMessage::KillAllVoices);
    group.process_block(&mut rx, &mut left, &mut right);
    assert_eq!(group.active_voice_count(), 0);
}

#[test]
fn voice_stealing_takes_the_oldest_releasing_voice() {
    let group = group(1, 4);
    group.set_unisono_voice_amount(2); // two usable voices

    assert_eq!(group.note_on(60, 100), Some(0));
    assert_eq!(group.note_on(62, 100), Some(1));
    group.note_off(62);
    group.note_off(60);

    assert_eq!(group.note_on(64, 100), Some(0));
    assert_eq!(group.note_on(65, 100), Some(1));
    assert_eq!(group.note_on(67, 100), None);
}

#[test]
fn state_round_trips_through_json() {
    let source = group(2, 8);
    source.set_gain(0.5);
    source.set_balance(-20.0);
    source.set_carrier_index(Some(1));
    source.set_modulator_index(Some(0));
    source.set_fm_enabled(true);
    source.set_unisono_voice_amount(3);
    source.set_unisono_detune(0.05);
    source.set_unisono_spread(0.7);
    source.with_child_mut(0, |c| c.set_gain(0.25));

    let json = source.export_state().to_json().unwrap();

    let target = group(2, 8);
    target
        .restore_state(&saavy_group::state::StateTree::from_json(&json).unwrap())
        .unwrap();

    assert_eq!(target.gain(), 0.5);
    assert_eq!(target.balance(), -20.0);
    assert_eq!(target.fm_status().state, FmState::Working);
    assert_eq!(target.attribute(GroupAttribute::UnisonoVoiceAmount), 3.0);
    assert_eq!(target.attribute(GroupAttribute::UnisonoDetune), 0.05);
    assert_eq!(target.attribute(GroupAttribute::UnisonoSpread), 0.7);
    assert_eq!(target.with_child(0, ChildSynth::gain), Some(0.25));
}

#[test]
fn missing_attributes_take_defaults() {
    let group = group(2, 8);
    group.set_unisono_voice_amount(4);
    group.set_fm_enabled(true);

    let tree = saavy_group::state::StateTree::new("SynthGroup");
    group.restore_state(&tree).unwrap();

    for attribute in GroupAttribute::ALL {
        assert_eq!(group.attribute(attribute), attribute.default_value(), "{attribute:?}");
    }
    assert_eq!(group.fm_status().state, FmState::Deactivated);
}

#[test]
fn incompatible_child_is_surfaced_as_error() {
    let group = group(0, 8);
    let result = group.add_child(osc("small", 2), |_| false);
    let err: Error = result.unwrap_err().into();
    assert!(matches!(err, Error::IncompatibleChild(ref name) if name == "small"));
    assert_eq!(group.num_children(), 0);
}

#[derive(Default)]
struct Counter(AtomicUsize);

impl ChangeListener for Counter {
    fn change_notified(&self, _source: &str) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn structural_changes_notify_listeners() {
    let group = group(0, 8);
    let counter = Arc::new(Counter::default());
    let listener: Arc<dyn ChangeListener> = counter.clone();
    group.add_listener(&listener);

    group.add_child_with_fixup(osc("a", 8)).unwrap();
    group.add_child_with_fixup(osc("b", 8)).unwrap();
    group.set_fm_enabled(true);
    group.remove_child(0);

    assert_eq!(counter.0.load(Ordering::Relaxed), 4);
}

#[test]
fn bypass_frees_voices_and_ignores_notes() {
    let group = group(2, 4);
    group.note_on(60, 100);
    group.note_on(64, 100);

    group.set_bypassed(true);
    assert_eq!(group.note_on(67, 100), None);
    group.note_off(60);

    let (left, right) = render(&group, 1);
    assert_eq!(energy(&left) + energy(&right), 0.0);
    assert_eq!(group.active_voice_count(), 0);
    assert_eq!(group.active_child_voice_count(), 0);

    group.set_bypassed(false);
    assert_eq!(group.note_on(67, 100), Some(0));
}

#[test]
fn restoring_a_bypassed_state_frees_sounding_voices() {
    let group = group(2, 4);
    let mut tree = group.export_state();
    tree.set("Bypassed", true);

    group.note_on(60, 100);
    render(&group, 1);
    group.restore_state(&tree).unwrap();

    assert!(group.is_bypassed());
    assert_eq!(group.is_voice_killed(0), Some(true));

    render(&group, 1);
    assert_eq!(group.active_voice_count(), 0);
}

#[test]
fn peak_meter_is_cleared_every_block_for_every_child() {
    let group = group(2, 8);
    group.with_child_mut(1, |c| c.set_peak(0.7));
    group.allow_child(1, false);

    render(&group, 1);
    assert_eq!(group.child_peak(1), Some(0.0));

    group.note_on(60, 100);
    render(&group, 1);
    assert!(group.child_peak(0).is_some_and(|p| p > 0.0));
}

#[test]
fn hard_left_child_leaves_the_right_channel_silent() {
    let group = Group::new("group", config(8));
    group
        .add_child_with_fixup(osc("left", 8).with_balance(-100.0))
        .unwrap();
    group.note_on(60, 100);

    let (left, right) = render(&group, 2);
    assert!(energy(&left) > 0.0);
    assert!(right.iter().all(|&s| s == 0.0));
}

#[test]
fn muted_modulator_gain_leaves_the_carrier_unmodulated() {
    let build = |fm: bool| {
        let group = Group::new("group", config(8));
        let mut quiet = EnvelopeChain::adsr(0.001, 0.05, 0.8, 0.005);
        quiet.set_monophonic_gain(0.0);

        group.add_child_with_fixup(osc("carrier", 8)).unwrap();
        group
            .add_child_with_fixup(ChildSynth::new("modulator", OscNode::sine).with_voices(8).with_gain_chain(quiet))
            .unwrap();
        group.set_carrier_index(Some(0));
        if fm {
            group.set_modulator_index(Some(1));
            group.set_fm_enabled(true);
        }
        group
    };

    let solo = build(false);
    let fm = build(true);
    assert!(fm.fm_is_correctly_setup());

    solo.note_on(57, 100);
    fm.note_on(57, 100);

    let solo_out = render(&solo, 2);
    assert!(energy(&solo_out.0) > 0.0);
    assert_eq!(render(&fm, 2), solo_out);
}
