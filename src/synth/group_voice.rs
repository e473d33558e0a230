//! One polyphonic voice of a group.

/*
Group Voice
===========

A group voice does not make sound itself. On note-on it starts voices in
its child synths, during rendering it drives and sums them, and on
note-off it releases them.

Unisono slots
-------------

With a unisono amount of N, each note is played N times. Slot i of group
voice v has the global index

    global = v × N + i

which decides its detune and spread (see `dsp::detune`). Global indices at
or above the polyphony ceiling are never started; a note then simply plays
fewer copies.

Every slot owns a ChildVoiceContainer with the handles of the child voices
started for it:

    group voice 3, N = 2
    ├── slot 0 (global 6): [sine#0 v12, saw#1 v12]
    └── slot 1 (global 7): [sine#0 v13, saw#1 v13]

Which children start
--------------------

At note-on the voice decides which children are active for this note:

    FM working        modulator and carrier
    carrier set       the carrier alone (solo)
    otherwise         every child that is not bypassed

The FM modulator is started once, before the slots, and its handle goes
into slot 0. It is rendered separately and skipped when slot 0 is mixed.

Finishing
---------

The voice resets as a whole (all child voices, all slots) when

    - its kill fade has run out,
    - the group gain chain stops playing for it, or
    - any child voice finishes on its own.
*/

use arrayvec::ArrayVec;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::trace;

use crate::{
    dsp::{
        amplify::{add_scalar, apply_gain, clip_in_place, find_maximum, magnitude, multiply_in_place, multiply_scaled_in_place},
        detune::DetuneValues,
        mix::accumulate_stereo,
    },
    modulation::{ConstantChain, EnvelopeChain, ModulationChain},
    synth::{
        child::{ChildList, ChildSynth, SynthId},
        container::{ChildVoiceContainer, ChildVoiceHandle},
        effect::EffectChain,
        fm::FmRouting,
        iterator::ChildSynthIterator,
        message::NoteEvent,
        voice::{KillFade, VoiceState},
    },
    MAX_CHILD_SYNTHS, MAX_UNISONO_VOICES,
};

/// Lower bound of an FM carrier's pitch ratio.
pub const FM_PITCH_MIN: f32 = 1e-8;
/// Upper bound of an FM carrier's pitch ratio.
pub const FM_PITCH_MAX: f32 = 1000.0;
/// Unisono copies start up to this many samples late (exclusive).
pub const MAX_START_OFFSET: usize = 441;

/// The group's own modulation and effects, indexed by group voice.
pub struct GroupChains {
    pub gain: Box<dyn ModulationChain>,
    pub pitch: Box<dyn ModulationChain>,
    pub detune: Box<dyn ModulationChain>,
    pub spread: Box<dyn ModulationChain>,
    pub effects: EffectChain,
}

impl GroupChains {
    pub fn prepare(&mut self, sample_rate: f32, num_voices: usize) {
        self.gain.prepare(sample_rate, num_voices);
        self.pitch.prepare(sample_rate, num_voices);
        self.detune.prepare(sample_rate, num_voices);
        self.spread.prepare(sample_rate, num_voices);
        self.effects.prepare(sample_rate, num_voices);
    }
}

impl Default for GroupChains {
    fn default() -> Self {
        Self {
            gain: Box::new(EnvelopeChain::default()),
            pitch: Box::new(ConstantChain::unity()),
            detune: Box::new(ConstantChain::unity()),
            spread: Box::new(ConstantChain::unity()),
            effects: EffectChain::new(),
        }
    }
}

/// Unisono attributes as read at the start of a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnisonoSettings {
    pub voices: usize,
    pub detune: f32,
    pub spread: f32,
}

impl Default for UnisonoSettings {
    fn default() -> Self {
        Self {
            voices: 1,
            detune: 0.0,
            spread: 0.0,
        }
    }
}

/// What a group voice needs from its group while starting or rendering.
pub struct VoiceContext<'a> {
    pub children: &'a mut ChildList,
    pub routing: FmRouting,
    pub unisono: UnisonoSettings,
    pub max_polyphony: usize,
    pub uptime: u64,
    /// Monophonic gain of the FM modulator, one value per sample
    pub mod_gain_values: &'a [f32],
}

/// A child synth as seen by one group voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSynthEntry {
    pub id: SynthId,
    pub active: bool,
}

pub struct GroupVoice {
    index: usize,
    state: VoiceState,
    event: NoteEvent,
    age: u64,
    uptime_delta: f64,
    use_fm: bool,
    num_unisono: usize,

    entries: ArrayVec<ChildSynthEntry, MAX_CHILD_SYNTHS>,
    containers: [ChildVoiceContainer; MAX_UNISONO_VOICES],
    modulator_voice: Option<ChildVoiceHandle>,

    detune: DetuneValues,
    detune_mod: f32,
    spread_mod: f32,

    pitch: Vec<f32>,
    gain: Vec<f32>,
    scratch: Vec<f32>,
    fm_buffer: Vec<f32>,
    output: [Vec<f32>; 2],

    kill: KillFade,
    rng: StdRng,
}

impl GroupVoice {
    pub fn new(index: usize, block_size: usize, kill_fade_samples: usize, seed: u64) -> Self {
        Self {
            index,
            state: VoiceState::Free,
            event: NoteEvent::default(),
            age: 0,
            uptime_delta: 0.0,
            use_fm: false,
            num_unisono: 1,
            entries: ArrayVec::new(),
            containers: std::array::from_fn(|_| ChildVoiceContainer::new()),
            modulator_voice: None,
            detune: DetuneValues::default(),
            detune_mod: 1.0,
            spread_mod: 1.0,
            pitch: vec![1.0; block_size],
            gain: vec![0.0; block_size],
            scratch: vec![0.0; block_size],
            fm_buffer: vec![1.0; block_size],
            output: [vec![0.0; block_size], vec![0.0; block_size]],
            kill: KillFade::new(kill_fade_samples),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Resize block buffers. Not realtime-safe.
    pub fn prepare(&mut self, block_size: usize, kill_fade_samples: usize) {
        self.pitch.resize(block_size, 1.0);
        self.gain.resize(block_size, 0.0);
        self.scratch.resize(block_size, 0.0);
        self.fm_buffer.resize(block_size, 1.0);
        for channel in &mut self.output {
            channel.resize(block_size, 0.0);
        }
        self.kill = KillFade::new(kill_fade_samples);
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_free(&self) -> bool {
        self.state == VoiceState::Free
    }

    pub fn event(&self) -> NoteEvent {
        self.event
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    /// Non-zero while the voice is scheduled for rendering.
    pub fn uptime_delta(&self) -> f64 {
        self.uptime_delta
    }

    pub fn uses_fm(&self) -> bool {
        self.use_fm
    }

    pub fn num_unisono(&self) -> usize {
        self.num_unisono
    }

    pub fn is_killed(&self) -> bool {
        self.kill.is_active()
    }

    pub fn detune_values(&self) -> DetuneValues {
        self.detune
    }

    pub fn output(&self, num_samples: usize) -> [&[f32]; 2] {
        [&self.output[0][..num_samples], &self.output[1][..num_samples]]
    }

    pub fn container(&self, slot: usize) -> Option<&ChildVoiceContainer> {
        self.containers.get(slot)
    }

    /// Children active for the current note.
    pub fn active_children(&self) -> impl Iterator<Item = SynthId> + '_ {
        self.entries.iter().filter(|e| e.active).map(|e| e.id)
    }

    /// Started child voices over all slots (the FM modulator included).
    pub fn child_voice_amount(&self) -> usize {
        self.containers.iter().map(ChildVoiceContainer::len).sum()
    }

    pub fn add_child_synth(&mut self, id: SynthId) {
        let pushed = self.entries.try_push(ChildSynthEntry { id, active: false });
        debug_assert!(pushed.is_ok(), "group voice child list is full");
    }

    /// Reset and forget every voice of `id`, then drop its entry. Must run
    /// before the child leaves the list.
    pub fn remove_child_synth(&mut self, id: SynthId, children: &mut ChildList) {
        let event_id = self.event.event_id;
        for container in &mut self.containers {
            container.retain(|handle| {
                if handle.synth != id {
                    return true;
                }
                if let Some(child) = children.by_id_mut(id) {
                    if owns(child, handle.voice, event_id) {
                        child.reset_voice(handle.voice);
                    }
                }
                false
            });
        }

        if self.modulator_voice.is_some_and(|h| h.synth == id) {
            self.modulator_voice = None;
        }
        self.entries.retain(|e| e.id != id);
    }

    /// Start a note. Returns the number of child voices started.
    pub fn start_note(
        &mut self,
        event: NoteEvent,
        age: u64,
        ctx: &mut VoiceContext<'_>,
        chains: &mut GroupChains,
    ) -> usize {
        self.state = VoiceState::Active;
        self.event = event;
        self.age = age;
        self.uptime_delta = 1.0;
        self.kill.reset();
        self.detune_mod = 1.0;
        self.spread_mod = 1.0;

        chains.gain.start_voice(self.index);
        chains.pitch.start_voice(self.index);
        chains.detune.start_voice(self.index);
        chains.spread.start_voice(self.index);
        chains.effects.start_voice(self.index);

        self.use_fm = ctx.routing.correctly_setup;
        self.handle_active_states(ctx.children, &ctx.routing);
        self.num_unisono = ctx.unisono.voices.clamp(1, MAX_UNISONO_VOICES);

        let mut started = 0;
        let modulator = if self.use_fm { ctx.routing.modulator_id() } else { None };

        if let Some(modulator) = modulator {
            let first = self.containers[0].len();
            started += self.start_child(ctx, modulator, 0);
            self.modulator_voice = self.containers[0].get(first);
        }

        let active = self.active_child_ids(ctx.children, &ctx.routing);

        for slot in 0..self.num_unisono {
            let global = self.index * self.num_unisono + slot;
            if global >= ctx.max_polyphony {
                trace!(voice = self.index, slot, global, "unisono slot beyond polyphony, not started");
                break;
            }

            for &id in &active {
                if Some(id) == modulator {
                    continue;
                }
                started += self.start_child(ctx, id, slot);
            }
        }

        trace!(voice = self.index, note = event.note, started, fm = self.use_fm, "group voice started");
        started
    }

    fn start_child(&mut self, ctx: &mut VoiceContext<'_>, id: SynthId, slot: usize) -> usize {
        let Some(child) = ctx.children.by_id_mut(id) else {
            return 0;
        };

        let randomize = self.num_unisono != 1;
        let event = self.event;
        let mut started = 0;

        for sound in 0..child.num_sounds() {
            if !child.sound_can_be_played(sound, event.note, event.velocity) {
                continue;
            }
            if self.containers[slot].is_full() {
                trace!(voice = self.index, slot, "child voice container full");
                break;
            }
            let Some(voice) = child.free_voice() else {
                continue;
            };

            let offset = if randomize {
                self.rng.gen_range(0..MAX_START_OFFSET)
            } else {
                0
            };

            child.start_voice(voice, sound, event, ctx.uptime, offset);
            self.containers[slot].push(ChildVoiceHandle { synth: id, voice });
            started += 1;
        }

        started
    }

    fn handle_active_states(&mut self, children: &ChildList, routing: &FmRouting) {
        let use_fm = self.use_fm;
        let carrier = routing.carrier_id();
        let modulator = routing.modulator_id();

        for entry in &mut self.entries {
            entry.active = if use_fm {
                Some(entry.id) == carrier || Some(entry.id) == modulator
            } else if let Some(carrier) = carrier {
                entry.id == carrier
            } else {
                children.by_id(entry.id).is_some_and(|c| !c.is_bypassed())
            };
        }
    }

    /// Children to render: the carrier alone with FM, else the active entries.
    fn active_child_ids(&self, children: &ChildList, routing: &FmRouting) -> ArrayVec<SynthId, MAX_CHILD_SYNTHS> {
        if self.use_fm {
            ChildSynthIterator::carrier_only(children, routing.fm_carrier_index())
                .filter_map(|index| children.id_at(index))
                .collect()
        } else {
            self.active_children().collect()
        }
    }

    /// Render one block into the voice's output. Returns false when the
    /// voice is free and produced nothing.
    pub fn render(&mut self, ctx: &mut VoiceContext<'_>, chains: &mut GroupChains, num_samples: usize) -> bool {
        if self.is_free() {
            return false;
        }

        let n = num_samples.min(self.pitch.len());
        if n == 0 {
            return false;
        }

        for channel in &mut self.output {
            channel[..n].fill(0.0);
        }

        chains.pitch.render_voice(self.index, &mut self.pitch[..n]);

        if self.num_unisono > 1 {
            chains.detune.render_voice(self.index, &mut self.scratch[..n]);
            self.detune_mod = self.scratch[0];
            chains.spread.render_voice(self.index, &mut self.scratch[..n]);
            self.spread_mod = self.scratch[0];
        }

        let child_finished = if self.use_fm {
            self.render_with_fm(ctx, n)
        } else {
            self.render_without_fm(ctx, n)
        };

        let [left, right] = &mut self.output;
        chains.effects.render_voice(self.index, &mut left[..n], &mut right[..n]);

        chains.gain.render_voice(self.index, &mut self.gain[..n]);
        multiply_in_place(&mut left[..n], &self.gain[..n]);
        multiply_in_place(&mut right[..n], &self.gain[..n]);
        self.kill.apply_stereo(&mut left[..n], &mut right[..n]);

        if child_finished {
            trace!(voice = self.index, "child voice finished, resetting group voice");
            self.reset(ctx.children, chains);
        }

        true
    }

    fn render_without_fm(&mut self, ctx: &mut VoiceContext<'_>, n: usize) -> bool {
        let active = self.active_child_ids(ctx.children, &ctx.routing);
        let num_unisono = self.num_unisono;
        let mut finished = false;

        let [left, right] = &mut self.output;

        for slot in 0..num_unisono {
            let global = self.index * num_unisono + slot;
            if global >= ctx.max_polyphony {
                break;
            }

            self.detune = DetuneValues::compute(
                num_unisono,
                global,
                ctx.unisono.detune,
                ctx.unisono.spread,
                self.detune_mod,
                self.spread_mod,
            );

            for &id in &active {
                let Some(child) = ctx.children.by_id_mut(id) else {
                    continue;
                };
                if child.is_soft_bypassed() {
                    continue;
                }

                let gain = child.gain();
                let gain_left = self.detune.gain_factor_for(false) * gain * child.balance_factor(false);
                let gain_right = self.detune.gain_factor_for(true) * gain * child.balance_factor(true);

                for handle in self.containers[slot].iter().filter(|h| h.synth == id) {
                    finished |= render_child_voice(
                        child,
                        handle.voice,
                        self.event.event_id,
                        &self.pitch[..n],
                        self.detune.multiplier,
                        None,
                        [&mut left[..n], &mut right[..n]],
                        (gain_left, gain_right),
                    );
                }
            }
        }

        finished
    }

    fn render_with_fm(&mut self, ctx: &mut VoiceContext<'_>, n: usize) -> bool {
        let (Some(mod_handle), Some(carrier_id)) = (self.modulator_voice, ctx.routing.carrier_id()) else {
            return false;
        };

        {
            let Some(modulator) = ctx.children.by_id_mut(mod_handle.synth) else {
                return false;
            };
            if modulator.is_bypassed() || !owns(modulator, mod_handle.voice, self.event.event_id) {
                return false;
            }

            if let Some(pitch) = modulator.calculate_voice_pitch(mod_handle.voice, n) {
                let m = pitch.len();
                multiply_in_place(pitch, &self.pitch[..m]);
            }
            modulator.render_voice(mod_handle.voice, n);

            let fm = &mut self.fm_buffer[..n];
            fm.fill(0.0);
            if let Some(voice) = modulator.voice(mod_handle.voice) {
                let m = n.min(voice.capacity());
                fm[..m].copy_from_slice(voice.output(m)[0]);
            }

            multiply_in_place(fm, &ctx.mod_gain_values[..n]);
            apply_gain(fm, modulator.gain());

            let peak = find_maximum(fm);
            modulator.set_peak(peak);

            add_scalar(fm, 1.0);
        }

        let num_unisono = self.num_unisono;
        let mut finished = false;
        let [left, right] = &mut self.output;

        for slot in 0..num_unisono {
            let global = self.index * num_unisono + slot;
            if global >= ctx.max_polyphony {
                break;
            }

            self.detune = DetuneValues::compute(
                num_unisono,
                global,
                ctx.unisono.detune,
                ctx.unisono.spread,
                self.detune_mod,
                self.spread_mod,
            );

            let Some(carrier) = ctx.children.by_id_mut(carrier_id) else {
                break;
            };
            if carrier.is_soft_bypassed() {
                break;
            }

            let gain = carrier.gain();
            let gain_left = self.detune.gain_factor_for(false) * gain * carrier.balance_factor(false);
            let gain_right = self.detune.gain_factor_for(true) * gain * carrier.balance_factor(true);

            for handle in self.containers[slot].iter() {
                if handle.synth == mod_handle.synth || handle.synth != carrier_id {
                    continue;
                }

                finished |= render_child_voice(
                    carrier,
                    handle.voice,
                    self.event.event_id,
                    &self.pitch[..n],
                    self.detune.multiplier,
                    Some(&self.fm_buffer[..n]),
                    [&mut left[..n], &mut right[..n]],
                    (gain_left, gain_right),
                );
            }
        }

        finished
    }

    /// Release every started child voice and the group chains.
    pub fn stop_note(&mut self, children: &mut ChildList, chains: &mut GroupChains) {
        let event_id = self.event.event_id;

        if let Some(handle) = self.modulator_voice {
            if let Some(child) = children.by_id_mut(handle.synth) {
                if owns(child, handle.voice, event_id) {
                    child.stop_voice(handle.voice);
                }
            }
        }

        for container in &self.containers[..self.num_unisono] {
            for handle in container.iter() {
                if Some(handle) == self.modulator_voice {
                    continue;
                }
                if let Some(child) = children.by_id_mut(handle.synth) {
                    if owns(child, handle.voice, event_id) {
                        child.stop_voice(handle.voice);
                    }
                }
            }
        }

        chains.gain.stop_voice(self.index);
        chains.pitch.stop_voice(self.index);
        chains.detune.stop_voice(self.index);
        chains.spread.stop_voice(self.index);

        if self.state == VoiceState::Active {
            self.state = VoiceState::Releasing;
        }
    }

    /// Reset the voice once its kill fade is done or its gain chain stopped.
    pub fn check_release(&mut self, children: &mut ChildList, chains: &mut GroupChains) -> bool {
        if self.is_free() {
            return false;
        }

        let killed = self.kill.is_done();
        if killed || !chains.gain.is_playing(self.index) {
            trace!(voice = self.index, killed, "group voice released");
            self.reset(children, chains);
            return true;
        }

        false
    }

    /// Start the kill fade. The voice resets at the first release check
    /// after the fade is done.
    pub fn kill(&mut self) {
        if !self.is_free() {
            self.kill.start();
        }
    }

    /// Hard reset of this voice and every child voice it started. Safe to
    /// call on a free voice.
    pub fn reset(&mut self, children: &mut ChildList, chains: &mut GroupChains) {
        let event_id = self.event.event_id;
        self.modulator_voice = None;

        // The modulator handle also sits in slot 0.
        for container in &mut self.containers {
            for handle in container.iter() {
                if let Some(child) = children.by_id_mut(handle.synth) {
                    if owns(child, handle.voice, event_id) {
                        child.reset_voice(handle.voice);
                    }
                }
            }
            container.clear();
        }

        chains.gain.reset_voice(self.index);
        chains.pitch.reset_voice(self.index);
        chains.detune.reset_voice(self.index);
        chains.spread.reset_voice(self.index);
        chains.effects.reset_voice(self.index);

        self.state = VoiceState::Free;
        self.uptime_delta = 0.0;
        self.kill.reset();
    }
}

/// A handle stays valid while the child voice still plays the event that
/// started it. Voices reset and restarted elsewhere are left alone.
fn owns(child: &ChildSynth, voice: usize, event_id: u32) -> bool {
    child
        .voice(voice)
        .is_some_and(|v| !v.is_free() && v.event().event_id == event_id)
}

/// Pitch, render and mix one child voice. Returns true when the child voice
/// finished during this block.
#[allow(clippy::too_many_arguments)]
fn render_child_voice(
    child: &mut ChildSynth,
    voice: usize,
    event_id: u32,
    group_pitch: &[f32],
    detune_multiplier: f32,
    fm: Option<&[f32]>,
    bus: [&mut [f32]; 2],
    (gain_left, gain_right): (f32, f32),
) -> bool {
    let n = group_pitch.len();

    if !owns(child, voice, event_id) {
        return false;
    }

    if let Some(pitch) = child.calculate_voice_pitch(voice, n) {
        let m = pitch.len();
        multiply_scaled_in_place(pitch, &group_pitch[..m], detune_multiplier);

        if let Some(fm) = fm {
            multiply_in_place(pitch, &fm[..m]);
            clip_in_place(pitch, FM_PITCH_MIN, FM_PITCH_MAX);
        }
    }

    child.render_voice(voice, n);

    let Some(rendered) = child.voice(voice) else {
        return false;
    };
    let m = n.min(rendered.capacity());
    let [bus_left, bus_right] = bus;
    let output = rendered.output(m);

    accumulate_stereo([&mut bus_left[..m], &mut bus_right[..m]], output, gain_left, gain_right);

    let peak = magnitude(output[0]) * gain_left.max(gain_right);
    let finished = rendered.sound().is_none();

    child.set_peak(child.peak().max(peak));
    finished
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{graph::OscNode, synth::fm::FmConfig};

    const BLOCK: usize = 64;

    fn child(name: &str, voices: usize) -> ChildSynth {
        let mut synth = ChildSynth::new(name, OscNode::sine)
            .with_voices(voices)
            .with_gain_chain(EnvelopeChain::adsr(0.001, 0.01, 1.0, 0.01));
        synth.enable_pitch_modulation(true);
        synth.prepare(44_100.0, BLOCK, 32);
        synth
    }

    fn children(count: u32) -> ChildList {
        let mut list = ChildList::new();
        for i in 0..count {
            assert!(list.push(SynthId(i), child(&format!("osc{i}"), 16)).is_ok());
        }
        list
    }

    fn voice_for(index: usize, list: &ChildList) -> GroupVoice {
        let mut voice = GroupVoice::new(index, BLOCK, 32, 7);
        for (id, _) in list.iter() {
            voice.add_child_synth(id);
        }
        voice
    }

    fn chains() -> GroupChains {
        let mut chains = GroupChains::default();
        chains.prepare(44_100.0, 8);
        chains
    }

    fn context<'a>(
        children: &'a mut ChildList,
        routing: FmRouting,
        voices: usize,
        max_polyphony: usize,
        mod_gain: &'a [f32],
    ) -> VoiceContext<'a> {
        VoiceContext {
            children,
            routing,
            unisono: UnisonoSettings {
                voices,
                detune: 0.1,
                spread: 0.5,
            },
            max_polyphony,
            uptime: 0,
            mod_gain_values: mod_gain,
        }
    }

    fn working_fm(list: &ChildList, carrier: usize, modulator: usize) -> FmRouting {
        let config = FmConfig {
            enabled: true,
            carrier_index: Some(carrier),
            modulator_index: Some(modulator),
        };
        FmRouting::resolve(&config, list, &config.evaluate(list))
    }

    #[test]
    fn all_unbypassed_children_start_without_fm() {
        let mut list = children(3);
        list.get_mut(1).unwrap().set_bypassed(true);
        let mut voice = voice_for(0, &list);
        let mut chains = chains();
        let mod_gain = [1.0; BLOCK];

        let mut ctx = context(&mut list, FmRouting::default(), 1, 8, &mod_gain);
        let started = voice.start_note(NoteEvent::new(60, 100), 0, &mut ctx, &mut chains);

        assert_eq!(started, 2);
        assert!(!voice.uses_fm());
        assert_eq!(voice.active_children().collect::<Vec<_>>(), [SynthId(0), SynthId(2)]);
    }

    #[test]
    fn polyphony_ceiling_truncates_unisono_slots() {
        let mut list = children(1);
        let mut voice = voice_for(1, &list);
        let mut chains = chains();
        let mod_gain = [1.0; BLOCK];

        // global indices 3, 4, 5 against a ceiling of 4: only slot 0 fits
        let mut ctx = context(&mut list, FmRouting::default(), 3, 4, &mod_gain);
        let started = voice.start_note(NoteEvent::new(60, 100), 0, &mut ctx, &mut chains);

        assert_eq!(started, 1);
        assert_eq!(voice.child_voice_amount(), 1);
        assert!(voice.container(1).is_some_and(ChildVoiceContainer::is_empty));
    }

    #[test]
    fn unisono_starts_one_voice_per_slot_with_offsets() {
        let mut list = children(1);
        let mut voice = voice_for(0, &list);
        let mut chains = chains();
        let mod_gain = [1.0; BLOCK];

        let mut ctx = context(&mut list, FmRouting::default(), 4, 64, &mod_gain);
        assert_eq!(voice.start_note(NoteEvent::new(48, 90), 0, &mut ctx, &mut chains), 4);

        let synth = list.get(0).unwrap();
        for slot in 0..4 {
            let handle = voice.container(slot).and_then(|c| c.get(0)).unwrap();
            let started = synth.voice(handle.voice).unwrap();
            assert!(started.start_offset() < MAX_START_OFFSET);
            assert_eq!(started.event().note, 48);
        }
    }

    #[test]
    fn fm_starts_modulator_then_carrier() {
        let mut list = children(3);
        let routing = working_fm(&list, 2, 0);
        let mut voice = voice_for(0, &list);
        let mut chains = chains();
        let mod_gain = [1.0; BLOCK];

        let mut ctx = context(&mut list, routing, 1, 8, &mod_gain);
        let started = voice.start_note(NoteEvent::new(60, 100), 0, &mut ctx, &mut chains);

        assert_eq!(started, 2);
        assert!(voice.uses_fm());

        let slot: Vec<_> = voice.container(0).unwrap().iter().map(|h| h.synth).collect();
        assert_eq!(slot, [SynthId(0), SynthId(2)]);

        let mut active: Vec<_> = voice.active_children().collect();
        active.sort();
        assert_eq!(active, [SynthId(0), SynthId(2)]);
    }

    #[test]
    fn modulator_is_not_mixed_into_the_output() {
        let mut list = children(2);
        list.get_mut(1).unwrap().set_gain(0.0);
        let routing = working_fm(&list, 1, 0);
        let mut voice = voice_for(0, &list);
        let mut chains = chains();
        let mod_gain = [1.0; BLOCK];

        let mut ctx = context(&mut list, routing, 1, 8, &mod_gain);
        voice.start_note(NoteEvent::new(69, 127), 0, &mut ctx, &mut chains);
        assert!(voice.render(&mut ctx, &mut chains, BLOCK));

        let [left, right] = voice.output(BLOCK);
        assert!(left.iter().chain(right.iter()).all(|&s| s == 0.0));
    }

    #[test]
    fn solo_carrier_plays_alone() {
        let mut list = children(3);
        let config = FmConfig {
            enabled: false,
            carrier_index: Some(1),
            modulator_index: None,
        };
        let routing = FmRouting::resolve(&config, &list, &config.evaluate(&list));
        let mut voice = voice_for(0, &list);
        let mut chains = chains();
        let mod_gain = [1.0; BLOCK];

        let mut ctx = context(&mut list, routing, 1, 8, &mod_gain);
        voice.start_note(NoteEvent::new(60, 100), 0, &mut ctx, &mut chains);

        assert!(!voice.uses_fm());
        assert_eq!(voice.active_children().collect::<Vec<_>>(), [SynthId(1)]);
    }

    #[test]
    fn reset_frees_children_and_is_idempotent() {
        let mut list = children(2);
        let mut voice = voice_for(0, &list);
        let mut chains = chains();
        let mod_gain = [1.0; BLOCK];

        {
            let mut ctx = context(&mut list, FmRouting::default(), 2, 8, &mod_gain);
            voice.start_note(NoteEvent::new(60, 100), 0, &mut ctx, &mut chains);
        }
        assert_eq!(list.get(0).unwrap().active_voice_count(), 2);

        voice.reset(&mut list, &mut chains);
        voice.reset(&mut list, &mut chains);

        assert!(voice.is_free());
        assert_eq!(voice.child_voice_amount(), 0);
        assert_eq!(list.get(0).unwrap().active_voice_count(), 0);
        assert_eq!(list.get(1).unwrap().active_voice_count(), 0);
    }

    #[test]
    fn removing_a_child_drops_its_handles() {
        let mut list = children(2);
        let mut voice = voice_for(0, &list);
        let mut chains = chains();
        let mod_gain = [1.0; BLOCK];

        {
            let mut ctx = context(&mut list, FmRouting::default(), 1, 8, &mod_gain);
            voice.start_note(NoteEvent::new(60, 100), 0, &mut ctx, &mut chains);
        }

        voice.remove_child_synth(SynthId(0), &mut list);

        assert_eq!(voice.child_voice_amount(), 1);
        assert_eq!(list.get(0).unwrap().active_voice_count(), 0);
        assert_eq!(voice.active_children().collect::<Vec<_>>(), [SynthId(1)]);
    }

    #[test]
    fn released_voice_resets_when_gain_chain_stops() {
        let mut list = children(1);
        let mut voice = voice_for(0, &list);
        let mut chains = GroupChains {
            gain: Box::new(EnvelopeChain::adsr(0.001, 0.001, 1.0, 0.001)),
            ..GroupChains::default()
        };
        chains.prepare(44_100.0, 8);
        let mod_gain = [1.0; BLOCK];

        let mut ctx = context(&mut list, FmRouting::default(), 1, 8, &mod_gain);
        voice.start_note(NoteEvent::new(60, 100), 0, &mut ctx, &mut chains);
        voice.render(&mut ctx, &mut chains, BLOCK);
        assert!(!voice.check_release(ctx.children, &mut chains));

        voice.stop_note(ctx.children, &mut chains);
        assert_eq!(voice.state(), VoiceState::Releasing);

        // 44-sample release inside a 64-sample block
        voice.render(&mut ctx, &mut chains, BLOCK);
        assert!(voice.check_release(ctx.children, &mut chains));
        assert!(voice.is_free());
    }

    #[test]
    fn killed_voice_fades_then_resets() {
        let mut list = children(1);
        let mut voice = voice_for(0, &list);
        let mut chains = chains();
        let mod_gain = [1.0; BLOCK];

        let mut ctx = context(&mut list, FmRouting::default(), 1, 8, &mod_gain);
        voice.start_note(NoteEvent::new(60, 100), 0, &mut ctx, &mut chains);
        voice.kill();
        assert!(voice.is_killed());

        // 32-sample fade, 64-sample block
        voice.render(&mut ctx, &mut chains, BLOCK);
        assert!(voice.check_release(ctx.children, &mut chains));
        assert!(voice.is_free());
    }
}
