//! The synth group: child synths played as one instrument.

use std::sync::{
    atomic::{AtomicU32, AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    config::EngineConfig,
    dsp::{amplify::apply_gain, balance::stereo_gains, mix::sum_in_place},
    modulation::ModulationChain,
    notify::{ChangeBroadcaster, ChangeListener},
    state::StateTree,
    synth::{
        child::{ChildList, ChildSynth, SynthId},
        effect::VoiceEffect,
        fm::{FmConfig, FmRouting, FmState, FmStatus},
        group_voice::{GroupChains, GroupVoice, UnisonoSettings, VoiceContext},
        iterator::ChildSynthIterator,
        message::{MessageReceiver, NoteEvent, SynthMessage},
        voice::VoiceState,
    },
    Error, Result, MAX_BLOCK_SIZE, MAX_CHILD_SYNTHS,
};

pub const GROUP_RECORD: &str = "SynthGroup";
pub const CHILD_RECORD: &str = "ChildSynth";

/// Why a child synth does not fit into a group as it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incompatibility {
    /// Group children are rendered voice by voice and cannot carry effects.
    HasEffects { count: usize },
    /// Every child needs one voice per group voice.
    VoiceAmount { expected: usize, found: usize },
}

impl std::fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Incompatibility::HasEffects { count } => {
                write!(f, "the synth has {count} effect(s), which will be removed")
            }
            Incompatibility::VoiceAmount { expected, found } => {
                write!(f, "the synth has {found} voices, the group needs {expected}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Declined(Incompatibility),
    TooManyChildren,
}

/// A child that was not added. The synth is handed back untouched.
#[derive(Debug, Error)]
#[error("child synth `{}` was not added: {:?}", .synth.name(), .reason)]
pub struct RejectedChild {
    pub synth: ChildSynth,
    pub reason: RejectReason,
}

impl From<RejectedChild> for Error {
    fn from(rejected: RejectedChild) -> Self {
        match rejected.reason {
            RejectReason::TooManyChildren => Error::TooManyChildren { max: MAX_CHILD_SYNTHS },
            RejectReason::Declined(_) => Error::IncompatibleChild(rejected.synth.name().to_string()),
        }
    }
}

/// Group attributes addressable by index, in persisted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAttribute {
    EnableFm,
    CarrierIndex,
    ModulatorIndex,
    UnisonoVoiceAmount,
    UnisonoDetune,
    UnisonoSpread,
}

impl GroupAttribute {
    pub const ALL: [GroupAttribute; 6] = [
        GroupAttribute::EnableFm,
        GroupAttribute::CarrierIndex,
        GroupAttribute::ModulatorIndex,
        GroupAttribute::UnisonoVoiceAmount,
        GroupAttribute::UnisonoDetune,
        GroupAttribute::UnisonoSpread,
    ];

    /// Property name in persisted records.
    pub fn name(self) -> &'static str {
        match self {
            GroupAttribute::EnableFm => "EnableFM",
            GroupAttribute::CarrierIndex => "CarrierIndex",
            GroupAttribute::ModulatorIndex => "ModulatorIndex",
            GroupAttribute::UnisonoVoiceAmount => "UnisonoVoiceAmount",
            GroupAttribute::UnisonoDetune => "UnisonoDetune",
            GroupAttribute::UnisonoSpread => "UnisonoSpread",
        }
    }

    pub fn default_value(self) -> f32 {
        match self {
            GroupAttribute::EnableFm => 0.0,
            GroupAttribute::CarrierIndex | GroupAttribute::ModulatorIndex => -1.0,
            GroupAttribute::UnisonoVoiceAmount => 1.0,
            GroupAttribute::UnisonoDetune | GroupAttribute::UnisonoSpread => 0.0,
        }
    }
}

fn index_to_value(index: Option<usize>) -> f32 {
    index.map_or(-1.0, |i| i as f32)
}

fn value_to_index(value: f32) -> Option<usize> {
    if value.is_finite() && value >= 0.0 {
        Some(value as usize)
    } else {
        None
    }
}

/// Unisono attributes. Written under the group lock, read without it by the
/// render path; a value one block old is fine.
#[derive(Debug)]
struct UnisonoParams {
    voices: AtomicUsize,
    detune: AtomicU32,
    spread: AtomicU32,
    voice_limit: AtomicUsize,
}

impl UnisonoParams {
    fn new(max_polyphony: usize) -> Self {
        Self {
            voices: AtomicUsize::new(1),
            detune: AtomicU32::new(0.0f32.to_bits()),
            spread: AtomicU32::new(0.0f32.to_bits()),
            voice_limit: AtomicUsize::new(max_polyphony),
        }
    }

    fn settings(&self) -> UnisonoSettings {
        UnisonoSettings {
            voices: self.voices.load(Ordering::Relaxed),
            detune: f32::from_bits(self.detune.load(Ordering::Relaxed)),
            spread: f32::from_bits(self.spread.load(Ordering::Relaxed)),
        }
    }

    fn voice_limit(&self) -> usize {
        self.voice_limit.load(Ordering::Relaxed)
    }
}

struct GroupCore {
    children: ChildList,
    voices: Vec<GroupVoice>,
    chains: GroupChains,

    fm: FmConfig,
    fm_status: FmStatus,
    routing: FmRouting,

    gain: f32,
    balance: f32,
    bypassed: bool,

    sample_rate: f32,
    block_size: usize,
    kill_fade_samples: usize,

    uptime: u64,
    next_age: u64,
    next_id: u32,
    next_event_id: u32,

    mod_gain_values: Vec<f32>,
}

impl GroupCore {
    /// Re-evaluate the FM setup. Every sounding voice is killed first.
    fn check_fm_state(&mut self) {
        for voice in &mut self.voices {
            voice.kill();
        }

        let status = self.fm.evaluate(&self.children);
        self.routing = FmRouting::resolve(&self.fm, &self.children, &status);

        if status.state == FmState::Working {
            if let Some(modulator) = self.routing.modulator_id().and_then(|id| self.children.by_id_mut(id)) {
                modulator.reset_all_voices();
                modulator.enable_pitch_modulation(true);
            }
            if let Some(carrier) = self.routing.carrier_id().and_then(|id| self.children.by_id_mut(id)) {
                carrier.enable_pitch_modulation(true);
            }
        }

        if status != self.fm_status {
            debug!(state = ?status.state, message = %status.message, "fm state changed");
        }
        self.fm_status = status;
    }

    fn note_on(&mut self, note: u8, velocity: u8, unisono: UnisonoSettings, limit: usize, max_polyphony: usize) -> Option<usize> {
        if self.bypassed {
            trace!(note, "group bypassed, note ignored");
            return None;
        }

        let limit = limit.clamp(1, self.voices.len());

        let index = match self.voices[..limit].iter().position(GroupVoice::is_free) {
            Some(index) => index,
            None => {
                let index = self.voices[..limit]
                    .iter()
                    .filter(|v| v.state() == VoiceState::Releasing)
                    .min_by_key(|v| v.age())
                    .map(GroupVoice::index)?;
                trace!(voice = index, "stealing releasing voice");
                self.voices[index].reset(&mut self.children, &mut self.chains);
                index
            }
        };

        self.next_event_id = self.next_event_id.wrapping_add(1).max(1);
        let event = NoteEvent {
            note,
            velocity,
            event_id: self.next_event_id,
            timestamp: self.uptime,
        };

        let age = self.next_age;
        self.next_age += 1;

        let mut ctx = VoiceContext {
            children: &mut self.children,
            routing: self.routing,
            unisono,
            max_polyphony,
            uptime: self.uptime,
            mod_gain_values: &self.mod_gain_values,
        };
        self.voices[index].start_note(event, age, &mut ctx, &mut self.chains);

        Some(index)
    }

    fn note_off(&mut self, note: u8) {
        for voice in &mut self.voices {
            if voice.state() == VoiceState::Active && voice.event().note == note {
                voice.stop_note(&mut self.children, &mut self.chains);
            }
        }
    }

    fn all_notes_off(&mut self) {
        for voice in &mut self.voices {
            if voice.state() == VoiceState::Active {
                voice.stop_note(&mut self.children, &mut self.chains);
            }
        }
    }

    fn kill_all_voices(&mut self) {
        for voice in &mut self.voices {
            voice.kill();
        }
    }

    /// Turning bypass on kills every busy voice; the next render resets them.
    fn set_bypassed(&mut self, bypassed: bool) {
        if bypassed && !self.bypassed {
            self.kill_all_voices();
        }
        self.bypassed = bypassed;
    }

    fn handle_message(&mut self, message: SynthMessage, unisono: UnisonoSettings, limit: usize, max_polyphony: usize) {
        match message {
            SynthMessage::NoteOn { note, velocity: 0 } => self.note_off(note),
            SynthMessage::NoteOn { note, velocity } => {
                if self.note_on(note, velocity, unisono, limit, max_polyphony).is_none() {
                    trace!(note, "no group voice available, note dropped");
                }
            }
            SynthMessage::NoteOff { note, .. } => self.note_off(note),
            SynthMessage::AllNotesOff => self.all_notes_off(),
            SynthMessage::KillAllVoices => self.kill_all_voices(),
            SynthMessage::PitchBend { .. } => {}
        }

        for index in ChildSynthIterator::allowed(&self.children) {
            if let Some(child) = self.children.get_mut(index) {
                child.handle_message(&message);
            }
        }
    }

    fn render_chunk(&mut self, left: &mut [f32], right: &mut [f32], unisono: UnisonoSettings, max_polyphony: usize) {
        let n = left.len();

        if self.bypassed {
            // Nothing is heard, so killed voices skip their fade.
            for voice in self.voices.iter_mut().filter(|v| !v.is_free()) {
                voice.reset(&mut self.children, &mut self.chains);
            }
            self.uptime += n as u64;
            return;
        }

        let mod_gain = &mut self.mod_gain_values[..n];
        match self.routing.modulator_id().and_then(|id| self.children.by_id_mut(id)) {
            Some(modulator) if self.routing.correctly_setup => modulator.render_monophonic_gain(mod_gain),
            _ => mod_gain.fill(1.0),
        }

        // the only per-block child hook
        for index in ChildSynthIterator::all(&self.children) {
            if let Some(child) = self.children.get_mut(index) {
                child.pre_voice_rendering(n);
            }
        }

        let mut ctx = VoiceContext {
            children: &mut self.children,
            routing: self.routing,
            unisono,
            max_polyphony,
            uptime: self.uptime,
            mod_gain_values: &self.mod_gain_values[..n],
        };

        for voice in &mut self.voices {
            if voice.render(&mut ctx, &mut self.chains, n) {
                let [voice_left, voice_right] = voice.output(n);
                sum_in_place(left, voice_left);
                sum_in_place(right, voice_right);
            }
            voice.check_release(ctx.children, &mut self.chains);
        }

        let (gain_left, gain_right) = stereo_gains(self.balance);
        apply_gain(left, self.gain * gain_left);
        apply_gain(right, self.gain * gain_right);

        self.uptime += n as u64;
    }
}

/// A polyphonic instrument made of child synths.
///
/// Every group voice starts one voice in each active child (times the
/// unisono amount) and mixes them. Two children can be paired for FM, with
/// the modulator's output driving the carrier's pitch.
///
/// All state sits behind one lock. Structural edits, attribute changes and
/// rendering take it in turn, so a child added or removed from another thread
/// takes effect between blocks. Change notifications go out after the lock is
/// released.
pub struct Group {
    name: String,
    config: EngineConfig,
    params: UnisonoParams,
    core: Mutex<GroupCore>,
    broadcaster: ChangeBroadcaster,
}

impl Group {
    pub fn new(name: impl Into<String>, config: EngineConfig) -> Self {
        let config = config.sanitized();
        let kill_fade_samples = config.kill_fade_samples();

        let voices = (0..config.max_polyphony)
            .map(|i| {
                let seed = config.seed.map_or(i as u64, |s| s.wrapping_add(i as u64));
                GroupVoice::new(i, config.block_size, kill_fade_samples, seed)
            })
            .collect();

        let mut chains = GroupChains::default();
        chains.prepare(config.sample_rate, config.max_polyphony);

        let core = GroupCore {
            children: ChildList::new(),
            voices,
            chains,
            fm: FmConfig::default(),
            fm_status: FmStatus::default(),
            routing: FmRouting::default(),
            gain: 1.0,
            balance: 0.0,
            bypassed: false,
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            kill_fade_samples,
            uptime: 0,
            next_age: 0,
            next_id: 0,
            next_event_id: 0,
            mod_gain_values: vec![1.0; config.block_size],
        };

        Self {
            name: name.into(),
            params: UnisonoParams::new(config.max_polyphony),
            config,
            core: Mutex::new(core),
            broadcaster: ChangeBroadcaster::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn add_listener(&self, listener: &Arc<dyn ChangeListener>) {
        self.broadcaster.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ChangeListener>) {
        self.broadcaster.remove_listener(listener);
    }

    fn notify(&self) {
        self.broadcaster.send_change(&self.name);
    }

    // ---- structure ---------------------------------------------------------

    /// Problems that would keep `synth` from joining this group.
    pub fn incompatibilities(&self, synth: &ChildSynth) -> Vec<Incompatibility> {
        let mut found = Vec::new();
        if synth.has_effects() {
            found.push(Incompatibility::HasEffects {
                count: synth.effects().len(),
            });
        }
        if synth.num_voices() != self.config.max_polyphony {
            found.push(Incompatibility::VoiceAmount {
                expected: self.config.max_polyphony,
                found: synth.num_voices(),
            });
        }
        found
    }

    /// Add a child synth.
    ///
    /// `confirm` is asked once per incompatibility; accepting applies the
    /// fix-up (effects are stripped, the voice pool is resized). Declining any
    /// of them returns the synth unchanged and leaves the group as it was.
    pub fn add_child(
        &self,
        mut synth: ChildSynth,
        mut confirm: impl FnMut(&Incompatibility) -> bool,
    ) -> std::result::Result<SynthId, RejectedChild> {
        let problems = self.incompatibilities(&synth);
        if let Some(declined) = problems.iter().find(|&p| !confirm(p)) {
            warn!(child = synth.name(), reason = %declined, "child synth declined");
            return Err(RejectedChild {
                synth,
                reason: RejectReason::Declined(*declined),
            });
        }

        for problem in &problems {
            match problem {
                Incompatibility::HasEffects { .. } => synth.strip_effects(),
                Incompatibility::VoiceAmount { expected, .. } => synth.set_num_voices(*expected),
            }
        }

        let id = {
            let mut core = self.core.lock();

            if core.children.len() >= MAX_CHILD_SYNTHS {
                warn!(child = synth.name(), max = MAX_CHILD_SYNTHS, "group is full");
                return Err(RejectedChild {
                    synth,
                    reason: RejectReason::TooManyChildren,
                });
            }

            synth.enable_pitch_modulation(true);
            synth.prepare(core.sample_rate, core.block_size, core.kill_fade_samples);
            synth.set_on_air(true);

            let id = SynthId(core.next_id);
            let name = synth.name().to_string();

            if let Err(synth) = core.children.push(id, synth) {
                return Err(RejectedChild {
                    synth,
                    reason: RejectReason::TooManyChildren,
                });
            }
            core.next_id += 1;

            for voice in &mut core.voices {
                voice.add_child_synth(id);
            }
            core.check_fm_state();

            debug!(group = %self.name, child = %name, %id, "child synth added");
            id
        };

        self.notify();
        Ok(id)
    }

    /// Add a child, accepting every fix-up.
    pub fn add_child_with_fixup(&self, synth: ChildSynth) -> Result<SynthId> {
        Ok(self.add_child(synth, |_| true)?)
    }

    /// Remove the child at `index` and hand it back. Its voices are reset.
    pub fn remove_child(&self, index: usize) -> Option<ChildSynth> {
        let removed = {
            let mut core = self.core.lock();
            let core = &mut *core;

            let id = core.children.id_at(index)?;
            for voice in &mut core.voices {
                voice.remove_child_synth(id, &mut core.children);
            }

            let (_, mut synth) = core.children.remove(index)?;
            synth.reset_all_voices();
            synth.set_on_air(false);
            core.check_fm_state();

            debug!(group = %self.name, child = synth.name(), %id, "child synth removed");
            synth
        };

        self.notify();
        Some(removed)
    }

    pub fn remove_child_by_id(&self, id: SynthId) -> Result<ChildSynth> {
        let index = self.core.lock().children.index_of(id).ok_or(Error::UnknownChild(id.0))?;
        self.remove_child(index).ok_or(Error::UnknownChild(id.0))
    }

    pub fn num_children(&self) -> usize {
        self.core.lock().children.len()
    }

    pub fn child_ids(&self) -> Vec<SynthId> {
        self.core.lock().children.iter().map(|(id, _)| id).collect()
    }

    pub fn child_index(&self, id: SynthId) -> Option<usize> {
        self.core.lock().children.index_of(id)
    }

    /// Run `f` on the child at `index` under the group lock.
    pub fn with_child<R>(&self, index: usize, f: impl FnOnce(&ChildSynth) -> R) -> Option<R> {
        self.core.lock().children.get(index).map(f)
    }

    /// Mutable access to a child under the group lock. Changes that affect
    /// the FM setup (bypass of the carrier, for instance) only apply from the
    /// next FM check.
    pub fn with_child_mut<R>(&self, index: usize, f: impl FnOnce(&mut ChildSynth) -> R) -> Option<R> {
        self.core.lock().children.get_mut(index).map(f)
    }

    pub fn child_peak(&self, index: usize) -> Option<f32> {
        self.with_child(index, ChildSynth::peak)
    }

    pub fn allow_child(&self, index: usize, allowed: bool) {
        self.core.lock().children.set_allowed(index, allowed);
    }

    pub fn set_allow_state_for_all(&self, allowed: bool) {
        self.core.lock().children.set_all_allowed(allowed);
    }

    pub fn is_child_allowed(&self, index: usize) -> bool {
        self.core.lock().children.is_allowed(index)
    }

    // ---- attributes --------------------------------------------------------

    pub fn attribute(&self, attribute: GroupAttribute) -> f32 {
        let unisono = self.params.settings();
        match attribute {
            GroupAttribute::UnisonoVoiceAmount => unisono.voices as f32,
            GroupAttribute::UnisonoDetune => unisono.detune,
            GroupAttribute::UnisonoSpread => unisono.spread,
            fm => {
                let core = self.core.lock();
                match fm {
                    GroupAttribute::EnableFm => f32::from(u8::from(core.fm.enabled)),
                    GroupAttribute::CarrierIndex => index_to_value(core.fm.carrier_index),
                    _ => index_to_value(core.fm.modulator_index),
                }
            }
        }
    }

    pub fn set_attribute(&self, attribute: GroupAttribute, value: f32) {
        match attribute {
            GroupAttribute::EnableFm => self.set_fm_enabled(value > 0.5),
            GroupAttribute::CarrierIndex => self.set_carrier_index(value_to_index(value)),
            GroupAttribute::ModulatorIndex => self.set_modulator_index(value_to_index(value)),
            GroupAttribute::UnisonoVoiceAmount => self.set_unisono_voice_amount(value.max(1.0) as usize),
            GroupAttribute::UnisonoDetune => self.set_unisono_detune(value),
            GroupAttribute::UnisonoSpread => self.set_unisono_spread(value),
        }
    }

    /// Clamped to `[1, max_unisono_voices]`. Also lowers the number of group
    /// voices notes may use to `max_polyphony / amount`.
    pub fn set_unisono_voice_amount(&self, amount: usize) {
        let amount = amount.clamp(1, self.config.max_unisono_voices);
        let limit = (self.config.max_polyphony / amount).max(1);

        let _core = self.core.lock();
        self.params.voices.store(amount, Ordering::Relaxed);
        self.params.voice_limit.store(limit, Ordering::Relaxed);
        trace!(group = %self.name, amount, limit, "unisono voice amount");
    }

    /// Detune of the outermost unisono copies, in octaves.
    pub fn set_unisono_detune(&self, octaves: f32) {
        let octaves = if octaves.is_finite() { octaves.max(0.0) } else { 0.0 };
        let _core = self.core.lock();
        self.params.detune.store(octaves.to_bits(), Ordering::Relaxed);
    }

    /// Stereo spread of the unisono copies, 0.0 to 1.0.
    pub fn set_unisono_spread(&self, spread: f32) {
        let spread = if spread.is_finite() { spread.clamp(0.0, 1.0) } else { 0.0 };
        let _core = self.core.lock();
        self.params.spread.store(spread.to_bits(), Ordering::Relaxed);
    }

    pub fn unisono(&self) -> UnisonoSettings {
        self.params.settings()
    }

    /// Number of group voices note-on may allocate from.
    pub fn voice_limit(&self) -> usize {
        self.params.voice_limit()
    }

    fn update_fm(&self, edit: impl FnOnce(&mut FmConfig)) {
        {
            let mut core = self.core.lock();
            edit(&mut core.fm);
            core.check_fm_state();
        }
        self.notify();
    }

    pub fn set_fm_enabled(&self, enabled: bool) {
        self.update_fm(|fm| fm.enabled = enabled);
    }

    /// `None` clears the carrier. With FM off, a carrier plays solo.
    pub fn set_carrier_index(&self, index: Option<usize>) {
        self.update_fm(|fm| fm.carrier_index = index);
    }

    pub fn set_modulator_index(&self, index: Option<usize>) {
        self.update_fm(|fm| fm.modulator_index = index);
    }

    pub fn fm_config(&self) -> FmConfig {
        self.core.lock().fm
    }

    pub fn fm_status(&self) -> FmStatus {
        self.core.lock().fm_status.clone()
    }

    pub fn fm_is_correctly_setup(&self) -> bool {
        self.core.lock().routing.correctly_setup
    }

    pub fn gain(&self) -> f32 {
        self.core.lock().gain
    }

    pub fn set_gain(&self, gain: f32) {
        self.core.lock().gain = gain.max(0.0);
    }

    pub fn balance(&self) -> f32 {
        self.core.lock().balance
    }

    pub fn set_balance(&self, balance: f32) {
        self.core.lock().balance = balance.clamp(-100.0, 100.0);
    }

    pub fn is_bypassed(&self) -> bool {
        self.core.lock().bypassed
    }

    /// A bypassed group renders silence and ignores note-ons. Voices that
    /// were sounding are freed on the next render.
    pub fn set_bypassed(&self, bypassed: bool) {
        self.core.lock().set_bypassed(bypassed);
    }

    // ---- group chains ------------------------------------------------------

    fn replace_chain(&self, select: impl FnOnce(&mut GroupChains) -> &mut Box<dyn ModulationChain>, chain: Box<dyn ModulationChain>) {
        let mut core = self.core.lock();
        let core = &mut *core;
        for voice in &mut core.voices {
            voice.reset(&mut core.children, &mut core.chains);
        }
        let slot = select(&mut core.chains);
        *slot = chain;
        slot.prepare(core.sample_rate, core.voices.len());
    }

    pub fn set_gain_chain(&self, chain: impl ModulationChain + 'static) {
        self.replace_chain(|c| &mut c.gain, Box::new(chain));
    }

    pub fn set_pitch_chain(&self, chain: impl ModulationChain + 'static) {
        self.replace_chain(|c| &mut c.pitch, Box::new(chain));
    }

    pub fn set_detune_chain(&self, chain: impl ModulationChain + 'static) {
        self.replace_chain(|c| &mut c.detune, Box::new(chain));
    }

    pub fn set_spread_chain(&self, chain: impl ModulationChain + 'static) {
        self.replace_chain(|c| &mut c.spread, Box::new(chain));
    }

    /// Append an effect to the group's per-voice effect chain.
    pub fn add_effect(&self, effect: impl VoiceEffect + 'static) {
        let mut core = self.core.lock();
        let (sample_rate, num_voices) = (core.sample_rate, core.voices.len());
        let mut effect: Box<dyn VoiceEffect> = Box::new(effect);
        effect.prepare(sample_rate, num_voices);
        core.chains.effects.push(effect);
    }

    // ---- playback ----------------------------------------------------------

    /// Size every buffer for `block_size` and prepare all children. Not
    /// realtime-safe.
    pub fn prepare_to_play(&self, sample_rate: f32, block_size: usize) {
        let sample_rate = if sample_rate.is_finite() && sample_rate > 0.0 {
            sample_rate
        } else {
            self.config.sample_rate
        };
        let block_size = block_size.clamp(1, MAX_BLOCK_SIZE);
        let kill_fade_samples = EngineConfig {
            sample_rate,
            ..self.config.clone()
        }
        .kill_fade_samples();

        let mut core = self.core.lock();
        let core = &mut *core;
        core.sample_rate = sample_rate;
        core.block_size = block_size;
        core.kill_fade_samples = kill_fade_samples;

        for index in ChildSynthIterator::all(&core.children) {
            if let Some(child) = core.children.get_mut(index) {
                child.prepare(sample_rate, block_size, kill_fade_samples);
            }
        }
        for voice in &mut core.voices {
            voice.reset(&mut core.children, &mut core.chains);
            voice.prepare(block_size, kill_fade_samples);
        }
        core.chains.prepare(sample_rate, core.voices.len());
        core.mod_gain_values.resize(block_size, 1.0);

        debug!(group = %self.name, sample_rate, block_size, "prepared");
    }

    /// Start a note. Returns the group voice used, or `None` when every
    /// usable voice is busy and none is releasing.
    pub fn note_on(&self, note: u8, velocity: u8) -> Option<usize> {
        let unisono = self.params.settings();
        let limit = self.params.voice_limit();
        let mut core = self.core.lock();
        if velocity == 0 {
            core.note_off(note);
            return None;
        }
        core.note_on(note, velocity, unisono, limit, self.config.max_polyphony)
    }

    pub fn note_off(&self, note: u8) {
        self.core.lock().note_off(note);
    }

    pub fn all_notes_off(&self) {
        self.core.lock().all_notes_off();
    }

    /// Fade out every busy voice.
    pub fn kill_all_voices(&self) {
        self.core.lock().kill_all_voices();
    }

    pub fn handle_message(&self, message: SynthMessage) {
        let unisono = self.params.settings();
        let limit = self.params.voice_limit();
        self.core
            .lock()
            .handle_message(message, unisono, limit, self.config.max_polyphony);
    }

    /// Drain pending messages, then render into `left`/`right`.
    pub fn process_block(&self, rx: &mut impl MessageReceiver, left: &mut [f32], right: &mut [f32]) {
        let unisono = self.params.settings();
        let limit = self.params.voice_limit();
        let max_polyphony = self.config.max_polyphony;

        let mut core = self.core.lock();
        while let Some(message) = rx.pop() {
            core.handle_message(message, unisono, limit, max_polyphony);
        }
        Self::render_locked(&mut core, left, right, unisono, max_polyphony);
    }

    /// Render without taking messages. Output is overwritten.
    pub fn render_block(&self, left: &mut [f32], right: &mut [f32]) {
        let unisono = self.params.settings();
        let mut core = self.core.lock();
        Self::render_locked(&mut core, left, right, unisono, self.config.max_polyphony);
    }

    fn render_locked(core: &mut GroupCore, left: &mut [f32], right: &mut [f32], unisono: UnisonoSettings, max_polyphony: usize) {
        debug_assert_eq!(left.len(), right.len());
        let len = left.len().min(right.len());
        left.fill(0.0);
        right.fill(0.0);

        let block_size = core.block_size;
        for (l, r) in left[..len].chunks_mut(block_size).zip(right[..len].chunks_mut(block_size)) {
            core.render_chunk(l, r, unisono, max_polyphony);
        }
    }

    // ---- introspection -----------------------------------------------------

    pub fn num_voices(&self) -> usize {
        self.config.max_polyphony
    }

    pub fn active_voice_count(&self) -> usize {
        self.core.lock().voices.iter().filter(|v| !v.is_free()).count()
    }

    /// Started child voices over all busy group voices.
    pub fn active_child_voice_count(&self) -> usize {
        self.core
            .lock()
            .voices
            .iter()
            .filter(|v| !v.is_free())
            .map(GroupVoice::child_voice_amount)
            .sum()
    }

    pub fn voice_state(&self, voice: usize) -> Option<VoiceState> {
        self.core.lock().voices.get(voice).map(GroupVoice::state)
    }

    pub fn voice_uses_fm(&self, voice: usize) -> Option<bool> {
        self.core.lock().voices.get(voice).map(GroupVoice::uses_fm)
    }

    pub fn is_voice_killed(&self, voice: usize) -> Option<bool> {
        self.core.lock().voices.get(voice).map(GroupVoice::is_killed)
    }

    pub fn active_children_for_voice(&self, voice: usize) -> Vec<SynthId> {
        self.core
            .lock()
            .voices
            .get(voice)
            .map(|v| v.active_children().collect())
            .unwrap_or_default()
    }

    pub fn child_voices_for_slot(&self, voice: usize, slot: usize) -> usize {
        self.core
            .lock()
            .voices
            .get(voice)
            .and_then(|v| v.container(slot))
            .map_or(0, |c| c.len())
    }

    // ---- persistence -------------------------------------------------------

    pub fn export_state(&self) -> StateTree {
        let unisono = self.params.settings();
        let core = self.core.lock();

        let mut tree = StateTree::new(GROUP_RECORD)
            .with("ID", self.name.as_str())
            .with("Gain", core.gain)
            .with("Balance", core.balance)
            .with("Bypassed", core.bypassed)
            .with(GroupAttribute::EnableFm.name(), i64::from(core.fm.enabled))
            .with(GroupAttribute::CarrierIndex.name(), index_to_value(core.fm.carrier_index) as i64)
            .with(GroupAttribute::ModulatorIndex.name(), index_to_value(core.fm.modulator_index) as i64)
            .with(GroupAttribute::UnisonoVoiceAmount.name(), unisono.voices)
            .with(GroupAttribute::UnisonoDetune.name(), unisono.detune)
            .with(GroupAttribute::UnisonoSpread.name(), unisono.spread);

        for (_, child) in core.children.iter() {
            tree.add_child(
                StateTree::new(CHILD_RECORD)
                    .with("ID", child.name())
                    .with("Gain", child.gain())
                    .with("Balance", child.balance())
                    .with("Bypassed", child.is_bypassed()),
            );
        }

        tree
    }

    /// Apply a record made by `export_state`. Missing attributes take their
    /// defaults; child records are matched by name, unknown ones are skipped.
    pub fn restore_state(&self, tree: &StateTree) -> Result<()> {
        tree.expect_type(GROUP_RECORD)?;

        let value = |attribute: GroupAttribute| tree.get_f32_or(attribute.name(), attribute.default_value());

        self.set_unisono_voice_amount(value(GroupAttribute::UnisonoVoiceAmount).max(1.0) as usize);
        self.set_unisono_detune(value(GroupAttribute::UnisonoDetune));
        self.set_unisono_spread(value(GroupAttribute::UnisonoSpread));

        {
            let mut core = self.core.lock();
            core.gain = tree.get_f32_or("Gain", 1.0).max(0.0);
            core.balance = tree.get_f32_or("Balance", 0.0).clamp(-100.0, 100.0);
            core.set_bypassed(tree.get_i64_or("Bypassed", 0) != 0);

            core.fm = FmConfig {
                enabled: value(GroupAttribute::EnableFm) > 0.5,
                carrier_index: value_to_index(value(GroupAttribute::CarrierIndex)),
                modulator_index: value_to_index(value(GroupAttribute::ModulatorIndex)),
            };

            for record in tree.children_of_type(CHILD_RECORD) {
                let Some(name) = record.get("ID").and_then(|v| v.as_str()) else {
                    continue;
                };
                let Some((_, child)) = core.children.iter_mut().find(|(_, c)| c.name() == name) else {
                    trace!(child = name, "no child synth for record");
                    continue;
                };
                child.set_gain(record.get_f32_or("Gain", 1.0));
                child.set_balance(record.get_f32_or("Balance", 0.0));
                child.set_bypassed(record.get_i64_or("Bypassed", 0) != 0);
            }

            core.check_fm_state();
        }

        debug!(group = %self.name, "state restored");
        self.notify();
        Ok(())
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.lock();
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("children", &core.children)
            .field("fm", &core.fm_status)
            .field("unisono", &self.params.settings())
            .finish()
    }
}
