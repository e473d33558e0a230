//! Child synths: the sound generators a group aggregates.

use std::fmt;

use crate::{
    config::EngineConfig,
    dsp::{balance::gain_factor_for_balance, pitch::semitones_to_ratio},
    modulation::{ConstantChain, EnvelopeChain, ModulationChain},
    synth::{
        effect::{EffectChain, VoiceEffect},
        factory::VoiceFactory,
        iterator::AllowStates,
        message::{NoteEvent, SynthMessage},
        sound::SoundRange,
        voice::SynthVoice,
    },
    MAX_CHILD_SYNTHS,
};

/// Stable identity of a child synth inside its group. Indices shift when a
/// child is removed, ids never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SynthId(pub u32);

impl fmt::Display for SynthId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A polyphonic synth with a fixed voice pool.
///
/// Voices are started and stopped from outside (by the group) through
/// `free_voice`, `start_voice`, `stop_voice` and `reset_voice`. The gain chain
/// decides when a voice has finished: once it stops playing, the voice is
/// reset and its sound becomes `None`.
pub struct ChildSynth {
    name: String,
    factory: Box<dyn VoiceFactory>,
    voices: Vec<SynthVoice>,
    sounds: Vec<SoundRange>,

    gain_chain: Box<dyn ModulationChain>,
    pitch_chain: Box<dyn ModulationChain>,
    effects: EffectChain,

    gain: f32,
    balance: f32,
    bypassed: bool,
    soft_bypassed: bool,
    pitch_modulation_enabled: bool,
    pitch_bend: f32,
    on_air: bool,
    peak: f32,

    sample_rate: f32,
    block_size: usize,
    kill_fade_samples: usize,
}

impl ChildSynth {
    /// A synth with the default voice amount (`EngineConfig::max_polyphony`),
    /// one full-range sound, a default ADSR gain chain and a unity pitch chain.
    pub fn new(name: impl Into<String>, factory: impl VoiceFactory + 'static) -> Self {
        let config = EngineConfig::default();
        let mut synth = Self {
            name: name.into(),
            factory: Box::new(factory),
            voices: Vec::new(),
            sounds: vec![SoundRange::FULL],
            gain_chain: Box::new(EnvelopeChain::default()),
            pitch_chain: Box::new(ConstantChain::unity()),
            effects: EffectChain::new(),
            gain: 1.0,
            balance: 0.0,
            bypassed: false,
            soft_bypassed: false,
            pitch_modulation_enabled: false,
            pitch_bend: 1.0,
            on_air: false,
            peak: 0.0,
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            kill_fade_samples: config.kill_fade_samples(),
        };
        synth.set_num_voices(config.max_polyphony);
        synth
    }

    pub fn with_voices(mut self, num_voices: usize) -> Self {
        self.set_num_voices(num_voices);
        self
    }

    pub fn with_gain_chain(mut self, chain: impl ModulationChain + 'static) -> Self {
        self.gain_chain = Box::new(chain);
        self.gain_chain.prepare(self.sample_rate, self.voices.len());
        self
    }

    pub fn with_pitch_chain(mut self, chain: impl ModulationChain + 'static) -> Self {
        self.pitch_chain = Box::new(chain);
        self.pitch_chain.prepare(self.sample_rate, self.voices.len());
        self
    }

    /// Replace the playable sounds.
    pub fn with_sounds(mut self, sounds: impl IntoIterator<Item = SoundRange>) -> Self {
        self.sounds = sounds.into_iter().collect();
        self
    }

    pub fn with_effect(mut self, effect: impl VoiceEffect + 'static) -> Self {
        self.effects.push(Box::new(effect));
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.set_gain(gain);
        self
    }

    pub fn with_balance(mut self, balance: f32) -> Self {
        self.set_balance(balance);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.max(0.0);
    }

    pub fn balance(&self) -> f32 {
        self.balance
    }

    pub fn set_balance(&mut self, balance: f32) {
        self.balance = balance.clamp(-100.0, 100.0);
    }

    pub fn balance_factor(&self, right_channel: bool) -> f32 {
        gain_factor_for_balance(self.balance, right_channel)
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    /// Soft-bypassed synths keep their voices but are not rendered.
    pub fn is_soft_bypassed(&self) -> bool {
        self.soft_bypassed
    }

    pub fn set_soft_bypassed(&mut self, soft_bypassed: bool) {
        self.soft_bypassed = soft_bypassed;
    }

    pub fn is_pitch_modulation_enabled(&self) -> bool {
        self.pitch_modulation_enabled
    }

    pub fn enable_pitch_modulation(&mut self, enabled: bool) {
        self.pitch_modulation_enabled = enabled;
    }

    pub fn is_on_air(&self) -> bool {
        self.on_air
    }

    pub fn set_on_air(&mut self, on_air: bool) {
        self.on_air = on_air;
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }

    pub fn set_peak(&mut self, peak: f32) {
        self.peak = peak;
    }

    pub fn effects(&self) -> &EffectChain {
        &self.effects
    }

    pub fn has_effects(&self) -> bool {
        !self.effects.is_empty()
    }

    pub fn strip_effects(&mut self) {
        self.effects.clear();
    }

    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    /// Rebuild the voice pool. Every voice is recreated from the factory, so
    /// anything sounding is cut.
    pub fn set_num_voices(&mut self, num_voices: usize) {
        let num_voices = num_voices.max(1);
        self.voices = (0..num_voices)
            .map(|i| SynthVoice::new(i, self.factory.create_voice(), self.block_size, self.kill_fade_samples))
            .collect();

        self.gain_chain.prepare(self.sample_rate, num_voices);
        self.pitch_chain.prepare(self.sample_rate, num_voices);
        self.effects.prepare(self.sample_rate, num_voices);
    }

    pub fn prepare(&mut self, sample_rate: f32, block_size: usize, kill_fade_samples: usize) {
        self.sample_rate = sample_rate;
        self.block_size = block_size;
        self.kill_fade_samples = kill_fade_samples;

        for voice in &mut self.voices {
            voice.prepare(block_size, kill_fade_samples);
        }
        self.gain_chain.prepare(sample_rate, self.voices.len());
        self.pitch_chain.prepare(sample_rate, self.voices.len());
        self.effects.prepare(sample_rate, self.voices.len());
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn num_sounds(&self) -> usize {
        self.sounds.len()
    }

    pub fn sound_can_be_played(&self, sound: usize, note: u8, velocity: u8) -> bool {
        self.sounds
            .get(sound)
            .is_some_and(|range| range.applies_to(note, velocity))
    }

    /// First free voice. No stealing: a full pool yields `None`.
    pub fn free_voice(&self) -> Option<usize> {
        self.voices.iter().position(SynthVoice::is_free)
    }

    pub fn voice(&self, voice: usize) -> Option<&SynthVoice> {
        self.voices.get(voice)
    }

    pub fn voice_mut(&mut self, voice: usize) -> Option<&mut SynthVoice> {
        self.voices.get_mut(voice)
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_free()).count()
    }

    /// Start `voice` playing `sound`. `start_offset` is added to whatever
    /// offset the voice already carries.
    pub fn start_voice(
        &mut self,
        voice: usize,
        sound: usize,
        event: NoteEvent,
        uptime: u64,
        start_offset: usize,
    ) -> bool {
        let sample_rate = self.sample_rate;
        let Some(v) = self.voices.get_mut(voice) else {
            return false;
        };

        v.set_start_uptime(uptime);
        v.set_event(event);
        v.add_to_start_offset(start_offset);
        v.start(sound, sample_rate);

        self.gain_chain.start_voice(voice);
        self.pitch_chain.start_voice(voice);
        self.effects.start_voice(voice);
        true
    }

    /// Release `voice`: its gain and pitch chains stop, the voice keeps
    /// rendering until the gain chain has finished.
    pub fn stop_voice(&mut self, voice: usize) {
        let Some(v) = self.voices.get_mut(voice) else {
            return;
        };
        if v.is_free() {
            return;
        }

        self.gain_chain.stop_voice(voice);
        self.pitch_chain.stop_voice(voice);
        v.release();
    }

    pub fn reset_voice(&mut self, voice: usize) {
        let Some(v) = self.voices.get_mut(voice) else {
            return;
        };

        self.gain_chain.reset_voice(voice);
        self.pitch_chain.reset_voice(voice);
        self.effects.reset_voice(voice);
        v.reset();
    }

    pub fn reset_all_voices(&mut self) {
        for voice in 0..self.voices.len() {
            self.reset_voice(voice);
        }
    }

    pub fn kill_all_voices(&mut self) {
        for voice in &mut self.voices {
            voice.kill();
        }
    }

    /// Fill the voice's pitch buffer from the pitch chain (and pitch bend).
    ///
    /// Returns the buffer so the caller can multiply its own pitch into it,
    /// or `None` when pitch modulation is disabled (the buffer then stays at
    /// 1.0) or the voice is not playing.
    pub fn calculate_voice_pitch(&mut self, voice: usize, num_samples: usize) -> Option<&mut [f32]> {
        let v = self.voices.get_mut(voice)?;
        if v.is_free() {
            return None;
        }

        let num_samples = num_samples.min(v.capacity());
        let pitch = v.pitch_values_mut(num_samples);

        if !self.pitch_modulation_enabled {
            pitch.fill(1.0);
            return None;
        }

        self.pitch_chain.render_voice(voice, pitch);
        if self.pitch_bend != 1.0 {
            for value in pitch.iter_mut() {
                *value *= self.pitch_bend;
            }
        }
        Some(pitch)
    }

    /// Render one block of `voice` using the pitch values already in place.
    ///
    /// A voice whose gain chain has finished, or whose kill fade ran out, is
    /// reset after rendering; its output for this block stays readable.
    pub fn render_voice(&mut self, voice: usize, num_samples: usize) {
        let Some(v) = self.voices.get_mut(voice) else {
            return;
        };
        if v.is_free() {
            return;
        }

        let num_samples = num_samples.min(v.capacity());

        v.render_source(num_samples);
        self.gain_chain.render_voice(voice, v.gain_values_mut(num_samples));
        v.apply_gain(num_samples);

        if !self.effects.is_empty() {
            let (left, right) = v.output_mut(num_samples);
            self.effects.render_voice(voice, left, right);
        }

        if v.should_be_killed() {
            v.apply_kill_fade(num_samples);
        }

        let finished = !self.gain_chain.is_playing(voice) || v.kill_fade_done();
        if finished {
            self.reset_voice(voice);
        }
    }

    /// Monophonic gain values of the gain chain (used for the FM modulator).
    pub fn render_monophonic_gain(&mut self, out: &mut [f32]) {
        self.gain_chain.render_next_block(out);
    }

    /// Per-block hook, run on every child (allowed or not) before any voice
    /// renders. Clears the peak meter, which then holds this block's peak
    /// until the next call.
    pub fn pre_voice_rendering(&mut self, _num_samples: usize) {
        self.peak = 0.0;
    }

    /// Controller messages the child reacts to on its own.
    pub fn handle_message(&mut self, message: &SynthMessage) {
        if let SynthMessage::PitchBend { cents } = *message {
            self.pitch_bend = semitones_to_ratio(cents / 100.0);
        }
    }
}

impl fmt::Debug for ChildSynth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildSynth")
            .field("name", &self.name)
            .field("voices", &self.voices.len())
            .field("gain", &self.gain)
            .field("balance", &self.balance)
            .field("bypassed", &self.bypassed)
            .field("effects", &self.effects)
            .finish_non_exhaustive()
    }
}

struct ChildSlot {
    id: SynthId,
    synth: ChildSynth,
}

/// The ordered child synths of a group plus their allow bits.
///
/// Bit `i` of the allow states belongs to the child at index `i`; removing a
/// child shifts the bits of everything after it.
#[derive(Default)]
pub struct ChildList {
    slots: Vec<ChildSlot>,
    allow: AllowStates,
}

impl ChildList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append a child and allow it. Hands the synth back when the list is full.
    pub fn push(&mut self, id: SynthId, synth: ChildSynth) -> Result<usize, ChildSynth> {
        if self.slots.len() >= MAX_CHILD_SYNTHS {
            return Err(synth);
        }

        let index = self.slots.len();
        self.slots.push(ChildSlot { id, synth });
        self.allow.set(index, true);
        Ok(index)
    }

    pub fn remove(&mut self, index: usize) -> Option<(SynthId, ChildSynth)> {
        if index >= self.slots.len() {
            return None;
        }

        let slot = self.slots.remove(index);
        self.allow.remove_index(index);
        Some((slot.id, slot.synth))
    }

    pub fn get(&self, index: usize) -> Option<&ChildSynth> {
        self.slots.get(index).map(|slot| &slot.synth)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ChildSynth> {
        self.slots.get_mut(index).map(|slot| &mut slot.synth)
    }

    pub fn id_at(&self, index: usize) -> Option<SynthId> {
        self.slots.get(index).map(|slot| slot.id)
    }

    pub fn index_of(&self, id: SynthId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.id == id)
    }

    pub fn by_id(&self, id: SynthId) -> Option<&ChildSynth> {
        self.slots
            .iter()
            .find(|slot| slot.id == id)
            .map(|slot| &slot.synth)
    }

    pub fn by_id_mut(&mut self, id: SynthId) -> Option<&mut ChildSynth> {
        self.slots
            .iter_mut()
            .find(|slot| slot.id == id)
            .map(|slot| &mut slot.synth)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SynthId, &ChildSynth)> {
        self.slots.iter().map(|slot| (slot.id, &slot.synth))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SynthId, &mut ChildSynth)> {
        self.slots.iter_mut().map(|slot| (slot.id, &mut slot.synth))
    }

    pub fn allow_states(&self) -> AllowStates {
        self.allow
    }

    pub fn is_allowed(&self, index: usize) -> bool {
        self.allow.get(index)
    }

    pub fn set_allowed(&mut self, index: usize, allowed: bool) {
        self.allow.set(index, allowed);
    }

    pub fn set_all_allowed(&mut self, allowed: bool) {
        self.allow.set_range(self.slots.len(), allowed);
    }
}

impl fmt::Debug for ChildList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().map(|slot| (slot.id, slot.synth.name())))
            .finish()
    }
}
