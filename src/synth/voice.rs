use crate::{
    graph::node::{RenderCtx, VoiceSource},
    synth::message::NoteEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Free,      // Available for allocation
    Active,    // Playing, envelope in attack/decay/sustain
    Releasing, // Key released, envelope in release phase
}

/*
Kill Fade
=========

Stopping a note normally runs its release, which can take seconds. Voice
stealing and FM topology changes need the voice gone now, but cutting it
to zero mid-waveform clicks. The compromise is a short exponential fade:

    level[n] = factor^n        factor = 0.0005^(1 / fade_samples)

After `fade_samples` samples the level has dropped to 0.0005, below the
0.001 threshold at which the owner resets the voice. With the default
20 ms at 44.1 kHz that is 882 samples.
*/

/// Level under which a killed voice counts as silent.
pub const KILL_FADE_THRESHOLD: f32 = 0.001;

#[derive(Debug, Clone)]
pub struct KillFade {
    factor: f32,
    level: f32,
    active: bool,
}

impl KillFade {
    pub fn new(fade_samples: usize) -> Self {
        Self {
            factor: 0.0005_f32.powf(1.0 / fade_samples.max(1) as f32),
            level: 1.0,
            active: false,
        }
    }

    /// Begin fading. A fade already in progress keeps its level.
    pub fn start(&mut self) {
        if !self.active {
            self.active = true;
            self.level = 1.0;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_done(&self) -> bool {
        self.active && self.level < KILL_FADE_THRESHOLD
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn apply_mono(&mut self, buffer: &mut [f32]) {
        if !self.active {
            return;
        }
        for sample in buffer.iter_mut() {
            self.level *= self.factor;
            *sample *= self.level;
        }
    }

    pub fn apply_stereo(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());

        if !self.active {
            return;
        }
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            self.level *= self.factor;
            *l *= self.level;
            *r *= self.level;
        }
    }

    pub fn reset(&mut self) {
        self.active = false;
        self.level = 1.0;
    }
}

/// One voice of a child synth.
///
/// The voice owns its sound source and per-block buffers but not its
/// modulation: the gain and pitch chains belong to the child synth and are
/// addressed by `index`.
pub struct SynthVoice {
    index: usize,
    state: VoiceState,
    source: Box<dyn VoiceSource>,
    sound: Option<usize>,
    event: NoteEvent,
    start_uptime: u64,
    start_offset: usize,
    ctx: RenderCtx,

    pitch: Vec<f32>,
    gain: Vec<f32>,
    output: [Vec<f32>; 2],
    kill: KillFade,
}

impl SynthVoice {
    pub fn new(index: usize, source: Box<dyn VoiceSource>, block_size: usize, kill_fade_samples: usize) -> Self {
        Self {
            index,
            state: VoiceState::Free,
            source,
            sound: None,
            event: NoteEvent::default(),
            start_uptime: 0,
            start_offset: 0,
            ctx: RenderCtx::from_freq(44_100.0, 440.0, 0.0),
            pitch: vec![1.0; block_size],
            gain: vec![0.0; block_size],
            output: [vec![0.0; block_size], vec![0.0; block_size]],
            kill: KillFade::new(kill_fade_samples),
        }
    }

    /// Resize the block buffers. Not realtime-safe.
    pub fn prepare(&mut self, block_size: usize, kill_fade_samples: usize) {
        self.pitch.resize(block_size, 1.0);
        self.gain.resize(block_size, 0.0);
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

    /// The sound this voice plays, `None` once it has finished.
    pub fn sound(&self) -> Option<usize> {
        self.sound
    }

    pub fn event(&self) -> NoteEvent {
        self.event
    }

    pub fn start_uptime(&self) -> u64 {
        self.start_uptime
    }

    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    pub fn set_start_uptime(&mut self, uptime: u64) {
        self.start_uptime = uptime;
    }

    pub fn set_event(&mut self, event: NoteEvent) {
        self.event = event;
    }

    pub fn add_to_start_offset(&mut self, samples: usize) {
        self.start_offset += samples;
    }

    pub(crate) fn start(&mut self, sound: usize, sample_rate: f32) {
        self.state = VoiceState::Active;
        self.sound = Some(sound);
        self.kill.reset();
        self.ctx = RenderCtx::from_note(sample_rate, self.event.note, self.event.velocity as f32)
            .with_start_offset(self.start_offset);
        self.source.note_on(&self.ctx);
    }

    pub(crate) fn release(&mut self) {
        if self.state == VoiceState::Active {
            self.state = VoiceState::Releasing;
        }
    }

    pub fn kill(&mut self) {
        if !self.is_free() {
            self.kill.start();
        }
    }

    pub fn should_be_killed(&self) -> bool {
        self.kill.is_active()
    }

    pub fn kill_fade_done(&self) -> bool {
        self.kill.is_done()
    }

    pub fn reset(&mut self) {
        self.state = VoiceState::Free;
        self.sound = None;
        self.start_offset = 0;
        self.kill.reset();
        self.source.reset();
    }

    pub fn capacity(&self) -> usize {
        self.pitch.len()
    }

    /// Pitch ratios for the next block. Owners multiply their own pitch
    /// modulation into this before `render_source`.
    pub fn pitch_values_mut(&mut self, num_samples: usize) -> &mut [f32] {
        &mut self.pitch[..num_samples]
    }

    pub fn pitch_values(&self, num_samples: usize) -> &[f32] {
        &self.pitch[..num_samples]
    }

    pub(crate) fn gain_values_mut(&mut self, num_samples: usize) -> &mut [f32] {
        &mut self.gain[..num_samples]
    }

    pub fn output(&self, num_samples: usize) -> [&[f32]; 2] {
        [&self.output[0][..num_samples], &self.output[1][..num_samples]]
    }

    pub(crate) fn output_mut(&mut self, num_samples: usize) -> (&mut [f32], &mut [f32]) {
        let [left, right] = &mut self.output;
        (&mut left[..num_samples], &mut right[..num_samples])
    }

    /// Run the source into the left channel at the current pitch.
    pub(crate) fn render_source(&mut self, num_samples: usize) {
        self.source
            .render(&mut self.output[0][..num_samples], &self.pitch[..num_samples], &self.ctx);
    }

    /// Apply gain values and velocity, then copy left into right.
    pub(crate) fn apply_gain(&mut self, num_samples: usize) {
        let velocity = self.event.velocity_gain();
        let [left, right] = &mut self.output;

        for ((l, r), g) in left[..num_samples]
            .iter_mut()
            .zip(right[..num_samples].iter_mut())
            .zip(self.gain[..num_samples].iter())
        {
            *l *= g * velocity;
            *r = *l;
        }
    }

    pub(crate) fn apply_kill_fade(&mut self, num_samples: usize) {
        let [left, right] = &mut self.output;
        self.kill
            .apply_stereo(&mut left[..num_samples], &mut right[..num_samples]);
    }
}

impl std::fmt::Debug for SynthVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthVoice")
            .field("index", &self.index)
            .field("state", &self.state)
            .field("sound", &self.sound)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}
