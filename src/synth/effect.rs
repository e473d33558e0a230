//! Polyphonic effects, rendered once per voice before the voice is summed.

use crate::dsp::saturation::saturate_buffer;

pub trait VoiceEffect: Send {
    fn name(&self) -> &str;

    fn prepare(&mut self, _sample_rate: f32, _num_voices: usize) {}

    fn start_voice(&mut self, _voice: usize) {}

    fn reset_voice(&mut self, _voice: usize) {}

    fn render_voice(&mut self, voice: usize, left: &mut [f32], right: &mut [f32]);
}

/// Ordered list of voice effects.
#[derive(Default)]
pub struct EffectChain {
    effects: Vec<Box<dyn VoiceEffect>>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Box<dyn VoiceEffect>) {
        self.effects.push(effect);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.effects.iter().map(|e| e.name())
    }

    pub fn prepare(&mut self, sample_rate: f32, num_voices: usize) {
        for effect in &mut self.effects {
            effect.prepare(sample_rate, num_voices);
        }
    }

    pub fn start_voice(&mut self, voice: usize) {
        for effect in &mut self.effects {
            effect.start_voice(voice);
        }
    }

    pub fn reset_voice(&mut self, voice: usize) {
        for effect in &mut self.effects {
            effect.reset_voice(voice);
        }
    }

    pub fn render_voice(&mut self, voice: usize, left: &mut [f32], right: &mut [f32]) {
        for effect in &mut self.effects {
            effect.render_voice(voice, left, right);
        }
    }
}

impl std::fmt::Debug for EffectChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Soft-clipping waveshaper, applied to both channels.
#[derive(Debug, Clone)]
pub struct Saturator {
    drive: f32,
    mix: f32,
}

impl Saturator {
    pub fn new(drive: f32, mix: f32) -> Self {
        Self {
            drive: drive.max(0.0),
            mix: mix.clamp(0.0, 1.0),
        }
    }
}

impl VoiceEffect for Saturator {
    fn name(&self) -> &str {
        "Saturator"
    }

    fn render_voice(&mut self, _voice: usize, left: &mut [f32], right: &mut [f32]) {
        saturate_buffer(left, self.drive, self.mix);
        saturate_buffer(right, self.drive, self.mix);
    }
}
