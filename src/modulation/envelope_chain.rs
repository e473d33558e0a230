use crate::{dsp::envelope::Envelope, modulation::ModulationChain};

/// Gain chain with one ADSR envelope per voice slot.
///
/// `is_playing` follows the envelope: a stopped voice keeps playing through
/// its release and turns idle when the level reaches zero.
#[derive(Debug, Clone)]
pub struct EnvelopeChain {
    template: Envelope,
    voices: Vec<Envelope>,
    monophonic_gain: f32,
}

impl EnvelopeChain {
    pub fn new(template: Envelope) -> Self {
        Self {
            template,
            voices: Vec::new(),
            monophonic_gain: 1.0,
        }
    }

    pub fn adsr(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self::new(Envelope::adsr(attack, decay, sustain, release))
    }

    /// Scales the monophonic output (a global level control).
    pub fn set_monophonic_gain(&mut self, gain: f32) {
        self.monophonic_gain = gain;
    }

    pub fn level(&self, voice: usize) -> f32 {
        self.voices.get(voice).map_or(0.0, Envelope::level)
    }
}

impl Default for EnvelopeChain {
    fn default() -> Self {
        Self::new(Envelope::default())
    }
}

impl ModulationChain for EnvelopeChain {
    fn prepare(&mut self, sample_rate: f32, num_voices: usize) {
        self.template.set_sample_rate(sample_rate);
        self.voices = vec![self.template.clone(); num_voices];
    }

    fn start_voice(&mut self, voice: usize) {
        if let Some(env) = self.voices.get_mut(voice) {
            env.note_on();
        }
    }

    fn stop_voice(&mut self, voice: usize) {
        if let Some(env) = self.voices.get_mut(voice) {
            env.note_off();
        }
    }

    fn reset_voice(&mut self, voice: usize) {
        if let Some(env) = self.voices.get_mut(voice) {
            env.reset();
        }
    }

    fn is_playing(&self, voice: usize) -> bool {
        self.voices.get(voice).is_some_and(Envelope::is_active)
    }

    fn render_voice(&mut self, voice: usize, out: &mut [f32]) {
        match self.voices.get_mut(voice) {
            Some(env) => env.render(out),
            None => out.fill(0.0),
        }
    }

    fn render_next_block(&mut self, out: &mut [f32]) {
        out.fill(self.monophonic_gain);
    }
}
