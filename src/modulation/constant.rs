use crate::modulation::ModulationChain;

/// A chain that outputs a fixed value for every started voice.
///
/// Used where nothing is modulating yet: the group pitch chain (1.0), the
/// unisono detune and spread chains (1.0 = full amount) and the default
/// pitch chain of a child synth.
#[derive(Debug, Clone)]
pub struct ConstantChain {
    value: f32,
    monophonic: f32,
    playing: Vec<bool>,
}

impl ConstantChain {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            monophonic: 1.0,
            playing: Vec::new(),
        }
    }

    /// Chain with 1.0 on both the polyphonic and monophonic side.
    pub fn unity() -> Self {
        Self::new(1.0)
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn set_value(&mut self, value: f32) {
        self.value = value;
    }

    pub fn set_monophonic_value(&mut self, value: f32) {
        self.monophonic = value;
    }
}

impl Default for ConstantChain {
    fn default() -> Self {
        Self::unity()
    }
}

impl ModulationChain for ConstantChain {
    fn prepare(&mut self, _sample_rate: f32, num_voices: usize) {
        self.playing.resize(num_voices, false);
    }

    fn start_voice(&mut self, voice: usize) {
        if let Some(playing) = self.playing.get_mut(voice) {
            *playing = true;
        }
    }

    fn stop_voice(&mut self, voice: usize) {
        self.reset_voice(voice);
    }

    fn reset_voice(&mut self, voice: usize) {
        if let Some(playing) = self.playing.get_mut(voice) {
            *playing = false;
        }
    }

    fn is_playing(&self, voice: usize) -> bool {
        self.playing.get(voice).copied().unwrap_or(false)
    }

    fn render_voice(&mut self, _voice: usize, out: &mut [f32]) {
        out.fill(self.value);
    }

    fn render_next_block(&mut self, out: &mut [f32]) {
        out.fill(self.monophonic);
    }
}
