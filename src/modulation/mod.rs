//! Gain and pitch modulation chains.
//!
//! A chain produces two kinds of values per block:
//!
//! - polyphonic: one buffer per voice slot (`render_voice`). These follow the
//!   note: envelopes, velocity, key tracking.
//! - monophonic: one buffer shared by every voice (`render_next_block`).
//!   Global LFOs and macro controls live here.
//!
//! The group and its child synths only need the two-value interface below;
//! they never look inside a chain.

mod constant;
mod envelope_chain;

pub use constant::ConstantChain;
pub use envelope_chain::EnvelopeChain;

pub trait ModulationChain: Send {
    /// Size per-voice state. Called outside the render path.
    fn prepare(&mut self, sample_rate: f32, num_voices: usize);

    fn start_voice(&mut self, voice: usize);

    /// Begin the release of `voice`. The voice keeps playing until
    /// `is_playing` turns false.
    fn stop_voice(&mut self, voice: usize);

    fn reset_voice(&mut self, voice: usize);

    fn is_playing(&self, voice: usize) -> bool;

    /// Polyphonic values of `voice` for the next `out.len()` samples.
    fn render_voice(&mut self, voice: usize, out: &mut [f32]);

    /// Monophonic values for the next `out.len()` samples.
    fn render_next_block(&mut self, out: &mut [f32]) {
        out.fill(1.0);
    }
}

impl ModulationChain for Box<dyn ModulationChain> {
    fn prepare(&mut self, sample_rate: f32, num_voices: usize) {
        (**self).prepare(sample_rate, num_voices)
    }

    fn start_voice(&mut self, voice: usize) {
        (**self).start_voice(voice)
    }

    fn stop_voice(&mut self, voice: usize) {
        (**self).stop_voice(voice)
    }

    fn reset_voice(&mut self, voice: usize) {
        (**self).reset_voice(voice)
    }

    fn is_playing(&self, voice: usize) -> bool {
        (**self).is_playing(voice)
    }

    fn render_voice(&mut self, voice: usize, out: &mut [f32]) {
        (**self).render_voice(voice, out)
    }

    fn render_next_block(&mut self, out: &mut [f32]) {
        (**self).render_next_block(out)
    }
}
