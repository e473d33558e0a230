use crate::dsp::oscillator::{Oscillator, Waveform};
use crate::dsp::pitch::semitones_to_ratio;
use crate::graph::node::{RenderCtx, VoiceSource};

/*
Oscillator Voice Source
=======================

The simplest thing a child synth can play: one oscillator following the note.

  Sine      fundamental only. The usual FM carrier and modulator.
  Saw       every harmonic at 1/n. Bright, the classic unisono "supersaw".
  Square    odd harmonics at 1/n. Hollow.
  Triangle  odd harmonics at 1/n². Soft.

Pitch arrives two ways:

  ctx.frequency   the note, fixed for the life of the voice
  pitch[]         a per-sample ratio carrying every modulation

so the rendered frequency at sample i is

    frequency × detune_ratio × pitch[i]

`with_frequency` pins the base frequency (drums, fixed-ratio FM
modulators). `with_detune` adds a static offset in cents.

start_offset
------------

Unisono copies are started with a random offset of up to 441 samples so
they do not begin phase-locked. An oscillator turns that into a starting
phase: offset × frequency / sample_rate cycles into the waveform.
*/

pub struct OscNode {
    osc: Oscillator,
    /// Fixed frequency (Hz). If Some, ignores ctx.frequency.
    base_frequency: Option<f32>,
    /// Static detune in cents. 100 cents = 1 semitone.
    detune_cents: f32,
}

impl OscNode {
    fn new(waveform: Waveform) -> Self {
        Self {
            osc: Oscillator::new(waveform),
            base_frequency: None,
            detune_cents: 0.0,
        }
    }

    pub fn sine() -> Self {
        Self::new(Waveform::Sine)
    }

    pub fn sawtooth() -> Self {
        Self::new(Waveform::Saw)
    }

    pub fn square() -> Self {
        Self::new(Waveform::Square)
    }

    pub fn triangle() -> Self {
        Self::new(Waveform::Triangle)
    }

    pub fn with_waveform(waveform: Waveform) -> Self {
        Self::new(waveform)
    }

    pub fn with_frequency(mut self, freq: f32) -> Self {
        self.base_frequency = Some(freq);
        self
    }

    pub fn with_detune(mut self, cents: f32) -> Self {
        self.detune_cents = cents;
        self
    }

    pub fn waveform(&self) -> Waveform {
        self.osc.waveform()
    }

    fn frequency(&self, ctx: &RenderCtx) -> f32 {
        let base = self.base_frequency.unwrap_or(ctx.frequency);
        if self.detune_cents != 0.0 {
            base * semitones_to_ratio(self.detune_cents / 100.0)
        } else {
            base
        }
    }
}

impl VoiceSource for OscNode {
    fn render(&mut self, out: &mut [f32], pitch: &[f32], ctx: &RenderCtx) {
        let frequency = self.frequency(ctx);
        self.osc.render(out, pitch, frequency, ctx.sample_rate);
    }

    fn note_on(&mut self, ctx: &RenderCtx) {
        let cycles = ctx.start_offset as f32 * self.frequency(ctx) / ctx.sample_rate;
        self.osc.set_phase(cycles);
    }

    fn reset(&mut self) {
        self.osc.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    #[test]
    fn sine_follows_the_note() {
        let sample_rate = 48_000.0;
        let ctx = RenderCtx::from_note(sample_rate, 69, 100.0);
        let mut node = OscNode::sine();
        node.note_on(&ctx);

        let mut buffer = vec![0.0f32; 128];
        let pitch = vec![1.0f32; 128];
        node.render(&mut buffer, &pitch, &ctx);

        let sample_index = 12;
        let expected = (TAU * ctx.frequency * sample_index as f32 / sample_rate).sin();
        assert!((buffer[sample_index] - expected).abs() < 1e-4);
    }

    #[test]
    fn fixed_frequency_ignores_note() {
        let ctx = RenderCtx::from_note(48_000.0, 30, 100.0);
        let node = OscNode::sawtooth().with_frequency(200.0).with_detune(1200.0);
        assert!((node.frequency(&ctx) - 400.0).abs() < 1e-3);
    }

    #[test]
    fn start_offset_shifts_phase() {
        let ctx = RenderCtx::from_freq(1_000.0, 250.0, 100.0).with_start_offset(1);
        let mut node = OscNode::sine();
        node.note_on(&ctx);

        let mut buffer = [0.0f32; 1];
        node.render(&mut buffer, &[1.0], &ctx);
        assert!((buffer[0] - 1.0).abs() < 1e-5);
    }
}
