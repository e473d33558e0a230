use crate::dsp::pitch::midi_note_to_freq;

/// Context passed to voice sources when a note starts and on every block.
///
/// - sample_rate: Audio sample rate (e.g., 48000.0)
/// - frequency: Pitch of the note before any modulation (Hz)
/// - velocity: Intensity (0.0-127.0, MIDI-style)
/// - start_offset: Samples the voice should act as if it had already played
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderCtx {
    pub sample_rate: f32,
    pub frequency: f32,
    pub velocity: f32,
    pub start_offset: usize,
}

impl RenderCtx {
    /// Create context from MIDI note (keyboard/sequencer use case)
    pub fn from_note(sample_rate: f32, note: u8, velocity: f32) -> Self {
        Self {
            sample_rate,
            frequency: midi_note_to_freq(note),
            velocity,
            start_offset: 0,
        }
    }

    /// Create context from direct frequency
    pub fn from_freq(sample_rate: f32, frequency: f32, velocity: f32) -> Self {
        Self {
            sample_rate,
            frequency,
            velocity,
            start_offset: 0,
        }
    }

    pub fn with_start_offset(mut self, samples: usize) -> Self {
        self.start_offset = samples;
        self
    }
}

/// Mono signal generator for one child voice.
///
/// `pitch` holds one frequency ratio per output sample (1.0 = the note's own
/// pitch). It already contains the child's pitch modulation, the group pitch,
/// the unisono detune and, for an FM carrier, the modulator signal.
pub trait VoiceSource: Send {
    fn render(&mut self, out: &mut [f32], pitch: &[f32], ctx: &RenderCtx);

    /// Triggered when the owning voice starts
    fn note_on(&mut self, _ctx: &RenderCtx) {}

    /// Return to the silent initial state
    fn reset(&mut self) {}
}

impl VoiceSource for Box<dyn VoiceSource> {
    fn render(&mut self, out: &mut [f32], pitch: &[f32], ctx: &RenderCtx) {
        (**self).render(out, pitch, ctx)
    }

    fn note_on(&mut self, ctx: &RenderCtx) {
        (**self).note_on(ctx)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}
