//! Low-level DSP primitives used by the voice and group layers.
//!
//! These components are allocation-free and realtime-safe, making them safe to
//! call from inside a render callback. They stay focused on the math so the
//! synth layer can concentrate on orchestration.

/// Buffer multiplication, scalar gain and clipping.
pub mod amplify;
/// Constant-power balance (pan) law.
pub mod balance;
/// Per-unisono-voice detune and stereo spread.
pub mod detune;
/// Attack/decay/sustain/release envelope generator.
pub mod envelope;
/// Accumulating one buffer into another with gain.
pub mod mix;
/// Phase-accumulating oscillator with per-sample pitch.
pub mod oscillator;
/// Note, octave and ratio conversions.
pub mod pitch;
/// Soft saturation waveshaper.
pub mod saturation;

pub use detune::DetuneValues;
pub use envelope::EnvelopeState;
