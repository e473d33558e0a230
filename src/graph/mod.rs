//! Per-voice sound sources.
//!
//! A child synth owns one `VoiceSource` per voice and asks it for a mono block
//! at a given per-sample pitch. Everything around it (gain envelope, balance,
//! unisono, FM) happens in the synth layer.

/// Render context and the `VoiceSource` trait.
pub mod node;
/// Oscillator-backed voice source.
pub mod oscillator;

pub use node::{RenderCtx, VoiceSource};
pub use oscillator::OscNode;
