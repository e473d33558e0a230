//! Phase-accumulating oscillator core.
//!
//! The phase lives in [0, 1). Each sample advances it by
//! `frequency × pitch_ratio / sample_rate`, where `pitch_ratio` comes from a
//! per-sample buffer. That buffer is how pitch modulation, unisono detune and
//! FM reach the oscillator: they all multiply into it before rendering.

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform {
    Sine,
    Saw,
    Square,
    Triangle,
}

#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    phase: f32,
}

impl Oscillator {
    pub fn new(waveform: Waveform) -> Self {
        Self { waveform, phase: 0.0 }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Start from an arbitrary phase (wrapped into [0, 1)).
    pub fn set_phase(&mut self, phase: f32) {
        self.phase = phase.rem_euclid(1.0);
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Fill `out` with the waveform at `frequency` Hz, scaled per sample by `pitch`.
    pub fn render(&mut self, out: &mut [f32], pitch: &[f32], frequency: f32, sample_rate: f32) {
        debug_assert_eq!(out.len(), pitch.len());

        let base_increment = frequency / sample_rate;

        for (sample, &ratio) in out.iter_mut().zip(pitch.iter()) {
            *sample = self.value_at(self.phase);
            self.phase = (self.phase + base_increment * ratio).rem_euclid(1.0);
        }
    }

    #[inline]
    fn value_at(&self, phase: f32) -> f32 {
        match self.waveform {
            Waveform::Sine => (phase * TAU).sin(),
            Waveform::Saw => 2.0 * phase - 1.0,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_starts_at_zero_and_peaks_at_quarter() {
        let mut osc = Oscillator::new(Waveform::Sine);
        let mut out = [0.0; 5];
        osc.render(&mut out, &[1.0; 5], 1.0, 4.0);

        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
        assert!((out[3] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn pitch_ratio_scales_phase_increment() {
        let mut plain = Oscillator::new(Waveform::Saw);
        let mut doubled = Oscillator::new(Waveform::Saw);
        let mut a = [0.0; 16];
        let mut b = [0.0; 16];

        plain.render(&mut a, &[1.0; 16], 100.0, 8_000.0);
        doubled.render(&mut b, &[2.0; 16], 50.0, 8_000.0);

        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn waveforms_stay_in_range() {
        for waveform in [Waveform::Sine, Waveform::Saw, Waveform::Square, Waveform::Triangle] {
            let mut osc = Oscillator::new(waveform);
            let mut out = [0.0; 256];
            osc.render(&mut out, &[1.3; 256], 441.0, 44_100.0);
            assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)), "{waveform:?}");
        }
    }

    #[test]
    fn set_phase_wraps() {
        let mut osc = Oscillator::new(Waveform::Saw);
        osc.set_phase(1.25);
        assert!((osc.phase() - 0.25).abs() < 1e-6);
    }
}
