//! Pitch conversions.
//!
//! Everything above the oscillator speaks in frequency ratios (1.0 = no
//! change). These helpers convert between ratios, octaves, semitones and
//! MIDI notes.

/// Convert MIDI note number to frequency in Hz.
/// A4 = 440 Hz = MIDI note 69
#[inline]
pub fn midi_note_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

/// Convert an offset in octaves to a frequency ratio: 2^octaves.
#[inline]
pub fn octaves_to_ratio(octaves: f32) -> f32 {
    2.0_f32.powf(octaves)
}

/// Convert an offset in semitones to a frequency ratio: 2^(semitones/12).
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    octaves_to_ratio(semitones / 12.0)
}

/// Inverse of [`octaves_to_ratio`]. Non-positive ratios map to 0 octaves.
#[inline]
pub fn ratio_to_octaves(ratio: f32) -> f32 {
    if ratio <= 0.0 {
        0.0
    } else {
        ratio.log2()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert!((midi_note_to_freq(69) - 440.0).abs() < 1e-3);
        assert!((midi_note_to_freq(81) - 880.0).abs() < 1e-2);
    }

    #[test]
    fn octave_ratios() {
        assert_eq!(octaves_to_ratio(0.0), 1.0);
        assert!((octaves_to_ratio(1.0) - 2.0).abs() < 1e-6);
        assert!((octaves_to_ratio(-1.0) - 0.5).abs() < 1e-6);
        assert!((semitones_to_ratio(12.0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn ratio_to_octaves_inverts() {
        assert!((ratio_to_octaves(octaves_to_ratio(0.3)) - 0.3).abs() < 1e-5);
        assert_eq!(ratio_to_octaves(0.0), 0.0);
    }
}
