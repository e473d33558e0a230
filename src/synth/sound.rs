//! Key and velocity zones of a child synth.

use serde::{Deserialize, Serialize};

/// One playable sound: the note and velocity range it answers to.
///
/// A child synth starts one voice per sound that applies to an incoming
/// note, so overlapping ranges layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundRange {
    pub low_key: u8,
    pub high_key: u8,
    pub low_velocity: u8,
    pub high_velocity: u8,
}

impl SoundRange {
    /// Every note at every velocity.
    pub const FULL: SoundRange = SoundRange {
        low_key: 0,
        high_key: 127,
        low_velocity: 0,
        high_velocity: 127,
    };

    pub fn keys(low_key: u8, high_key: u8) -> Self {
        Self {
            low_key: low_key.min(high_key),
            high_key: low_key.max(high_key),
            ..Self::FULL
        }
    }

    pub fn with_velocity(mut self, low: u8, high: u8) -> Self {
        self.low_velocity = low.min(high);
        self.high_velocity = low.max(high);
        self
    }

    pub fn applies_to(&self, note: u8, velocity: u8) -> bool {
        (self.low_key..=self.high_key).contains(&note)
            && (self.low_velocity..=self.high_velocity).contains(&velocity)
    }
}

impl Default for SoundRange {
    fn default() -> Self {
        Self::FULL
    }
}
