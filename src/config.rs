//! Engine configuration.
//!
//! Everything that sizes buffers or voice pools is decided here, before
//! `prepare_to_play`, so the render path never has to allocate.

use serde::{Deserialize, Serialize};

use crate::{Result, MAX_BLOCK_SIZE, MAX_UNISONO_VOICES};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Audio sample rate in Hz
    pub sample_rate: f32,
    /// Largest block the host will ask for (clamped to `MAX_BLOCK_SIZE`)
    pub block_size: usize,
    /// Hard polyphony ceiling. Also the number of group voices and the voice
    /// count every child synth must have.
    pub max_polyphony: usize,
    /// Largest unisono voice amount accepted by a group
    pub max_unisono_voices: usize,
    /// Length of the kill fade used for voice stealing and FM topology changes
    pub kill_fade_ms: f32,
    /// Seed for the unisono start-offset randomizer. `None` seeds from the voice index.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            block_size: 512,
            max_polyphony: 64,
            max_unisono_voices: MAX_UNISONO_VOICES,
            kill_fade_ms: 20.0,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON document. Missing fields use defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Clamp every field into the range the engine can handle.
    pub fn sanitized(mut self) -> Self {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            self.sample_rate = 44_100.0;
        }
        self.block_size = self.block_size.clamp(1, MAX_BLOCK_SIZE);
        self.max_polyphony = self.max_polyphony.max(1);
        self.max_unisono_voices = self.max_unisono_voices.clamp(1, MAX_UNISONO_VOICES);
        self.kill_fade_ms = self.kill_fade_ms.max(0.0);
        self
    }

    /// Number of samples the kill fade takes at the configured sample rate.
    pub fn kill_fade_samples(&self) -> usize {
        ((self.kill_fade_ms / 1000.0) * self.sample_rate).round().max(1.0) as usize
    }
}
