pub mod config;
pub mod dsp;
pub mod error;
pub mod graph; // Per-voice sound sources
pub mod modulation; // Gain/pitch modulation chains
pub mod notify;
pub mod routing; // Channel routing matrix
pub mod state;
pub mod synth; // Voice management, groups, FM and unisono

pub use config::EngineConfig;
pub use error::{Error, Result};

pub const MAX_BLOCK_SIZE: usize = 2048;
pub(crate) const MIN_TIME: f32 = 1.0 / 48_000.0;

/// Capacity of the routing matrix connection tables.
pub const MAX_CHANNELS: usize = 16;
/// Upper bound for the unisono voice amount of a group.
pub const MAX_UNISONO_VOICES: usize = 16;
/// Upper bound for the number of child synths in a group (size of the allow bitset).
pub const MAX_CHILD_SYNTHS: usize = 64;
/// Started child voices one unisono slot can hold.
pub const MAX_VOICES_PER_SLOT: usize = 32;
