// Purpose: Voice management, child synths, FM pairing and unisono
// A group sits above per-voice sources and plays several child synths as one

pub mod child;
pub mod container;
pub mod effect;
pub mod factory;
pub mod fm;
pub mod group;
pub mod group_voice;
pub mod iterator;
pub mod message;
pub mod sound;
pub mod voice;

pub use child::{ChildList, ChildSynth, SynthId};
pub use container::{ChildVoiceContainer, ChildVoiceHandle};
pub use fm::{FmConfig, FmState, FmStatus};
pub use group::{Group, GroupAttribute, Incompatibility, RejectReason, RejectedChild};
pub use group_voice::{GroupChains, GroupVoice, UnisonoSettings};
pub use iterator::{AllowStates, ChildSynthIterator, IterationMode};
pub use message::{MessageReceiver, NoteEvent, SynthMessage};
pub use sound::SoundRange;
pub use voice::VoiceState;
