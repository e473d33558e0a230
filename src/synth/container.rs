//! Per-slot lists of the child voices a group voice started.

use arrayvec::ArrayVec;

use crate::{synth::child::SynthId, MAX_VOICES_PER_SLOT};

/// Reference to a started child voice: which synth, which of its voices.
///
/// Handles never own the voice. They are resolved through the group's child
/// list on every use, and a handle whose synth is gone resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildVoiceHandle {
    pub synth: SynthId,
    pub voice: usize,
}

/// The child voices started for one unisono slot of one group voice.
///
/// Fixed capacity, so pushing on the render thread never allocates.
#[derive(Debug, Clone, Default)]
pub struct ChildVoiceContainer {
    handles: ArrayVec<ChildVoiceHandle, MAX_VOICES_PER_SLOT>,
}

impl ChildVoiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and drops the handle) when the slot is full.
    pub fn push(&mut self, handle: ChildVoiceHandle) -> bool {
        self.handles.try_push(handle).is_ok()
    }

    pub fn is_full(&self) -> bool {
        self.handles.is_full()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ChildVoiceHandle> {
        self.handles.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = ChildVoiceHandle> + '_ {
        self.handles.iter().copied()
    }

    pub fn contains_synth(&self, synth: SynthId) -> bool {
        self.handles.iter().any(|h| h.synth == synth)
    }

    pub fn retain(&mut self, keep: impl FnMut(&mut ChildVoiceHandle) -> bool) {
        self.handles.retain(keep);
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }
}
