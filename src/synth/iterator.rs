//! Allow bitset and the traversal orders over a group's child synths.

use crate::{synth::child::ChildList, MAX_CHILD_SYNTHS};

/// Bitset over child synth indices: which children receive events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowStates(u64);

impl AllowStates {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn get(&self, index: usize) -> bool {
        index < MAX_CHILD_SYNTHS && self.0 & (1 << index) != 0
    }

    pub fn set(&mut self, index: usize, allowed: bool) {
        if index >= MAX_CHILD_SYNTHS {
            return;
        }
        if allowed {
            self.0 |= 1 << index;
        } else {
            self.0 &= !(1 << index);
        }
    }

    /// Set bits `0..count` to `allowed`.
    pub fn set_range(&mut self, count: usize, allowed: bool) {
        for index in 0..count.min(MAX_CHILD_SYNTHS) {
            self.set(index, allowed);
        }
    }

    /// Drop bit `index` and move every higher bit down by one, following the
    /// child list when an entry is removed.
    pub fn remove_index(&mut self, index: usize) {
        if index >= MAX_CHILD_SYNTHS {
            return;
        }
        let below = self.0 & ((1u64 << index) - 1);
        let above = self.0.checked_shr(index as u32 + 1).unwrap_or(0) << index;
        self.0 = below | above;
    }

    /// Lowest set bit at or above `from`.
    pub fn next_set_from(&self, from: usize) -> Option<usize> {
        if from >= MAX_CHILD_SYNTHS {
            return None;
        }
        let remaining = self.0 >> from;
        if remaining == 0 {
            None
        } else {
            Some(from + remaining.trailing_zeros() as usize)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationMode {
    /// Allowed children only, ascending. Used for events.
    SkipUnallowed,
    /// Every child. Used for prepare and per-block hooks.
    IterateAll,
    /// The FM carrier once. Yields nothing unless FM is working.
    CarrierOnly,
}

/// Walks child synth indices of a group.
///
/// The iterator copies the child count, allow bits and carrier up front and
/// yields plain indices, so the caller is free to borrow the child list
/// mutably while iterating. An index that no longer resolves is simply
/// skipped by the caller.
#[derive(Debug, Clone)]
pub struct ChildSynthIterator {
    mode: IterationMode,
    next: usize,
    limit: usize,
    allow: AllowStates,
    carrier: Option<usize>,
    carrier_returned: bool,
}

impl ChildSynthIterator {
    /// `fm_carrier` must be `Some` only when FM is correctly set up.
    pub fn new(children: &ChildList, mode: IterationMode, fm_carrier: Option<usize>) -> Self {
        Self {
            mode,
            next: 0,
            limit: children.len(),
            allow: children.allow_states(),
            carrier: fm_carrier,
            carrier_returned: false,
        }
    }

    pub fn all(children: &ChildList) -> Self {
        Self::new(children, IterationMode::IterateAll, None)
    }

    pub fn allowed(children: &ChildList) -> Self {
        Self::new(children, IterationMode::SkipUnallowed, None)
    }

    pub fn carrier_only(children: &ChildList, fm_carrier: Option<usize>) -> Self {
        Self::new(children, IterationMode::CarrierOnly, fm_carrier)
    }
}

impl Iterator for ChildSynthIterator {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self.mode {
            IterationMode::CarrierOnly => {
                if self.carrier_returned {
                    return None;
                }
                self.carrier_returned = true;
                self.carrier.filter(|&carrier| carrier < self.limit)
            }
            IterationMode::SkipUnallowed => {
                let index = self.allow.next_set_from(self.next)?;
                if index >= self.limit {
                    self.next = self.limit;
                    return None;
                }
                self.next = index + 1;
                Some(index)
            }
            IterationMode::IterateAll => {
                if self.next >= self.limit {
                    return None;
                }
                self.next += 1;
                Some(self.next - 1)
            }
        }
    }
}
