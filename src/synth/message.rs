#[cfg(feature = "rtrb")]
use rtrb::Consumer;

/// Control messages sent from the UI/MIDI thread to the render thread.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SynthMessage {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, velocity: u8 },
    PitchBend { cents: f32 },
    AllNotesOff,
    /// Fade out every sounding voice immediately
    KillAllVoices,
}

/// The event a group voice was started with. Every child voice started for
/// the same note carries a copy.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct NoteEvent {
    pub note: u8,
    pub velocity: u8,
    /// Running number assigned by the group on note-on
    pub event_id: u32,
    /// Sample position of the event inside the group's lifetime
    pub timestamp: u64,
}

impl NoteEvent {
    pub fn new(note: u8, velocity: u8) -> Self {
        Self {
            note,
            velocity,
            ..Self::default()
        }
    }

    pub fn velocity_gain(&self) -> f32 {
        self.velocity as f32 / 127.0
    }
}

pub trait MessageReceiver {
    fn pop(&mut self) -> Option<SynthMessage>;
}

#[cfg(feature = "rtrb")]
impl MessageReceiver for Consumer<SynthMessage> {
    fn pop(&mut self) -> Option<SynthMessage> {
        Consumer::pop(self).ok()
    }
}

/// A plain queue, for tests and offline rendering.
impl MessageReceiver for std::collections::VecDeque<SynthMessage> {
    fn pop(&mut self) -> Option<SynthMessage> {
        self.pop_front()
    }
}
