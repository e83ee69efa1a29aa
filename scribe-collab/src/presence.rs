//! Who is in the room.
//!
//! The server broadcasts the full participant list on every join and leave,
//! so the local copy is replaced wholesale rather than patched.

use crate::protocol::Participant;

#[derive(Debug, Clone, Default)]
pub struct RoomPresence {
    participants: Vec<Participant>,
}

impl RoomPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the participant list. Returns whether anything changed.
    pub fn replace(&mut self, participants: Vec<Participant>) -> bool {
        if self.participants == participants {
            return false;
        }
        log::debug!("presence: {} participant(s)", participants.len());
        self.participants = participants;
        true
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.participants.iter().any(|p| p.username == username)
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }
}
