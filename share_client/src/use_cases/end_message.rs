// Auto-clearing slot for the "share ended" message.

use crate::domain::EndMessage;
use std::time::Duration;
use tokio::time::Instant;

/// Holds at most one end message and the instant it should disappear.
///
/// Setting a new message replaces the old one and restarts the window.
#[derive(Debug)]
pub struct EndMessageSlot {
    ttl: Duration,
    current: Option<EndMessage>,
    deadline: Option<Instant>,
}

impl EndMessageSlot {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            current: None,
            deadline: None,
        }
    }

    pub fn set(&mut self, message: EndMessage, now: Instant) {
        self.current = Some(message);
        self.deadline = Some(now + self.ttl);
    }

    pub fn current(&self) -> Option<&EndMessage> {
        self.current.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    // Drop the message once its window has passed; returns true if it was cleared.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.current = None;
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
