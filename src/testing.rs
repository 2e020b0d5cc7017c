//! Test doubles shared by unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::ws::{Message, Outbound, SendError};

/// Outbound that keeps what it was given.
#[derive(Debug, Default)]
pub(crate) struct RecordingOutbound {
    authenticated: AtomicBool,
    sent: Mutex<Vec<Message>>,
}

impl RecordingOutbound {
    pub fn authenticated() -> Self {
        let outbound = Self::default();
        outbound.set_authenticated(true);
        outbound
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }
}

impl Outbound for RecordingOutbound {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    fn send(&self, message: Message) -> Result<(), SendError> {
        if !message.is_handshake() && !self.is_authenticated() {
            return Err(SendError::NotAuthenticated {
                type_name: message.type_name().to_string(),
            });
        }
        self.sent.lock().push(message);
        Ok(())
    }
}
