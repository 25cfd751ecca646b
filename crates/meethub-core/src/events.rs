//! Session lifecycle notifications.
//!
//! Frontends subscribe to these to react to login, logout and forced logout.
//! A `SessionExpired` event is the signal to show a "session expired" notice
//! and navigate to the login screen; it is sent once per failed refresh.

use tokio::sync::broadcast;

/// Default buffer size for the broadcast channel.
/// Session events are rare; slow receivers past this limit lose the oldest ones.
const DEFAULT_BUFFER_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { user_id: String },
    LoggedOut,
    TokensRefreshed,
    SessionExpired { reason: String },
}

#[derive(Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_BUFFER_SIZE);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all subscribers.
    /// Returns the number of receivers; having none is not an error.
    pub fn send(&self, event: SessionEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
