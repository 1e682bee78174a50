//! "Session ended" broadcast.
//!
//! Independent consumers (route guard, navigation bar, ...) each hold their own
//! receiver and get every logout exactly once, instead of polling state.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The user signed out.
    UserRequested,
    /// The backend rejected the credential and it could not be renewed.
    CredentialRejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEnded {
    pub reason: LogoutReason,
    /// Generation of the session that ended.
    pub generation: u64,
}

/// Broadcast handle; cheap to clone.
#[derive(Debug, Clone)]
pub struct LogoutSignal {
    tx: broadcast::Sender<SessionEnded>,
}

impl LogoutSignal {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEnded> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Returns how many subscribers were notified (lossy: zero is fine).
    pub(crate) fn emit(&self, event: SessionEnded) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for LogoutSignal {
    fn default() -> Self {
        Self::new(16)
    }
}
