//! Session lifecycle notifications
//!
//! UI collaborators subscribe to a [`SessionSignal`] to learn when the user
//! logged in, logged out, or was forced out because the refresh token was
//! rejected. The signal is a thin wrapper over a
//! [`tokio::sync::broadcast`] channel; sending with no subscribers is fine.

use tokio::sync::broadcast;

/// Capacity of the broadcast buffer. Slow subscribers that fall further
/// behind than this observe `RecvError::Lagged`.
const SIGNAL_CAPACITY: usize = 16;

/// Session state change observed by subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Fresh credentials were stored after a successful login.
    LoggedIn,
    /// The user logged out; credentials were cleared.
    LoggedOut,
    /// A refresh round failed; credentials were cleared and the user must
    /// sign in again.
    ForcedLogout {
        /// Why the refresh failed.
        reason: String,
    },
}

/// Broadcast handle for [`SessionEvent`]s. Clones share the channel.
///
/// # Examples
///
/// ```
/// use atelier::auth::session::{SessionEvent, SessionSignal};
///
/// let signal = SessionSignal::new();
/// let mut rx = signal.subscribe();
/// signal.emit(SessionEvent::LoggedOut);
/// assert_eq!(rx.try_recv().unwrap(), SessionEvent::LoggedOut);
/// ```
#[derive(Debug, Clone)]
pub struct SessionSignal {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionSignal {
    /// Creates a signal with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { tx }
    }

    /// Returns a receiver for events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publishes `event` to every current subscriber.
    pub fn emit(&self, event: SessionEvent) {
        tracing::debug!(?event, "session event");
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SessionSignal {
    fn default() -> Self {
        Self::new()
    }
}
