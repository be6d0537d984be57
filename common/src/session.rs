//! Broker session collaborator and the handler that mirrors its events into the session flag.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::flags::{ConnectionState, Link};

/// Identifier the session layer assigns to an enqueued message.
pub type MessageId = u32;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to start the session: {0}")]
    Start(String),
    #[error("publish rejected: {0}")]
    Publish(String),
}

/// A messaging session with a broker.
///
/// `publish` is fire-and-forget: it enqueues the message with at-most-once delivery and no
/// retain flag, and returns without waiting for any acknowledgment.
pub trait SessionClient {
    /// Starts connecting. Completion is reported through [`SessionEvent::Connected`].
    fn start(&self) -> Result<(), SessionError>;

    fn publish(&self, topic: &str, payload: &[u8]) -> Result<MessageId, SessionError>;
}

impl<T: SessionClient + ?Sized> SessionClient for Arc<T> {
    fn start(&self) -> Result<(), SessionError> {
        (**self).start()
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> Result<MessageId, SessionError> {
        (**self).publish(topic, payload)
    }
}

/// Events raised by the session layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    Published { msg_id: MessageId },
    Received { topic: String, data: Vec<u8> },
    Error(String),
}

/// Consumes [`SessionEvent`]s on the session layer's callback context.
#[derive(Clone, Debug)]
pub struct SessionMonitor {
    state: Arc<ConnectionState>,
}

impl SessionMonitor {
    pub fn new(state: Arc<ConnectionState>) -> Self {
        Self { state }
    }

    pub fn handle_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Connected => {
                info!(target: "session", "connected");
                self.state.signal(Link::Session);
            }
            SessionEvent::Disconnected => {
                self.state.clear(Link::Session);
                info!(target: "session", "disconnected");
            }
            SessionEvent::Published { msg_id } => {
                debug!(target: "session", "published, msg_id={msg_id}");
            }
            SessionEvent::Received { topic, data } => {
                info!(
                    target: "session",
                    "data on {topic}: {}",
                    String::from_utf8_lossy(data)
                );
            }
            SessionEvent::Error(message) => {
                warn!(target: "session", "error: {message}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_and_disconnect_drive_the_flag() {
        let state = Arc::new(ConnectionState::new());
        let monitor = SessionMonitor::new(state.clone());

        monitor.handle_event(&SessionEvent::Connected);
        assert!(state.is_up(Link::Session));

        monitor.handle_event(&SessionEvent::Disconnected);
        assert!(!state.is_up(Link::Session));
    }

    #[test]
    fn other_events_leave_the_flag_alone() {
        let state = Arc::new(ConnectionState::new());
        let monitor = SessionMonitor::new(state.clone());
        monitor.handle_event(&SessionEvent::Connected);

        monitor.handle_event(&SessionEvent::Published { msg_id: 7 });
        monitor.handle_event(&SessionEvent::Received {
            topic: "cmd".into(),
            data: vec![0xff, b'x'],
        });
        monitor.handle_event(&SessionEvent::Error("tcp reset".into()));

        assert!(state.is_up(Link::Session));
        assert!(!state.is_up(Link::Transport));
    }
}
