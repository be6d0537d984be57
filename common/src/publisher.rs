use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::flags::{ConnectionState, Link};
use crate::payload::{self, TOPIC};
use crate::reading::Reading;
use crate::session::{MessageId, SessionClient};

/// Receives every reading the sampling task produces, on the sampling task's own thread.
pub trait ReadingHandler: Send + Sync {
    fn on_reading(&self, reading: &Reading);
}

impl<T: ReadingHandler + ?Sized> ReadingHandler for Arc<T> {
    fn on_reading(&self, reading: &Reading) {
        (**self).on_reading(reading)
    }
}

/// What happened to a reading handed to [`Publisher::publish`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent(MessageId),
    SessionDown,
    Invalid,
    EncodingFailed,
    SendFailed,
}

/// Gates readings on the session flag and hands them to the session layer.
///
/// Nothing is queued or retried: a reading that cannot go out right now is dropped.
pub struct Publisher<S: ?Sized> {
    session: Arc<S>,
    state: Arc<ConnectionState>,
    topic: String,
}

impl<S: SessionClient + ?Sized> Publisher<S> {
    pub fn new(session: Arc<S>, state: Arc<ConnectionState>) -> Self {
        Self {
            session,
            state,
            topic: TOPIC.to_string(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn publish(&self, reading: &Reading) -> PublishOutcome {
        if !self.state.is_up(Link::Session) {
            info!(target: "publisher", "reading received, but the session isn't connected");
            return PublishOutcome::SessionDown;
        }

        if !reading.valid {
            warn!(target: "publisher", "dropping invalid reading");
            return PublishOutcome::Invalid;
        }

        info!(
            target: "publisher",
            "temperature: {:.1}; humidity: {:.1}",
            reading.temperature_celsius, reading.humidity_percent
        );

        let Some(payload) = payload::encode(reading) else {
            error!(
                target: "publisher",
                "incorrect payload: {}, {}",
                reading.temperature_celsius, reading.humidity_percent
            );
            return PublishOutcome::EncodingFailed;
        };

        debug!(target: "publisher", "payload: {}", String::from_utf8_lossy(&payload));

        match self.session.publish(&self.topic, &payload) {
            Ok(msg_id) => PublishOutcome::Sent(msg_id),
            Err(err) => {
                warn!(target: "publisher", "{err}");
                PublishOutcome::SendFailed
            }
        }
    }
}

impl<S: SessionClient + Send + Sync + ?Sized> ReadingHandler for Publisher<S> {
    fn on_reading(&self, reading: &Reading) {
        self.publish(reading);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSession {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
        fail: bool,
    }

    impl SessionClient for RecordingSession {
        fn start(&self) -> Result<(), SessionError> {
            Ok(())
        }

        fn publish(&self, topic: &str, payload: &[u8]) -> Result<MessageId, SessionError> {
            if self.fail {
                return Err(SessionError::Publish("outbox full".into()));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((topic.to_string(), payload.to_vec()));
            Ok(sent.len() as MessageId)
        }
    }

    fn publisher(session: RecordingSession, up: bool) -> Publisher<RecordingSession> {
        let state = Arc::new(ConnectionState::new());
        if up {
            state.signal(Link::Session);
        }
        Publisher::new(Arc::new(session), state)
    }

    #[test]
    fn drops_when_session_is_down() {
        let publisher = publisher(RecordingSession::default(), false);

        assert_eq!(
            publisher.publish(&Reading::new(50.0, 20.0)),
            PublishOutcome::SessionDown
        );
        assert!(publisher.session.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn session_flag_alone_decides() {
        let publisher = publisher(RecordingSession::default(), true);
        assert!(!publisher.state.is_up(Link::Transport));

        assert_eq!(
            publisher.publish(&Reading::new(50.0, 20.0)),
            PublishOutcome::Sent(1)
        );
    }

    #[test]
    fn sends_to_the_topic() {
        let publisher = publisher(RecordingSession::default(), true);
        publisher.on_reading(&Reading::new(51.2, 21.5));

        let sent = publisher.session.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "temperature_humidity");
        let decoded = payload::decode(&sent[0].1).unwrap();
        assert_eq!(decoded.humidity_in_percent, 51.2);
        assert_eq!(decoded.temperature_in_celsius, 21.5);
    }

    #[test]
    fn custom_topic() {
        let publisher = publisher(RecordingSession::default(), true).with_topic("greenhouse/1");
        publisher.on_reading(&Reading::new(40.0, 10.0));

        assert_eq!(publisher.topic(), "greenhouse/1");
        assert_eq!(publisher.session.sent.lock().unwrap()[0].0, "greenhouse/1");
    }

    #[test]
    fn invalid_and_non_finite_readings_are_not_sent() {
        let publisher = publisher(RecordingSession::default(), true);

        assert_eq!(
            publisher.publish(&Reading::invalid()),
            PublishOutcome::Invalid
        );
        assert_eq!(
            publisher.publish(&Reading::new(f32::INFINITY, 20.0)),
            PublishOutcome::EncodingFailed
        );
        assert!(publisher.session.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn send_failure_is_contained() {
        let publisher = publisher(
            RecordingSession {
                fail: true,
                ..Default::default()
            },
            true,
        );

        publisher.on_reading(&Reading::new(50.0, 20.0));
        assert_eq!(
            publisher.publish(&Reading::new(50.0, 20.0)),
            PublishOutcome::SendFailed
        );
    }
}
