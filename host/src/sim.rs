//! Simulated collaborators so the node can run on a desktop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use std::time::Duration;

use climate_node_common::{
    MessageId, RawReading, SensorDriver, SensorError, SessionClient, SessionError, SessionEvent,
    TransportError, TransportEvent, TransportLink,
};
use log::{debug, info};

/// Forwards events from `inbox` to `handler` on a dedicated thread, like a system event loop.
pub fn spawn_event_loop<E, F>(name: &str, inbox: Receiver<E>, mut handler: F) -> anyhow::Result<()>
where
    E: Send + 'static,
    F: FnMut(E) -> bool + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(move || {
        for event in inbox {
            if !handler(event) {
                break;
            }
        }
    })?;
    Ok(())
}

/// Sends `event` after `delay` from a short-lived thread, so no event is ever delivered from
/// inside the call that caused it.
fn deliver_later<E: Send + 'static>(events: &Sender<E>, delay: Duration, event: E) {
    let events = events.clone();
    thread::spawn(move || {
        thread::sleep(delay);
        // The receiver only goes away on shutdown.
        let _ = events.send(event);
    });
}

/// A sensor whose values drift slowly and which times out every few reads.
pub struct SimulatedSensor {
    reads: u32,
    fail_every: u32,
}

impl SimulatedSensor {
    pub fn new(fail_every: u32) -> Self {
        Self {
            reads: 0,
            fail_every,
        }
    }
}

impl SensorDriver for SimulatedSensor {
    fn read(&mut self) -> Result<RawReading, SensorError> {
        self.reads += 1;
        if self.fail_every > 0 && self.reads % self.fail_every == 0 {
            return Err(SensorError::Timeout);
        }

        // Triangle wave of +-10 tenths around 51.2 % and 21.5 C.
        let phase = (self.reads % 40) as i16;
        let offset = if phase < 20 { phase - 10 } else { 30 - phase };
        Ok(RawReading::new(512 - offset, 215 + offset))
    }
}

/// A radio link that refuses the first few associations.
pub struct SimulatedTransport {
    events: Sender<TransportEvent>,
    failures_left: AtomicU32,
    delay: Duration,
}

impl SimulatedTransport {
    pub fn new(events: Sender<TransportEvent>, failed_connects: u32, delay: Duration) -> Self {
        Self {
            events,
            failures_left: AtomicU32::new(failed_connects),
            delay,
        }
    }
}

impl TransportLink for SimulatedTransport {
    fn connect(&self) -> Result<(), TransportError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();

        let event = if failing {
            debug!("simulating a failed association");
            TransportEvent::LinkLost
        } else {
            TransportEvent::LinkAcquired {
                address: Some("192.168.4.2".to_string()),
            }
        };
        deliver_later(&self.events, self.delay, event);
        Ok(())
    }
}

/// A broker session that prints what it is given and drops the connection now and then.
pub struct SimulatedBroker {
    events: Sender<SessionEvent>,
    next_id: AtomicU32,
    drop_every: u32,
    delay: Duration,
}

impl SimulatedBroker {
    pub fn new(events: Sender<SessionEvent>, drop_every: u32, delay: Duration) -> Self {
        Self {
            events,
            next_id: AtomicU32::new(1),
            drop_every,
            delay,
        }
    }
}

impl SessionClient for SimulatedBroker {
    fn start(&self) -> Result<(), SessionError> {
        deliver_later(&self.events, self.delay, SessionEvent::Connected);
        Ok(())
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> Result<MessageId, SessionError> {
        let msg_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        info!(
            "[{}] {topic} <- {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            String::from_utf8_lossy(payload)
        );

        self.events
            .send(SessionEvent::Published { msg_id })
            .map_err(|err| SessionError::Publish(err.to_string()))?;

        if self.drop_every > 0 && msg_id % self.drop_every == 0 {
            deliver_later(&self.events, Duration::ZERO, SessionEvent::Disconnected);
            deliver_later(&self.events, self.delay * 3, SessionEvent::Connected);
        }

        Ok(msg_id)
    }
}
