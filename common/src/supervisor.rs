//! Transport link supervision with a bounded retry budget.
//!
//! The supervisor never polls. It reacts to [`TransportEvent`]s delivered from the network
//! stack's event context and issues connect requests through a [`TransportLink`].
//!
//! ```text
//! Disconnected --start--> Connecting --link acquired--> Connected
//!                             |  ^                          |
//!               link lost,    |  | retry                    | link lost
//!               budget left   v  |                          v
//!                          Disconnected <-------------------+
//!                             |
//!                             +--budget spent--> Failed
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};

use crate::flags::{ConnectionState, Link};

pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// The network stack refused to even start a connect attempt.
#[derive(Debug, thiserror::Error)]
#[error("connect request rejected: {0}")]
pub struct TransportError(pub String);

/// The network collaborator that establishes the transport link.
pub trait TransportLink {
    /// Issues an asynchronous connect request. The outcome arrives later as a
    /// [`TransportEvent`]; implementations must not deliver that event from inside this call.
    fn connect(&self) -> Result<(), TransportError>;
}

impl<T: TransportLink + ?Sized> TransportLink for Arc<T> {
    fn connect(&self) -> Result<(), TransportError> {
        (**self).connect()
    }
}

/// Events raised by the network stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The station interface is up and ready to associate.
    Started,
    /// Associated and addressed. The address is informational only.
    LinkAcquired { address: Option<String> },
    /// Association failed or was lost.
    LinkLost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Retry budget spent. Only [`ConnectionSupervisor::retry`] leaves this state.
    Failed,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Failed attempts within one connection episode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryCounter {
    attempts: u32,
    max: u32,
}

impl RetryCounter {
    pub fn new(max: u32) -> Self {
        Self { attempts: 0, max }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max
    }

    /// Consumes one retry if any are left.
    pub fn try_increment(&mut self) -> bool {
        if self.exhausted() {
            return false;
        }
        self.attempts += 1;
        true
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[derive(Debug)]
struct Inner {
    status: LinkStatus,
    retries: RetryCounter,
}

/// Drives the transport link state machine and mirrors it into [`ConnectionState`].
pub struct ConnectionSupervisor<L> {
    link: L,
    state: Arc<ConnectionState>,
    inner: Mutex<Inner>,
}

impl<L: TransportLink> ConnectionSupervisor<L> {
    pub fn new(link: L, state: Arc<ConnectionState>, max_retries: u32) -> Self {
        Self {
            link,
            state,
            inner: Mutex::new(Inner {
                status: LinkStatus::Disconnected,
                retries: RetryCounter::new(max_retries),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> LinkStatus {
        self.lock().status
    }

    pub fn retries(&self) -> RetryCounter {
        self.lock().retries
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Issues the first connect request. Ignored unless the link is disconnected.
    pub fn start(&self) {
        let mut inner = self.lock();
        if inner.status != LinkStatus::Disconnected {
            debug!(target: "supervisor", "start ignored while {}", inner.status);
            return;
        }
        self.request_connect(&mut inner);
    }

    /// Manual recovery from [`LinkStatus::Failed`]: resets the budget and connects again.
    ///
    /// Returns `false` without doing anything in every other state.
    pub fn retry(&self) -> bool {
        let mut inner = self.lock();
        if inner.status != LinkStatus::Failed {
            return false;
        }
        info!(target: "supervisor", "manual retry requested");
        inner.retries.reset();
        self.state.clear_failed(Link::Transport);
        self.transition(&mut inner, LinkStatus::Disconnected);
        self.request_connect(&mut inner);
        true
    }

    /// Feeds one network stack event into the state machine.
    pub fn handle_event(&self, event: TransportEvent) {
        let mut inner = self.lock();
        match event {
            TransportEvent::Started => {
                if inner.status == LinkStatus::Disconnected {
                    self.request_connect(&mut inner);
                }
            }
            TransportEvent::LinkAcquired { address } => {
                match address {
                    Some(address) => info!(target: "supervisor", "got ip: {address}"),
                    None => info!(target: "supervisor", "link acquired"),
                }
                inner.retries.reset();
                self.state.clear_failed(Link::Transport);
                self.state.signal(Link::Transport);
                self.transition(&mut inner, LinkStatus::Connected);
            }
            TransportEvent::LinkLost => self.on_link_lost(&mut inner),
        }
    }

    fn transition(&self, inner: &mut Inner, to: LinkStatus) {
        if inner.status != to {
            info!(target: "supervisor", "transport {} -> {}", inner.status, to);
            inner.status = to;
        }
    }

    /// Keeps issuing connect requests until one is accepted or the budget runs out.
    fn request_connect(&self, inner: &mut Inner) {
        loop {
            self.transition(inner, LinkStatus::Connecting);
            match self.link.connect() {
                Ok(()) => return,
                Err(err) => {
                    warn!(target: "supervisor", "{err}");
                    if !self.spend_retry(inner) {
                        return;
                    }
                }
            }
        }
    }

    fn on_link_lost(&self, inner: &mut Inner) {
        self.state.clear(Link::Transport);

        if inner.status == LinkStatus::Failed {
            debug!(target: "supervisor", "link lost while failed, not retrying");
            return;
        }

        if self.spend_retry(inner) {
            self.request_connect(inner);
        }
    }

    /// Takes one retry from the budget, or enters [`LinkStatus::Failed`] when none is left.
    fn spend_retry(&self, inner: &mut Inner) -> bool {
        self.state.clear(Link::Transport);

        if inner.retries.try_increment() {
            info!(
                target: "supervisor",
                "retry {}/{} to connect to the access point",
                inner.retries.attempts(),
                inner.retries.max()
            );
            self.transition(inner, LinkStatus::Disconnected);
            true
        } else {
            error!(
                target: "supervisor",
                "failed to connect to the access point after {} retries",
                inner.retries.attempts()
            );
            self.transition(inner, LinkStatus::Failed);
            self.state.mark_failed(Link::Transport);
            false
        }
    }
}
