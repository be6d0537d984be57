//! Link-state flags shared between the network event handlers and the tasks that gate on them.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Raised while a link is connected.
pub const CONNECTED: u32 = 1 << 0;

/// Raised once a link has given up connecting. Only the transport link uses it.
pub const FAILED: u32 = 1 << 1;

/// A set of boolean flags that threads can raise, lower, poll and wait on.
///
/// All operations take `&self`, so a single instance can be shared through an `Arc` by any
/// number of producers and consumers without extra locking. Once [`EventFlags::signal`]
/// returns, every later [`EventFlags::is_set`] observes the raised bits until they are cleared.
#[derive(Debug, Default)]
pub struct EventFlags {
    bits: Mutex<u32>,
    changed: Condvar,
}

impl EventFlags {
    pub const fn new() -> Self {
        Self {
            bits: Mutex::new(0),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, u32> {
        // A plain bitmask cannot be left half-written, so a poisoned lock is still usable.
        self.bits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raises `bits` and wakes every waiter.
    pub fn signal(&self, bits: u32) {
        let mut current = self.lock();
        *current |= bits;
        self.changed.notify_all();
    }

    /// Lowers `bits`.
    pub fn clear(&self, bits: u32) {
        *self.lock() &= !bits;
    }

    /// Returns `true` if all of `bits` are raised. Never blocks on anything but the short
    /// internal lock.
    pub fn is_set(&self, bits: u32) -> bool {
        *self.lock() & bits == bits
    }

    /// Snapshot of every raised bit.
    pub fn bits(&self) -> u32 {
        *self.lock()
    }

    /// Blocks until all of `bits` are raised or `timeout` elapses. `None` waits forever.
    ///
    /// Returns whether the bits were raised when the wait ended.
    pub fn wait_until_set(&self, bits: u32, timeout: Option<Duration>) -> bool {
        let guard = self.lock();
        match timeout {
            None => {
                let _guard = self
                    .changed
                    .wait_while(guard, |current| *current & bits != bits)
                    .unwrap_or_else(PoisonError::into_inner);
                true
            }
            Some(timeout) => {
                let (guard, _) = self
                    .changed
                    .wait_timeout_while(guard, timeout, |current| *current & bits != bits)
                    .unwrap_or_else(PoisonError::into_inner);
                *guard & bits == bits
            }
        }
    }

    /// Blocks until any of `bits` is raised or `timeout` elapses. `None` waits forever.
    ///
    /// Returns the subset of `bits` that was raised when the wait ended, `0` on timeout.
    pub fn wait_any(&self, bits: u32, timeout: Option<Duration>) -> u32 {
        let guard = self.lock();
        match timeout {
            None => {
                let guard = self
                    .changed
                    .wait_while(guard, |current| *current & bits == 0)
                    .unwrap_or_else(PoisonError::into_inner);
                *guard & bits
            }
            Some(timeout) => {
                let (guard, _) = self
                    .changed
                    .wait_timeout_while(guard, timeout, |current| *current & bits == 0)
                    .unwrap_or_else(PoisonError::into_inner);
                *guard & bits
            }
        }
    }
}

/// The network layers whose state is tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Link {
    /// Radio association plus address acquisition.
    Transport,
    /// Connection to the message broker.
    Session,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Session => write!(f, "session"),
        }
    }
}

/// Connection flags for the transport link and the broker session.
///
/// Created once by the bring-up sequence and handed to every component through an `Arc`.
/// The two links are tracked independently; in particular the session flag may be raised
/// while the transport flag is down, and publish gating only ever looks at the session flag.
#[derive(Debug, Default)]
pub struct ConnectionState {
    transport: EventFlags,
    session: EventFlags,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The flag set backing `link`.
    pub fn flags(&self, link: Link) -> &EventFlags {
        match link {
            Link::Transport => &self.transport,
            Link::Session => &self.session,
        }
    }

    pub fn signal(&self, link: Link) {
        self.flags(link).signal(CONNECTED);
    }

    pub fn clear(&self, link: Link) {
        self.flags(link).clear(CONNECTED);
    }

    pub fn is_up(&self, link: Link) -> bool {
        self.flags(link).is_set(CONNECTED)
    }

    pub fn wait_until_up(&self, link: Link, timeout: Option<Duration>) -> bool {
        self.flags(link).wait_until_set(CONNECTED, timeout)
    }

    /// Marks `link` as permanently failed, waking anyone waiting for it to come up.
    pub fn mark_failed(&self, link: Link) {
        self.flags(link).signal(FAILED);
    }

    pub fn clear_failed(&self, link: Link) {
        self.flags(link).clear(FAILED);
    }

    pub fn has_failed(&self, link: Link) -> bool {
        self.flags(link).is_set(FAILED)
    }
}
