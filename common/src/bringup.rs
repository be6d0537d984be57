//! Startup sequencing: transport link, then broker session, then sampling.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::error::{Error, Result};
use crate::flags::{ConnectionState, Link, CONNECTED, FAILED};
use crate::publisher::Publisher;
use crate::sampler::{SamplingConfig, SamplingTask};
use crate::sensor::SensorDriver;
use crate::session::SessionClient;
use crate::supervisor::{ConnectionSupervisor, TransportLink};

/// Serializes the startup phases. Each phase blocks until the previous link is up.
///
/// The event plumbing (transport events into the supervisor, session events into a
/// [`crate::session::SessionMonitor`]) must be wired before the matching phase runs.
#[derive(Clone, Debug)]
pub struct BringUp {
    state: Arc<ConnectionState>,
    startup_timeout: Option<Duration>,
}

impl BringUp {
    /// Waits are unbounded.
    pub fn new(state: Arc<ConnectionState>) -> Self {
        Self {
            state,
            startup_timeout: None,
        }
    }

    /// Bounds each startup wait.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = Some(timeout);
        self
    }

    pub fn state(&self) -> &Arc<ConnectionState> {
        &self.state
    }

    /// Starts the supervisor and blocks until the transport link is up.
    pub fn connect_transport<L: TransportLink>(
        &self,
        supervisor: &ConnectionSupervisor<L>,
    ) -> Result<()> {
        info!(target: "bringup", "waiting for wifi");
        supervisor.start();
        self.wait_for(Link::Transport)?;
        info!(target: "bringup", "wifi connected");
        Ok(())
    }

    /// Starts the session and blocks until it reports connected.
    pub fn connect_session<S: SessionClient + ?Sized>(&self, session: &S) -> Result<()> {
        info!(target: "bringup", "ready to init mqtt client");
        session.start()?;
        self.wait_for(Link::Session)?;
        info!(target: "bringup", "mqtt client connected");
        Ok(())
    }

    /// Spawns the sampling task with a [`Publisher`] over `session` as its handler.
    pub fn start_sampling<D, S>(
        &self,
        config: SamplingConfig,
        driver: D,
        session: Arc<S>,
        topic: &str,
    ) -> Result<SamplingTask>
    where
        D: SensorDriver + Send + 'static,
        S: SessionClient + Send + Sync + ?Sized + 'static,
    {
        let publisher = Publisher::new(session, self.state.clone()).with_topic(topic);
        SamplingTask::start(config, driver, publisher)
    }

    fn wait_for(&self, link: Link) -> Result<()> {
        let bits = self
            .state
            .flags(link)
            .wait_any(CONNECTED | FAILED, self.startup_timeout);

        if bits & CONNECTED != 0 {
            Ok(())
        } else if bits & FAILED != 0 {
            Err(Error::LinkFailed(link))
        } else {
            Err(Error::StartupTimeout(link))
        }
    }
}
