//! Runs the climate node on a desktop against a simulated sensor, radio and broker.
//!
//! Settings come from the file given as the first argument, or from `CLIMATE_*`
//! environment variables. A `.json` file is read as serialized settings, anything else as
//! a firmware secrets file. `CLIMATE_SIM_*` variables tune the simulation.

mod sim;

use std::path::Path;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::Context;
use climate_node_common::{
    BringUp, ConnectionState, ConnectionSupervisor, SamplingConfig, SessionMonitor, Settings,
};
use log::info;

use sim::{SimulatedBroker, SimulatedSensor, SimulatedTransport};

/// Knobs of the simulated environment.
struct Simulation {
    failed_connects: u32,
    sensor_fail_every: u32,
    session_drop_every: u32,
    event_delay: Duration,
    run_for: Duration,
}

impl Simulation {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            failed_connects: env_or("CLIMATE_SIM_FAILED_CONNECTS", 2)?,
            sensor_fail_every: env_or("CLIMATE_SIM_SENSOR_FAIL_EVERY", 7)?,
            session_drop_every: env_or("CLIMATE_SIM_SESSION_DROP_EVERY", 5)?,
            event_delay: Duration::from_millis(env_or("CLIMATE_SIM_EVENT_DELAY_MS", 300)?),
            run_for: Duration::from_secs(env_or("CLIMATE_SIM_RUN_SECS", 60)?),
        })
    }
}

fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("invalid value for {name}: {value}")),
        Err(_) => Ok(default),
    }
}

fn read_settings_file(path: &Path) -> anyhow::Result<Settings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings from {}", path.display()))?;

    let settings = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Settings::from_json(&text)?,
        _ => Settings::from_secrets(&text)?,
    };
    Ok(settings)
}

fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = match std::env::args().nth(1) {
        Some(path) => read_settings_file(Path::new(&path))?,
        None => Settings::from_env()?,
    };

    if settings.wifi_ssid.is_empty() {
        settings.wifi_ssid = "simulated".into();
    }
    if settings.broker_uri.is_empty() {
        settings.broker_uri = "mqtt://localhost:1883".into();
    }

    settings.validate()?;
    Ok(settings)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = load_settings()?;
    let simulation = Simulation::from_env()?;
    info!("{settings:?}");

    let state = Arc::new(ConnectionState::new());
    let bring_up = BringUp::new(state.clone());

    // Transport link, with its events routed back into the supervisor.
    let (transport_events, transport_inbox) = mpsc::channel();
    let supervisor = Arc::new(ConnectionSupervisor::new(
        SimulatedTransport::new(
            transport_events,
            simulation.failed_connects,
            simulation.event_delay,
        ),
        state.clone(),
        settings.max_retries,
    ));
    let weak_supervisor = Arc::downgrade(&supervisor);
    sim::spawn_event_loop("sys_evt", transport_inbox, move |event| {
        match weak_supervisor.upgrade() {
            Some(supervisor) => {
                supervisor.handle_event(event);
                true
            }
            None => false,
        }
    })?;

    bring_up.connect_transport(&supervisor)?;

    // Broker session, with its events routed into the session flag.
    let (session_events, session_inbox) = mpsc::channel();
    let monitor = SessionMonitor::new(state.clone());
    sim::spawn_event_loop("mqtt_evt", session_inbox, move |event| {
        monitor.handle_event(&event);
        true
    })?;
    let session = Arc::new(SimulatedBroker::new(
        session_events,
        simulation.session_drop_every,
        simulation.event_delay,
    ));

    bring_up.connect_session(session.as_ref())?;

    let config = SamplingConfig::from_millis(settings.sensor_pin, settings.read_interval_ms);
    let task = bring_up.start_sampling(
        config,
        SimulatedSensor::new(simulation.sensor_fail_every),
        session,
        &settings.topic,
    )?;

    std::thread::sleep(simulation.run_for);
    task.stop();
    info!("simulation finished");

    Ok(())
}
