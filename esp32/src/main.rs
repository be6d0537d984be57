use std::sync::Arc;

use climate_node_common::{
    BringUp, ConnectionState, ConnectionSupervisor, SamplingConfig, SessionMonitor, Settings,
};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;
use log::info;

mod dht22;
mod mqtt;
mod wifi;

const SENSOR_TASK_STACK_SIZE: usize = 8192;

/// Startup settings baked in at compile time from the secrets environment.
fn settings() -> anyhow::Result<Settings> {
    let settings = Settings {
        wifi_ssid: env!("CONFIG_ESP_WIFI_SSID").into(),
        wifi_password: env!("CONFIG_ESP_WIFI_PASSWORD").into(),
        wifi_auth: option_env!("CONFIG_ESP_WIFI_AUTH_MODE")
            .map(str::parse)
            .transpose()?
            .unwrap_or_default(),
        broker_uri: env!("CONFIG_MQTT_CLIENT_URI").into(),
        client_id: option_env!("CONFIG_MQTT_CLIENT_ID").unwrap_or_default().into(),
        username: option_env!("CONFIG_MQTT_USERNAME").unwrap_or_default().into(),
        password: option_env!("CONFIG_MQTT_PASSWORD").unwrap_or_default().into(),
        ..Default::default()
    };
    settings.validate()?;
    Ok(settings)
}

fn main() -> anyhow::Result<()> {
    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
    esp_idf_svc::sys::link_patches();

    // Bind the log crate to the ESP Logging facilities
    esp_idf_svc::log::EspLogger::initialize_default();

    let settings = settings()?;
    info!("{settings:?}");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let state = Arc::new(ConnectionState::new());
    let bring_up = BringUp::new(state.clone());

    info!("ESP_WIFI_MODE_STA");
    let supervisor = Arc::new(ConnectionSupervisor::new(
        wifi::StationLink,
        state.clone(),
        settings.max_retries,
    ));
    let driver = EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs))?;
    let _station = wifi::start(driver, &sysloop, supervisor.clone(), &settings)?;
    bring_up.connect_transport(&supervisor)?;

    let session = Arc::new(mqtt::MqttSession::new(
        settings.clone(),
        SessionMonitor::new(state.clone()),
    ));
    bring_up.connect_session(session.as_ref())?;

    let config = SamplingConfig::from_millis(settings.sensor_pin, settings.read_interval_ms)
        .with_stack_size(SENSOR_TASK_STACK_SIZE);
    let sensor = dht22::DHT22::new(settings.sensor_pin);
    let _task = bring_up.start_sampling(config, sensor, session, &settings.topic)?;

    // Everything from here on runs on the sensor task and the event loop.
    loop {
        esp_idf_svc::hal::delay::FreeRtos::delay_ms(u32::MAX);
    }
}
