use std::sync::Arc;

use climate_node_common::{
    ConnectionSupervisor, Settings, TransportError, TransportEvent, TransportLink, WifiAuth,
};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::wifi::{EspWifi, WifiEvent};
use log::info;

/// Connect requests go straight to the driver so they can be issued from the event loop.
pub struct StationLink;

impl TransportLink for StationLink {
    fn connect(&self) -> Result<(), TransportError> {
        esp_idf_svc::sys::esp!(unsafe { esp_idf_svc::sys::esp_wifi_connect() })
            .map_err(|err| TransportError(err.to_string()))
    }
}

pub type Supervisor = ConnectionSupervisor<StationLink>;

fn auth_method(auth: WifiAuth) -> AuthMethod {
    match auth {
        WifiAuth::Open => AuthMethod::None,
        WifiAuth::Wep => AuthMethod::WEP,
        WifiAuth::Wpa => AuthMethod::WPA,
        WifiAuth::Wpa2 => AuthMethod::WPA2Personal,
        WifiAuth::WpaWpa2 => AuthMethod::WPAWPA2Personal,
        WifiAuth::Wpa3 => AuthMethod::WPA3Personal,
        WifiAuth::Wpa2Wpa3 => AuthMethod::WPA2WPA3Personal,
    }
}

/// Keeps the driver and the event subscriptions alive.
pub struct Station {
    pub wifi: EspWifi<'static>,
    _wifi_events: EspSubscription<'static, System>,
    _ip_events: EspSubscription<'static, System>,
}

/// Configures station mode, routes Wi-Fi and IP events into `supervisor` and starts the
/// driver. The started event then issues the first connect request.
pub fn start(
    mut wifi: EspWifi<'static>,
    sysloop: &EspSystemEventLoop,
    supervisor: Arc<Supervisor>,
    settings: &Settings,
) -> anyhow::Result<Station> {
    let wifi_configuration = Configuration::Client(ClientConfiguration {
        ssid: settings
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow::anyhow!("wifi ssid too long"))?,
        bssid: None,
        auth_method: auth_method(settings.wifi_auth),
        password: settings
            .wifi_password
            .as_str()
            .try_into()
            .map_err(|_| anyhow::anyhow!("wifi password too long"))?,
        channel: None,
        ..Default::default()
    });
    wifi.set_configuration(&wifi_configuration)?;

    let wifi_supervisor = supervisor.clone();
    let wifi_events = sysloop.subscribe::<WifiEvent, _>(move |event| match event {
        WifiEvent::StaStarted => wifi_supervisor.handle_event(TransportEvent::Started),
        WifiEvent::StaDisconnected { .. } => {
            wifi_supervisor.handle_event(TransportEvent::LinkLost)
        }
        _ => {}
    })?;

    let ip_events = sysloop.subscribe::<IpEvent, _>(move |event| {
        if let IpEvent::DhcpIpAssigned(assignment) = event {
            supervisor.handle_event(TransportEvent::LinkAcquired {
                address: Some(assignment.ip().to_string()),
            });
        }
    })?;

    wifi.start()?;
    info!("Wifi started");

    Ok(Station {
        wifi,
        _wifi_events: wifi_events,
        _ip_events: ip_events,
    })
}
