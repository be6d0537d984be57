use std::sync::{Mutex, PoisonError};

use climate_node_common::{
    MessageId, SessionClient, SessionError, SessionEvent, SessionMonitor, Settings,
};
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};

/// MQTT session over the ESP-IDF client. The client is created, and starts connecting,
/// on [`SessionClient::start`].
pub struct MqttSession {
    settings: Settings,
    monitor: SessionMonitor,
    client: Mutex<Option<EspMqttClient<'static>>>,
}

impl MqttSession {
    pub fn new(settings: Settings, monitor: SessionMonitor) -> Self {
        Self {
            settings,
            monitor,
            client: Mutex::new(None),
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

impl SessionClient for MqttSession {
    fn start(&self) -> Result<(), SessionError> {
        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if client.is_some() {
            return Ok(());
        }

        let mqtt_config = MqttClientConfiguration {
            client_id: non_empty(&self.settings.client_id),
            username: non_empty(&self.settings.username),
            password: non_empty(&self.settings.password),
            keep_alive_interval: Some(core::time::Duration::from_secs(30)),
            network_timeout: core::time::Duration::from_secs(5),
            ..Default::default()
        };

        let monitor = self.monitor.clone();
        let mqtt = EspMqttClient::new_cb(&self.settings.broker_uri, &mqtt_config, move |event| {
            let event = match event.payload() {
                EventPayload::Connected(_) => SessionEvent::Connected,
                EventPayload::Disconnected => SessionEvent::Disconnected,
                EventPayload::Published(msg_id) => SessionEvent::Published { msg_id },
                EventPayload::Received { topic, data, .. } => SessionEvent::Received {
                    topic: topic.unwrap_or_default().to_string(),
                    data: data.to_vec(),
                },
                EventPayload::Error(err) => SessionEvent::Error(err.to_string()),
                _ => return,
            };
            monitor.handle_event(&event);
        })
        .map_err(|err| SessionError::Start(err.to_string()))?;

        *client = Some(mqtt);
        Ok(())
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> Result<MessageId, SessionError> {
        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        let client = client
            .as_mut()
            .ok_or_else(|| SessionError::Publish("client not started".into()))?;

        // enqueue returns as soon as the message is in the outbox
        client
            .enqueue(topic, QoS::AtMostOnce, false, payload)
            .map_err(|err| SessionError::Publish(err.to_string()))
    }
}
