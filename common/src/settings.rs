//! Startup settings: network credentials, broker identity and sampling tunables.
//!
//! Loaded once before bring-up and treated as immutable afterwards.

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::payload::TOPIC;
use crate::supervisor::DEFAULT_MAX_RETRIES;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("missing setting `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Largest accepted `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 1_000;

/// Weakest access point security the station accepts when associating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiAuth {
    /// Any security, including none.
    #[default]
    Open,
    Wep,
    Wpa,
    Wpa2,
    WpaWpa2,
    Wpa3,
    Wpa2Wpa3,
}

impl FromStr for WifiAuth {
    type Err = SettingsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let auth = match value.trim().to_ascii_lowercase().as_str() {
            "open" | "none" => Self::Open,
            "wep" => Self::Wep,
            "wpa" => Self::Wpa,
            "wpa2" => Self::Wpa2,
            "wpa_wpa2" => Self::WpaWpa2,
            "wpa3" => Self::Wpa3,
            "wpa2_wpa3" => Self::Wpa2Wpa3,
            other => return Err(invalid("wifi_auth", &format!("unknown auth mode `{other}`"))),
        };
        Ok(auth)
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub wifi_auth: WifiAuth,
    pub broker_uri: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub sensor_pin: i32,
    pub read_interval_ms: u64,
    pub max_retries: u32,
    pub topic: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_password: String::new(),
            wifi_auth: WifiAuth::default(),
            broker_uri: String::new(),
            client_id: String::new(),
            username: String::new(),
            password: String::new(),
            sensor_pin: 4,
            read_interval_ms: 120_000,
            max_retries: DEFAULT_MAX_RETRIES,
            topic: TOPIC.to_string(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("wifi_ssid", &self.wifi_ssid)
            .field("wifi_password", &"<redacted>")
            .field("wifi_auth", &self.wifi_auth)
            .field("broker_uri", &self.broker_uri)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("sensor_pin", &self.sensor_pin)
            .field("read_interval_ms", &self.read_interval_ms)
            .field("max_retries", &self.max_retries)
            .field("topic", &self.topic)
            .finish()
    }
}

impl Settings {
    pub const ENV_PREFIX: &'static str = "CLIMATE_";

    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overridden by `CLIMATE_*` environment variables, e.g. `CLIMATE_BROKER_URI`.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(format!("{}{name}", Self::ENV_PREFIX)).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        for (name, field) in [
            ("WIFI_SSID", &mut settings.wifi_ssid),
            ("WIFI_PASSWORD", &mut settings.wifi_password),
            ("BROKER_URI", &mut settings.broker_uri),
            ("CLIENT_ID", &mut settings.client_id),
            ("USERNAME", &mut settings.username),
            ("PASSWORD", &mut settings.password),
            ("TOPIC", &mut settings.topic),
        ] {
            if let Some(value) = lookup(name) {
                *field = value;
            }
        }

        if let Some(value) = lookup("WIFI_AUTH") {
            settings.wifi_auth = value.parse()?;
        }
        if let Some(value) = lookup("SENSOR_PIN") {
            settings.sensor_pin = parse_field("sensor_pin", &value)?;
        }
        if let Some(value) = lookup("READ_INTERVAL_MS") {
            settings.read_interval_ms = parse_field("read_interval_ms", &value)?;
        }
        if let Some(value) = lookup("MAX_RETRIES") {
            settings.max_retries = parse_field("max_retries", &value)?;
        }

        Ok(settings)
    }

    /// Parses a firmware secrets file: one `NAME value` pair per line, values optionally
    /// double-quoted, `#` starting a comment line.
    pub fn from_secrets(text: &str) -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, value) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let value = unquote(value.trim());

            match name {
                "CONFIG_ESP_WIFI_SSID" => settings.wifi_ssid = value.to_string(),
                "CONFIG_ESP_WIFI_PASSWORD" => settings.wifi_password = value.to_string(),
                "CONFIG_ESP_WIFI_AUTH_MODE" => settings.wifi_auth = value.parse()?,
                "CONFIG_MQTT_CLIENT_URI" => settings.broker_uri = value.to_string(),
                "CONFIG_MQTT_CLIENT_ID" => settings.client_id = value.to_string(),
                "CONFIG_MQTT_USERNAME" => settings.username = value.to_string(),
                "CONFIG_MQTT_PASSWORD" => settings.password = value.to_string(),
                "CONFIG_ESP_MAXIMUM_RETRY" => {
                    settings.max_retries = parse_field("max_retries", value)?;
                }
                other => debug!("ignoring unknown secret {other}"),
            }
        }

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.wifi_ssid.is_empty() {
            return Err(SettingsError::Missing("wifi_ssid"));
        }
        if self.wifi_ssid.len() > 32 {
            return Err(invalid("wifi_ssid", "longer than 32 bytes"));
        }
        if self.wifi_password.len() > 64 {
            return Err(invalid("wifi_password", "longer than 64 bytes"));
        }
        if self.broker_uri.is_empty() {
            return Err(SettingsError::Missing("broker_uri"));
        }
        const SCHEMES: [&str; 4] = ["mqtt://", "mqtts://", "ws://", "wss://"];
        if !SCHEMES.iter().any(|scheme| self.broker_uri.starts_with(scheme)) {
            return Err(invalid("broker_uri", "expected an mqtt, mqtts, ws or wss uri"));
        }
        if self.topic.is_empty() {
            return Err(SettingsError::Missing("topic"));
        }
        if self.topic.contains(['+', '#']) {
            return Err(invalid("topic", "wildcards cannot be published to"));
        }
        if self.sensor_pin < 0 {
            return Err(invalid("sensor_pin", "must not be negative"));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(invalid(
                "max_retries",
                &format!("must be at most {MAX_RETRIES_LIMIT}"),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> SettingsError {
    SettingsError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn parse_field<T>(field: &'static str, value: &str) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| SettingsError::Invalid {
        field,
        reason: err.to_string(),
    })
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|value| value.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> Settings {
        Settings {
            wifi_ssid: "home".into(),
            wifi_password: "hunter22".into(),
            broker_uri: "mqtt://broker.local:1883".into(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.sensor_pin, 4);
        assert_eq!(settings.read_interval_ms, 120_000);
        assert_eq!(settings.max_retries, 10);
        assert_eq!(settings.topic, "temperature_humidity");
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let settings = Settings::from_json(
            r#"{ "wifi_ssid": "home", "broker_uri": "mqtt://10.0.0.2", "max_retries": 3 }"#,
        )
        .unwrap();

        assert_eq!(settings.wifi_ssid, "home");
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.read_interval_ms, 120_000);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            Settings::from_json("{ nope"),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars = HashMap::from([
            ("WIFI_SSID", "attic"),
            ("BROKER_URI", "mqtts://example.org"),
            ("READ_INTERVAL_MS", "5000"),
        ]);
        let settings =
            Settings::from_lookup(|name| vars.get(name).map(|value| value.to_string())).unwrap();

        assert_eq!(settings.wifi_ssid, "attic");
        assert_eq!(settings.broker_uri, "mqtts://example.org");
        assert_eq!(settings.read_interval_ms, 5000);
        assert_eq!(settings.sensor_pin, 4);
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let result = Settings::from_lookup(|name| (name == "MAX_RETRIES").then(|| "ten".into()));
        assert!(matches!(
            result,
            Err(SettingsError::Invalid {
                field: "max_retries",
                ..
            })
        ));
    }

    #[test]
    fn secrets_file() {
        let text = r#"
            # generated by hand
            CONFIG_ESP_WIFI_SSID "home net"
            CONFIG_ESP_WIFI_PASSWORD "pa ss"
            CONFIG_MQTT_CLIENT_URI "mqtt://broker.local"
            CONFIG_MQTT_CLIENT_ID "node-1"
            CONFIG_MQTT_USERNAME user
            CONFIG_MQTT_PASSWORD "secret"
            CONFIG_ESP_WIFI_AUTH_MODE "wpa2_wpa3"
            CONFIG_SOMETHING_ELSE 1
        "#;
        let settings = Settings::from_secrets(text).unwrap();

        assert_eq!(settings.wifi_ssid, "home net");
        assert_eq!(settings.wifi_password, "pa ss");
        assert_eq!(settings.broker_uri, "mqtt://broker.local");
        assert_eq!(settings.client_id, "node-1");
        assert_eq!(settings.username, "user");
        assert_eq!(settings.password, "secret");
        assert_eq!(settings.wifi_auth, WifiAuth::Wpa2Wpa3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn auth_mode_defaults_to_open() {
        assert_eq!(Settings::default().wifi_auth, WifiAuth::Open);

        let settings = Settings::from_json(r#"{ "wifi_auth": "wpa3" }"#).unwrap();
        assert_eq!(settings.wifi_auth, WifiAuth::Wpa3);

        let result = Settings::from_lookup(|name| (name == "WIFI_AUTH").then(|| "wpa4".into()));
        assert!(matches!(
            result,
            Err(SettingsError::Invalid {
                field: "wifi_auth",
                ..
            })
        ));
    }

    #[test]
    fn retry_budget_is_capped() {
        let mut settings = valid();
        settings.max_retries = MAX_RETRIES_LIMIT;
        assert!(settings.validate().is_ok());

        let settings = Settings::from_json(
            r#"{ "wifi_ssid": "home", "broker_uri": "mqtt://10.0.0.2", "max_retries": 200000 }"#,
        )
        .unwrap();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid {
                field: "max_retries",
                ..
            })
        ));
    }

    #[test]
    fn validation() {
        assert!(valid().validate().is_ok());

        let mut settings = valid();
        settings.wifi_ssid.clear();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Missing("wifi_ssid"))
        ));

        let mut settings = valid();
        settings.broker_uri = "http://broker".into();
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.topic = "sensors/#".into();
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.wifi_ssid = "x".repeat(33);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn debug_output_hides_passwords() {
        let printed = format!("{:?}", valid());
        assert!(printed.contains("home"));
        assert!(!printed.contains("hunter22"));
    }
}
