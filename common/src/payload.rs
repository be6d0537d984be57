//! Wire format of published readings.

use serde::{Deserialize, Serialize};

use crate::reading::Reading;

/// Topic every reading is published to.
pub const TOPIC: &str = "temperature_humidity";

/// The JSON body of a published reading.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureWithHumidity {
    pub temperature_in_celsius: f32,
    pub humidity_in_percent: f32,
}

impl From<&Reading> for TemperatureWithHumidity {
    fn from(reading: &Reading) -> Self {
        Self {
            temperature_in_celsius: reading.temperature_celsius,
            humidity_in_percent: reading.humidity_percent,
        }
    }
}

/// Encodes `reading`, or returns `None` when it cannot be represented.
///
/// serde_json writes `null` for NaN and infinities, so non-finite values never reach it.
pub fn encode(reading: &Reading) -> Option<Vec<u8>> {
    if !reading.temperature_celsius.is_finite() || !reading.humidity_percent.is_finite() {
        return None;
    }
    serde_json::to_vec(&TemperatureWithHumidity::from(reading)).ok()
}

pub fn decode(payload: &[u8]) -> Result<TemperatureWithHumidity, serde_json::Error> {
    serde_json::from_slice(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_on_the_wire() {
        let payload = encode(&Reading::new(51.2, 21.5)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(value["temperatureInCelsius"], serde_json::json!(21.5));
        assert!(value["humidityInPercent"].is_number());
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let payload = encode(&Reading::new(51.2, -4.3)).unwrap();
        let decoded = decode(&payload).unwrap();

        assert_eq!(decoded.humidity_in_percent, 51.2);
        assert_eq!(decoded.temperature_in_celsius, -4.3);
    }

    #[test]
    fn non_finite_values_yield_no_payload() {
        assert_eq!(encode(&Reading::new(f32::NAN, 20.0)), None);
        assert_eq!(encode(&Reading::new(40.0, f32::INFINITY)), None);
        assert_eq!(encode(&Reading::new(40.0, f32::NEG_INFINITY)), None);
        assert_eq!(encode(&Reading::invalid()), None);
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(decode(b"{\"temperatureInCelsius\": 1.0}").is_err());
        assert!(decode(b"not json").is_err());
    }
}
