/// A reading as delivered by the sensor driver, in tenths of a percent and tenths of a degree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawReading {
    pub humidity_tenths: i16,
    pub temperature_tenths: i16,
}

impl RawReading {
    pub fn new(humidity_tenths: i16, temperature_tenths: i16) -> Self {
        Self {
            humidity_tenths,
            temperature_tenths,
        }
    }
}

/// One sampling cycle's result in engineering units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    pub humidity_percent: f32,
    pub temperature_celsius: f32,
    /// `false` when the sensor could not be read this cycle. The values are then meaningless.
    pub valid: bool,
}

impl Reading {
    pub fn new(humidity_percent: f32, temperature_celsius: f32) -> Self {
        Self {
            humidity_percent,
            temperature_celsius,
            valid: true,
        }
    }

    /// Placeholder for a cycle where the sensor failed.
    pub fn invalid() -> Self {
        Self {
            humidity_percent: f32::NAN,
            temperature_celsius: f32::NAN,
            valid: false,
        }
    }
}

impl From<RawReading> for Reading {
    fn from(raw: RawReading) -> Self {
        Self::new(
            f32::from(raw.humidity_tenths) / 10.0,
            f32::from(raw.temperature_tenths) / 10.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_are_scaled_to_units() {
        let reading = Reading::from(RawReading::new(512, 215));

        assert_eq!(reading.humidity_percent, 51.2);
        assert_eq!(reading.temperature_celsius, 21.5);
        assert!(reading.valid);
    }

    #[test]
    fn scaling_matches_division_for_extremes() {
        for (h, t) in [(0, 0), (1000, -400), (i16::MAX, i16::MIN), (-1, 1), (999, 800)] {
            let reading = Reading::from(RawReading::new(h, t));
            assert_eq!(reading.humidity_percent, h as f32 / 10.0);
            assert_eq!(reading.temperature_celsius, t as f32 / 10.0);
        }
    }

    #[test]
    fn invalid_reading_carries_no_numbers() {
        let reading = Reading::invalid();

        assert!(!reading.valid);
        assert!(reading.humidity_percent.is_nan());
        assert!(reading.temperature_celsius.is_nan());
    }
}
