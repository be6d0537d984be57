use crate::reading::RawReading;

/// Reasons a sensor read can fail.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    #[error("checksum mismatch")]
    Checksum,
    #[error("timed out waiting for the sensor")]
    Timeout,
    #[error("sensor driver error: {0}")]
    Driver(String),
}

/// A driver capable of reading a humidity/temperature sensor.
///
/// Reads are timing sensitive; the caller is responsible for spacing them at least
/// [`crate::sampler::MIN_READ_INTERVAL`] apart.
pub trait SensorDriver {
    fn read(&mut self) -> Result<RawReading, SensorError>;
}

impl<T: SensorDriver + ?Sized> SensorDriver for Box<T> {
    fn read(&mut self) -> Result<RawReading, SensorError> {
        (**self).read()
    }
}
