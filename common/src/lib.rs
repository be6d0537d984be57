//! Portable core of a climate sensor node: periodic sampling, link supervision and
//! publish gating. Platform crates supply the sensor driver, the transport link and the
//! broker session.

pub mod bringup;
pub mod error;
pub mod flags;
pub mod payload;
pub mod publisher;
pub mod reading;
pub mod sampler;
pub mod sensor;
pub mod session;
pub mod settings;
pub mod supervisor;

pub use bringup::BringUp;
pub use error::{Error, Result};
pub use flags::{ConnectionState, EventFlags, Link};
pub use publisher::{PublishOutcome, Publisher, ReadingHandler};
pub use reading::{RawReading, Reading};
pub use sampler::{FailurePolicy, SamplingConfig, SamplingTask, MIN_READ_INTERVAL};
pub use sensor::{SensorDriver, SensorError};
pub use session::{MessageId, SessionClient, SessionError, SessionEvent, SessionMonitor};
pub use settings::{Settings, SettingsError, WifiAuth, MAX_RETRIES_LIMIT};
pub use supervisor::{
    ConnectionSupervisor, LinkStatus, RetryCounter, TransportError, TransportEvent,
    TransportLink,
};
