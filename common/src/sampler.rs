//! The periodic sensor task.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::flags::EventFlags;
use crate::publisher::ReadingHandler;
use crate::reading::Reading;
use crate::sensor::SensorDriver;

/// The sensor produces garbage when polled more often than this.
pub const MIN_READ_INTERVAL: Duration = Duration::from_millis(2000);

const STOP: u32 = 1 << 0;

/// What to do with a cycle whose sensor read failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and do not call the handler.
    #[default]
    Skip,
    /// Call the handler with [`Reading::invalid`].
    Forward,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplingConfig {
    pin: i32,
    interval: Duration,
    failure_policy: FailurePolicy,
    stack_size: Option<usize>,
}

impl SamplingConfig {
    /// The interval is raised to [`MIN_READ_INTERVAL`] if `requested` is shorter.
    pub fn new(pin: i32, requested: Duration) -> Self {
        let interval = requested.max(MIN_READ_INTERVAL);
        if interval != requested {
            warn!(
                target: "sampler",
                "read interval {requested:?} is below the sensor minimum, using {interval:?}"
            );
        }
        Self {
            pin,
            interval,
            failure_policy: FailurePolicy::default(),
            stack_size: None,
        }
    }

    pub fn from_millis(pin: i32, requested_ms: u64) -> Self {
        Self::new(pin, Duration::from_millis(requested_ms))
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Stack size of the task thread; the platform default when unset.
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    pub fn pin(&self) -> i32 {
        self.pin
    }

    /// Time between the end of one cycle and the start of the next.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }
}

/// A thread that reads the sensor, forwards the result and waits, until stopped.
///
/// The handler runs on this thread. Stopping (or dropping) the task wakes its inter-cycle
/// wait and joins the thread; a cycle already in progress finishes first. Must not be
/// stopped from inside its own handler.
pub struct SamplingTask {
    config: SamplingConfig,
    stop: Arc<EventFlags>,
    handle: Option<JoinHandle<()>>,
}

impl SamplingTask {
    const NAME: &'static str = "dht_sensor";

    pub fn start<D, H>(config: SamplingConfig, driver: D, handler: H) -> Result<Self>
    where
        D: SensorDriver + Send + 'static,
        H: ReadingHandler + 'static,
    {
        let stop = Arc::new(EventFlags::new());

        let mut builder = thread::Builder::new().name(Self::NAME.to_string());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let handle = {
            let config = config.clone();
            let stop = stop.clone();
            builder
                .spawn(move || Self::run(&config, driver, &handler, &stop))
                .map_err(|source| Error::Spawn {
                    name: Self::NAME,
                    source,
                })?
        };

        Ok(Self {
            config,
            stop,
            handle: Some(handle),
        })
    }

    fn run<D, H>(config: &SamplingConfig, mut driver: D, handler: &H, stop: &EventFlags)
    where
        D: SensorDriver,
        H: ReadingHandler + ?Sized,
    {
        info!(
            target: "sampler",
            "starting sensor task on pin {}, every {:?}",
            config.pin, config.interval
        );

        loop {
            Self::run_cycle(config, &mut driver, handler);

            if stop.wait_until_set(STOP, Some(config.interval)) {
                break;
            }
        }

        info!(target: "sampler", "sensor task stopped");
    }

    /// One read-and-forward step, without the wait. Returns what was handed to `handler`.
    pub fn run_cycle<D, H>(config: &SamplingConfig, driver: &mut D, handler: &H) -> Option<Reading>
    where
        D: SensorDriver + ?Sized,
        H: ReadingHandler + ?Sized,
    {
        debug!(target: "sampler", "=== reading sensor ===");

        let reading = match driver.read() {
            Ok(raw) => {
                let reading = Reading::from(raw);
                info!(
                    target: "sampler",
                    "humidity: {:.1}% temp: {:.1}C",
                    reading.humidity_percent, reading.temperature_celsius
                );
                reading
            }
            Err(err) => {
                warn!(target: "sampler", "could not read data from sensor: {err}");
                match config.failure_policy {
                    FailurePolicy::Skip => return None,
                    FailurePolicy::Forward => Reading::invalid(),
                }
            }
        };

        handler.on_reading(&reading);
        Some(reading)
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancels the task and waits for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.signal(STOP);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(target: "sampler", "sensor task panicked");
            }
        }
    }
}

impl Drop for SamplingTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::RawReading;
    use crate::sensor::SensorError;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    struct Scripted(VecDeque<Result<RawReading, SensorError>>);

    impl SensorDriver for Scripted {
        fn read(&mut self) -> Result<RawReading, SensorError> {
            self.0.pop_front().unwrap_or(Err(SensorError::Timeout))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Reading>>);

    impl ReadingHandler for Recorder {
        fn on_reading(&self, reading: &Reading) {
            self.0.lock().unwrap().push(*reading);
        }
    }

    #[test]
    fn interval_has_a_floor() {
        for requested in [0, 1, 500, 1999] {
            assert_eq!(
                SamplingConfig::from_millis(4, requested).interval(),
                MIN_READ_INTERVAL
            );
        }
        for requested in [2000, 2001, 120_000] {
            assert_eq!(
                SamplingConfig::from_millis(4, requested).interval(),
                Duration::from_millis(requested)
            );
        }
    }

    #[derive(Default)]
    struct Timestamps(Mutex<Vec<Instant>>);

    impl ReadingHandler for Timestamps {
        fn on_reading(&self, _reading: &Reading) {
            self.0.lock().unwrap().push(Instant::now());
        }
    }

    #[test]
    fn running_task_never_reads_faster_than_the_floor() {
        let stamps = Arc::new(Timestamps::default());
        let driver = Scripted(VecDeque::from([
            Ok(RawReading::new(500, 200)),
            Ok(RawReading::new(501, 201)),
        ]));
        let config = SamplingConfig::from_millis(4, 0);

        let task = SamplingTask::start(config, driver, stamps.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while stamps.0.lock().unwrap().len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        task.stop();

        let stamps = stamps.0.lock().unwrap();
        assert!(stamps.len() >= 2);
        assert!(stamps[1] - stamps[0] >= MIN_READ_INTERVAL);
    }

    #[test]
    fn successful_read_is_forwarded() {
        let config = SamplingConfig::from_millis(4, 2000);
        let mut driver = Scripted(VecDeque::from([Ok(RawReading::new(455, -12))]));
        let recorder = Recorder::default();

        let reading = SamplingTask::run_cycle(&config, &mut driver, &recorder);

        assert_eq!(reading, Some(Reading::new(45.5, -1.2)));
        assert_eq!(*recorder.0.lock().unwrap(), vec![Reading::new(45.5, -1.2)]);
    }

    #[test]
    fn failed_read_is_skipped_by_default() {
        let config = SamplingConfig::from_millis(4, 2000);
        let mut driver = Scripted(VecDeque::from([Err(SensorError::Checksum)]));
        let recorder = Recorder::default();

        assert_eq!(SamplingTask::run_cycle(&config, &mut driver, &recorder), None);
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_read_can_be_forwarded() {
        let config =
            SamplingConfig::from_millis(4, 2000).with_failure_policy(FailurePolicy::Forward);
        let mut driver = Scripted(VecDeque::new());
        let recorder = Recorder::default();

        SamplingTask::run_cycle(&config, &mut driver, &recorder);

        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].valid);
    }

    #[test]
    fn stop_interrupts_the_wait() {
        let recorder = Arc::new(Recorder::default());
        let driver = Scripted(VecDeque::from([Ok(RawReading::new(500, 200))]));
        let config = SamplingConfig::from_millis(4, 60_000);

        let task = SamplingTask::start(config, driver, recorder.clone()).unwrap();
        assert!(task.is_running());

        let deadline = Instant::now() + Duration::from_secs(5);
        while recorder.0.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let started = Instant::now();
        task.stop();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }
}
