//! Synchronizer configuration

use std::time::Duration;

/// Epoch synchronizer and health tracking options
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a bucket stays open after its first observation
    pub wait_time: Duration,

    /// Output sampling interval (zero = every epoch)
    pub sampling: Duration,

    /// Hard limit on open + pending buckets
    pub max_buckets: usize,

    /// Period of the bucket closing check
    pub check_interval: Duration,

    /// Expected observation rate in Hz (None disables health tracking)
    pub obs_rate: Option<f64>,

    /// Silence after which a stream is in outage
    pub failure_threshold: Duration,

    /// Valid data needed before a stream is back to normal
    pub recovery_threshold: Duration,

    /// Capacity of the synchronized epoch output channel
    pub output_capacity: usize,

    /// Capacity of the channel from pipelines to the collector
    pub input_capacity: usize,

    /// Health events kept while the consumer is not taking them
    pub max_events: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_secs(5),
            sampling: Duration::ZERO,
            max_buckets: 64,
            check_interval: Duration::from_secs(1),
            obs_rate: None,
            failure_threshold: Duration::from_secs(15 * 60),
            recovery_threshold: Duration::from_secs(5 * 60),
            output_capacity: 256,
            input_capacity: 1024,
            max_events: 256,
        }
    }
}

impl SyncConfig {
    /// Set the wait time
    pub fn wait_time(mut self, wait: Duration) -> Self {
        self.wait_time = wait;
        self
    }

    /// Set the sampling interval
    pub fn sampling(mut self, interval: Duration) -> Self {
        self.sampling = interval;
        self
    }

    /// Set the bucket bound (at least one)
    pub fn max_buckets(mut self, max: usize) -> Self {
        self.max_buckets = max.max(1);
        self
    }

    /// Set the check interval
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Enable health tracking for streams at `hz` observations per second
    pub fn obs_rate(mut self, hz: f64) -> Self {
        self.obs_rate = (hz > 0.0).then_some(hz);
        self
    }

    /// Set the failure threshold
    pub fn failure_threshold(mut self, threshold: Duration) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the recovery threshold
    pub fn recovery_threshold(mut self, threshold: Duration) -> Self {
        self.recovery_threshold = threshold;
        self
    }

    /// Set the output channel capacity
    pub fn output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity.max(1);
        self
    }

    /// Set the pipeline to collector channel capacity
    pub fn input_capacity(mut self, capacity: usize) -> Self {
        self.input_capacity = capacity.max(1);
        self
    }

    /// Set the health event bound (at least one)
    pub fn max_events(mut self, max: usize) -> Self {
        self.max_events = max.max(1);
        self
    }

    pub fn health_enabled(&self) -> bool {
        self.obs_rate.is_some()
    }

    /// Silence that counts as a failure: the failure threshold, but never
    /// less than one expected observation interval. Rates too low for a
    /// `Duration` interval saturate.
    pub fn silence_limit(&self) -> Duration {
        let interval = self
            .obs_rate
            .map(|hz| Duration::try_from_secs_f64(1.0 / hz).unwrap_or(Duration::MAX))
            .unwrap_or(Duration::ZERO);
        self.failure_threshold.max(interval)
    }
}
