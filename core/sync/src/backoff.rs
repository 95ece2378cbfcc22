//! Exponential backoff policy for replay retries.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for retry backoff.
///
/// The delay before the n-th retry of an operation is
/// `base * 2^retry_count`, capped at `max`. Computed by the sync engine
/// before each retry; the gateway never retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base: Duration,
    /// Cap for exponential growth.
    pub max: Duration,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl BackoffConfig {
    /// Create a new backoff configuration with jitter enabled.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: true,
        }
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Zero-delay configuration, for tests.
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            jitter: false,
        }
    }

    /// Calculate the delay before retrying an operation that has already
    /// failed `retry_count` times.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponential =
            self.base.as_millis() as f64 * 2f64.powi(retry_count.min(i32::MAX as u32) as i32);
        let capped = exponential.min(self.max.as_millis() as f64);

        let final_delay = if self.jitter {
            // Random jitter of +/- 25%.
            let jitter_factor = 0.75 + (rand::random::<f64>() * 0.5);
            capped * jitter_factor
        } else {
            capped
        };

        Duration::from_millis(final_delay as u64)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}
