//! Exponential backoff between restart attempts.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Doubling backoff clamped to `[min, max]`, with optional jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    min: Duration,
    max: Duration,
    jitter: f64,
}

impl BackoffPolicy {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self { min, max, jitter: 0.0 }
    }

    /// Add up to `ratio` of the delay as random jitter. The result stays clamped.
    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter = ratio.clamp(0.0, 0.5);
        self
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.min, config.max).with_jitter(config.jitter)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay to use after `previous`: `min(previous * 2, max)`, never below `min`.
    pub fn next_delay(&self, previous: Duration) -> Duration {
        let doubled = previous.saturating_mul(2);
        self.clamp(doubled)
    }

    /// Apply jitter to a delay the controller is about to wait out.
    pub fn jittered(&self, delay: Duration) -> Duration {
        let delay = self.clamp(delay);
        if self.jitter <= 0.0 {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.jitter;
        let extra = rand::thread_rng().gen_range(0.0..=spread);
        self.clamp(delay + Duration::from_secs_f64(extra))
    }

    fn clamp(&self, delay: Duration) -> Duration {
        delay.clamp(self.min, self.max)
    }
}
