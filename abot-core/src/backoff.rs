// ABOUTME: Exponential backoff between backend consume() restarts
// ABOUTME: Delays double from the initial value up to a cap; a delivered event resets them

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff settings for restarting a failed backend stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first restart, in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound for the delay, in milliseconds
    pub max_delay_ms: u64,
    /// Factor applied to the delay after each consecutive failure
    pub multiplier: u32,
    /// Consecutive failures tolerated before the backend is given up (0 = unlimited)
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2,
            max_retries: 0,
        }
    }
}

impl BackoffConfig {
    /// Restart immediately, forever.
    pub fn immediate() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1,
            max_retries: 0,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Running backoff state for one supervised backend.
#[derive(Debug)]
pub struct BackoffState {
    config: BackoffConfig,
    consecutive_failures: u32,
    current_delay: Duration,
}

impl BackoffState {
    pub fn new(config: BackoffConfig) -> Self {
        let current_delay = config.initial_delay();
        Self {
            config,
            consecutive_failures: 0,
            current_delay,
        }
    }

    /// The backend delivered an event; start over from the initial delay.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = self.config.initial_delay();
    }

    /// Delay to wait before the next restart, or `None` once retries are exhausted.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.consecutive_failures += 1;

        if self.config.max_retries > 0 && self.consecutive_failures > self.config.max_retries {
            return None;
        }

        let delay = self.current_delay;
        self.current_delay = std::cmp::min(
            self.current_delay.saturating_mul(self.config.multiplier),
            self.config.max_delay(),
        );
        Some(delay)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}
