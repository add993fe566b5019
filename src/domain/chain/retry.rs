//! Retry backoff for a provider binding

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff between retries of the same binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Spread each delay over +/-25% of its nominal value
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_initial_delay(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    pub fn with_max_delay(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Nominal delay before retry number `retry` (0-indexed), capped
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(retry as i32);
        let delay_ms = delay.min(self.max_delay_ms as f64).max(0.0) as u64;

        Duration::from_millis(delay_ms)
    }

    /// Delay actually slept before retry number `retry`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let nominal = self.nominal_delay(retry);

        if !self.jitter {
            return nominal;
        }

        let factor = rand::random::<f64>() * 0.5 + 0.75;
        Duration::from_millis((nominal.as_millis() as f64 * factor) as u64)
    }
}
