//! Poll tiers and interval settings

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a caller is willing to wait on an accepted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollTier {
    /// Inside the collection run; timing out hands the job off
    Interactive,
    /// Reconciliation; timing out fails the request for good
    Background,
}

impl fmt::Display for PollTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interactive => f.write_str("interactive"),
            Self::Background => f.write_str("background"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    pub max_interval_ms: u64,
    pub interactive_deadline_ms: u64,
    /// Measured from the moment the provider accepted the job
    pub background_deadline_ms: u64,
    /// Hard limit on one poll request
    pub poll_timeout_ms: u64,
    /// Longest a single resume call keeps polling before returning
    pub resume_slice_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            multiplier: 1.5,
            max_interval_ms: 15_000,
            interactive_deadline_ms: 60_000,
            background_deadline_ms: 3_600_000,
            poll_timeout_ms: 10_000,
            resume_slice_ms: 30_000,
        }
    }
}

impl PollingConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn resume_slice(&self) -> Duration {
        Duration::from_millis(self.resume_slice_ms)
    }

    pub fn deadline(&self, tier: PollTier) -> Duration {
        match tier {
            PollTier::Interactive => Duration::from_millis(self.interactive_deadline_ms),
            PollTier::Background => Duration::from_millis(self.background_deadline_ms),
        }
    }

    /// Interval following `current`: grown by the multiplier, capped,
    /// and never shorter than `current`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let grown = current.mul_f64(self.multiplier.max(1.0));
        grown.min(self.max_interval()).max(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_interval_grows_and_caps() {
        let config = PollingConfig {
            initial_interval_ms: 100,
            multiplier: 2.0,
            max_interval_ms: 500,
            ..Default::default()
        };

        let mut interval = config.initial_interval();
        let mut seen = vec![interval];
        for _ in 0..5 {
            interval = config.next_interval(interval);
            seen.push(interval);
        }

        let ms: Vec<u128> = seen.iter().map(|d| d.as_millis()).collect();
        assert_eq!(ms, vec![100, 200, 400, 500, 500, 500]);
    }

    #[test]
    fn test_next_interval_never_decreases() {
        let config = PollingConfig {
            multiplier: 0.5,
            max_interval_ms: 50,
            ..Default::default()
        };

        let current = Duration::from_millis(200);
        assert_eq!(config.next_interval(current), current);
    }

    #[test]
    fn test_deadline_per_tier() {
        let config = PollingConfig::default();

        assert!(config.deadline(PollTier::Interactive) < config.deadline(PollTier::Background));
    }
}
