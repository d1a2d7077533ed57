//! Bounded exponential backoff for the reconnect path.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for reconnect backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Cap on the delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Multiplier applied to the delay on each consecutive failure.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Give up after this many consecutive failed attempts (`None` = never).
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_initial_backoff_ms() -> u64 { 500 }
fn default_max_backoff_ms() -> u64 { 60_000 }
fn default_multiplier() -> f64 { 2.0 }

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!("multiplier must be >= 1.0, got {}", self.multiplier));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(format!(
                "initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            ));
        }
        if self.max_attempts == Some(0) {
            return Err("max_attempts must be at least 1".into());
        }
        Ok(())
    }
}

/// Tracks consecutive reconnect failures and hands out the next delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, failures: 0 }
    }

    /// Consecutive failures recorded since the last [`reset`](Self::reset).
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failed attempt. Returns the delay before the next attempt,
    /// or `None` once `max_attempts` is used up.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if let Some(max) = self.config.max_attempts {
            if self.failures >= max {
                return None;
            }
        }
        Some(self.delay_for(self.failures))
    }

    /// Called once a subscription is active again.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Delay after the `failure`-th consecutive failure (1-based).
    fn delay_for(&self, failure: u32) -> Duration {
        let exp = failure.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.config.initial_backoff_ms as f64 * self.config.multiplier.powi(exp);
        let capped = base_ms.min(self.config.max_backoff_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(initial: u64, max: u64, attempts: Option<u32>) -> ReconnectConfig {
        ReconnectConfig {
            initial_backoff_ms: initial,
            max_backoff_ms: max,
            multiplier: 2.0,
            max_attempts: attempts,
        }
    }

    #[test]
    fn delays_double() {
        let mut backoff = Backoff::new(config(100, 30_000, None));
        assert_eq!(backoff.record_failure(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.record_failure(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.record_failure(), Some(Duration::from_millis(400)));
        assert_eq!(backoff.failures(), 3);
    }

    #[test]
    fn delay_capped_at_max() {
        let mut backoff = Backoff::new(config(100, 500, None));
        let mut last = Duration::ZERO;
        for _ in 0..200 {
            last = backoff.record_failure().unwrap();
            assert!(last <= Duration::from_millis(500), "delay {last:?} exceeds max");
        }
        assert_eq!(last, Duration::from_millis(500));
    }

    #[test]
    fn attempts_exhausted() {
        let mut backoff = Backoff::new(config(10, 100, Some(2)));
        assert!(backoff.record_failure().is_some());
        assert!(backoff.record_failure().is_none());
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = Backoff::new(config(100, 30_000, None));
        backoff.record_failure();
        backoff.record_failure();
        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.record_failure(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn validate_rejects_shrinking_multiplier() {
        let mut cfg = ReconnectConfig::default();
        cfg.multiplier = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        assert!(config(1_000, 10, None).validate().is_err());
        assert!(config(10, 1_000, Some(0)).validate().is_err());
        assert!(config(10, 1_000, Some(1)).validate().is_ok());
    }
}
