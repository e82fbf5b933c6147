use rand::Rng;
use std::time::Duration;

use crate::config::BackoffConfig;

/// Delay schedule between attempts to launch a service whose command could
/// not be started.
#[derive(Debug, Clone)]
pub struct BackoffStrategy {
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
    multiplier: f64,
    attempt: u32,
    max_attempts: Option<u32>,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

impl BackoffStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        let strategy = Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_factor: config.jitter.clamp(0.0, 1.0),
            multiplier: config.multiplier.max(1.0),
            attempt: 0,
            max_attempts: None,
        };
        match config.max_attempts {
            Some(max) => strategy.with_max_attempts(max),
            None => strategy,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Returns the next delay, or `None` once the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(self.attempt as i32);
        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        let jitter_range = delay_ms * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        self.attempt = self.attempt.saturating_add(1);
        Some(Duration::from_millis((delay_ms + jitter).max(0.0) as u64))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_attempts.is_some_and(|max| self.attempt >= max)
    }
}
