use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::types::constants::{DEFAULT_RECONNECT_BASE, DEFAULT_RECONNECT_MAX};

/// Delay before reconnect attempt number `attempt` (0-based)
pub trait BackoffPolicy: Send + Sync + Debug {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Capped exponential backoff with equal jitter.
///
/// The un-jittered delay is `base * 2^attempt`, capped at `max`; with jitter enabled the
/// actual delay is drawn uniformly from the upper half of that value.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: true,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_RECONNECT_BASE),
            Duration::from_millis(DEFAULT_RECONNECT_MAX),
        )
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if !self.jitter {
            return ceiling;
        }
        let ceiling_ms = ceiling.as_millis() as u64;
        let half = ceiling_ms / 2;
        Duration::from_millis(rand::thread_rng().gen_range(half..=ceiling_ms))
    }
}

/// Fixed table of delays; the last entry repeats once the table is exhausted
#[derive(Debug, Clone)]
pub struct IntervalBackoff {
    intervals: Vec<u64>,
}

impl IntervalBackoff {
    pub fn new(intervals: Vec<u64>) -> Self {
        Self { intervals }
    }
}

impl BackoffPolicy for IntervalBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let delay = self
            .intervals
            .get(attempt as usize)
            .or_else(|| self.intervals.last())
            .copied()
            .unwrap_or(DEFAULT_RECONNECT_MAX);
        Duration::from_millis(delay)
    }
}

/// Reconnect timer state: counts attempts since the last successful connection
#[derive(Debug, Clone)]
pub struct Timer {
    attempts: u32,
    policy: Arc<dyn BackoffPolicy>,
}

impl Timer {
    pub fn new(policy: Arc<dyn BackoffPolicy>) -> Self {
        Self {
            attempts: 0,
            policy,
        }
    }

    /// Get the next delay duration
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Reset the timer
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(Arc::new(ExponentialBackoff::default()))
    }
}
