use std::time::Duration;

use rand::Rng;

use crate::utils::constants::{DEFAULT_BASE_DELAY_MS, DEFAULT_JITTER_RATIO, DEFAULT_MAX_DELAY_MS, DEFAULT_MULTIPLIER};

/// Exponential backoff policy used between failed refresh attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    /// invariant: >= base_delay
    pub max_delay: Duration,
    /// invariant: >= 1.0
    pub multiplier: f64,
    /// extra random delay, as a fraction of the computed delay (0.0..=1.0),
    /// never pushing past the next attempt's delay
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            multiplier: DEFAULT_MULTIPLIER,
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// Jittered delay for retry `attempt`. Never exceeds the un-jittered delay
    /// of the following attempt, so the jittered schedule is non-decreasing.
    fn with_jitter(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter_ratio <= 0.0 || delay.is_zero() {
            return delay;
        }
        let ceiling = self.delay_for(attempt.saturating_add(1)).max(delay);
        let extra = delay.as_secs_f64() * rand::thread_rng().gen_range(0.0..=self.jitter_ratio);
        (delay + Duration::from_secs_f64(extra)).min(ceiling)
    }
}

/// Consecutive failure counter driving [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, failures: 0 }
    }

    /// Record one more failure and return how long to wait before the retry.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.policy.with_jitter(self.failures)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}
