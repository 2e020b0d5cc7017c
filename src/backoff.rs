//! Reconnect delay policy.

use std::time::Duration;

/// Delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);
/// Upper bound of the reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);
/// Growth factor applied after every failed attempt.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// delay of the first retry
    pub base_delay: Duration,
    /// cap of the delay
    pub max_delay: Duration,
    /// growth factor, values below 1 are treated as 1
    pub multiplier: f64,
    /// give up after this many attempts, `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_attempts: None,
        }
    }
}

impl BackoffPolicy {
    /// Delay that follows `current` after one more failure.
    ///
    /// Never smaller than `current`, never larger than `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let max = self.max_delay.as_secs_f64();
        let next = current.as_secs_f64() * self.multiplier.max(1.0);

        if !next.is_finite() || next >= max {
            return self.max_delay.max(current);
        }

        Duration::from_secs_f64(next).max(current)
    }

    /// Delay used for the `n`th consecutive failure, counting from 1.
    pub fn delay_for_attempt(&self, n: u32) -> Duration {
        let mut delay = self.base_delay.min(self.max_delay);
        for _ in 1..n {
            let next = self.next_delay(delay);
            if next == delay {
                break;
            }
            delay = next;
        }
        delay
    }
}

/// Progress of the current failure run.
#[derive(Debug, Clone)]
pub struct BackoffState {
    policy: BackoffPolicy,
    attempt: u32,
    current_delay: Duration,
}

impl BackoffState {
    /// Fresh state, first delay is `policy.base_delay`.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            current_delay: policy.base_delay.min(policy.max_delay),
        }
    }

    /// Called on every confirmed successful open.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_delay = self.policy.base_delay.min(self.policy.max_delay);
    }

    /// Take the delay for the next retry and grow the state.
    ///
    /// Returns the attempt number with the delay to wait before it, or
    /// `None` when the configured attempt limit is reached.
    pub fn advance(&mut self) -> Option<(u32, Duration)> {
        if let Some(max) = self.policy.max_attempts {
            if self.attempt >= max {
                return None;
            }
        }

        let delay = self.current_delay;
        self.attempt += 1;
        self.current_delay = self.policy.next_delay(self.current_delay);

        Some((self.attempt, delay))
    }

    /// Attempts made in the current failure run.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay the next retry will wait.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// The policy this state follows.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}
