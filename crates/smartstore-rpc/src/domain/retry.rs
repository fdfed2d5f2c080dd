//! Retry policy and the per-call retry state machine.
//!
//! ```text
//!   Attempting ──success──────────────────────────▶ Done
//!       │
//!       ├──retryable failure, attempts left──▶ Waiting ──delay elapsed──▶ Attempting
//!       │
//!       └──fatal failure, or attempts exhausted──▶ Failed
//! ```
//!
//! The delay before attempt `n + 1` is `base_delay * multiplier^(n - 1)`,
//! capped at `max_delay`. A multiplier of 1 gives a constant delay.

use crate::domain::config::RetryConfig;
use crate::domain::envelope::Envelope;
use crate::domain::error::RpcError;
use std::time::Duration;

/// Backoff schedule and attempt bound for one logical call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: u32,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Exponential policy (x2) capped at ten seconds or `base_delay`, whichever is larger.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: 2,
            max_delay: base_delay.max(Duration::from_secs(10)),
        }
    }

    /// Same delay before every retry.
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            multiplier: 1,
            max_delay: delay,
        }
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self::constant(1, Duration::ZERO)
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            multiplier: config.multiplier.max(1),
            max_delay: config.max_delay.max(config.base_delay),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait before `attempt` (1-based). Zero for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.checked_pow(attempt - 2).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delays before attempts `2..=max_attempts`, in order.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (2..=self.max_attempts).map(|attempt| self.delay_before(attempt))
    }

    /// Sum of every backoff delay when all attempts fail.
    pub fn total_backoff(&self) -> Duration {
        self.schedule().sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Classification of one attempt's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Envelope with `success: true`
    Success,
    /// Transport failure or timeout
    Retryable,
    /// Anything else: returned to the caller as-is
    Fatal,
}

impl Outcome {
    pub fn of(result: &Result<Envelope, RpcError>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(e) if e.is_retryable() => Outcome::Retryable,
            Err(_) => Outcome::Fatal,
        }
    }
}

/// Retry state of one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt `attempt` is in flight
    Attempting { attempt: u32 },
    /// Backing off before `next_attempt`
    Waiting { next_attempt: u32, delay: Duration },
    /// Success returned to the caller
    Done,
    /// Last error returned to the caller
    Failed,
}

impl RetryState {
    /// Initial state of every call.
    pub fn start() -> Self {
        RetryState::Attempting { attempt: 1 }
    }

    /// Record the outcome of the attempt in flight.
    ///
    /// Only meaningful in `Attempting`; other states are returned unchanged.
    pub fn record(self, policy: &RetryPolicy, outcome: Outcome) -> Self {
        let RetryState::Attempting { attempt } = self else {
            return self;
        };
        match outcome {
            Outcome::Success => RetryState::Done,
            Outcome::Retryable if attempt < policy.max_attempts() => RetryState::Waiting {
                next_attempt: attempt + 1,
                delay: policy.delay_before(attempt + 1),
            },
            Outcome::Retryable | Outcome::Fatal => RetryState::Failed,
        }
    }

    /// The backoff delay has elapsed.
    pub fn resume(self) -> Self {
        match self {
            RetryState::Waiting { next_attempt, .. } => RetryState::Attempting {
                attempt: next_attempt,
            },
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::Done | RetryState::Failed)
    }
}
