// Copyright (c) 2026 Roman Barinov <rbarinov@gmail.com>
// Licensed under the FSL-1.1-NC.

use std::time::Duration;

/// Exponential backoff between reconnection attempts: `base * 2^attempt`,
/// capped at `cap`. Pure and deterministic; the supervisor owns the timer.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1_000),
            cap: Duration::from_millis(30_000),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before the next try. `attempt` is the consecutive-failure count
    /// before it is incremented for the upcoming attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base
            .checked_mul(2u32.saturating_pow(attempt.min(31)))
            .unwrap_or(self.cap);
        exponential.min(self.cap)
    }
}
