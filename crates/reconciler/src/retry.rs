//! Escalating backoff for failed reconciliation units.

use std::time::Duration;

/// Default pauses before the 2nd, 3rd, ... attempt.
pub const DEFAULT_BACKOFF: [Duration; 3] = [
    Duration::from_secs(60),
    Duration::from_secs(300),
    Duration::from_secs(600),
];

/// Default attempts per webhook, first attempt included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Retry policy for reconciliation units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause after the n-th failed attempt. The last entry repeats.
    pub backoff: Vec<Duration>,
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF.to_vec(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run the unit again after `delay`.
    Retry { delay: Duration },
    /// Do not retry.
    GiveUp { reason: String },
}

impl RetryPolicy {
    pub fn new(backoff: Vec<Duration>, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts,
        }
    }

    /// Decide after attempt number `attempt` (1-based) failed.
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exceeded", self.max_attempts),
            };
        }

        let index = (attempt.saturating_sub(1) as usize).min(self.backoff.len().saturating_sub(1));
        let delay = self.backoff.get(index).copied().unwrap_or(Duration::ZERO);

        RetryDecision::Retry { delay }
    }
}
