use std::time::Duration;

use crate::error::SourceError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_STATUSES: &[u16] = &[502, 503, 504];
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Per-page retry behaviour for transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per page, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for every further retry.
    pub backoff: Duration,
    pub max_backoff: Duration,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// A policy that gives up after the first failure.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    pub fn is_retryable(&self, err: &SourceError) -> bool {
        match err {
            SourceError::Status { status, .. } => self.retry_statuses.contains(status),
            SourceError::Transport(e) => {
                e.is_connect() || e.is_timeout() || e.is_request() || e.is_body()
            }
            SourceError::Decode(_) => false,
        }
    }

    /// True if another attempt is allowed after `attempts` have already been made.
    pub fn can_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts.max(1)
    }

    /// Delay to wait before retry number `retry` (1-based): `backoff * 2^(retry - 1)`.
    pub fn delay_before(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}
