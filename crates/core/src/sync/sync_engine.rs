//! Retry classification and backoff helpers for queue replay.

use serde::{Deserialize, Serialize};

use super::DEFAULT_MAX_REPLAY_ATTEMPTS;

/// Retry policy classification for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Classify HTTP status into retry behavior.
pub fn classify_http_status(status: u16) -> SyncRetryClass {
    match status {
        401 | 403 => SyncRetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 => SyncRetryClass::Retryable,
        500..=599 => SyncRetryClass::Retryable,
        _ => SyncRetryClass::Permanent,
    }
}

/// Exponential backoff in seconds with cap.
pub fn backoff_seconds(consecutive_failures: u32) -> i64 {
    const MAX_EXPONENT: u32 = 8;
    const BASE_DELAY_SECONDS: i64 = 5;

    let capped = consecutive_failures.min(MAX_EXPONENT);
    2_i64.pow(capped) * BASE_DELAY_SECONDS
}

/// Bounds on how long a queued mutation is retried before it is dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Failed attempts after which an entry moves to the dead-letter list.
    pub max_attempts: u32,
    /// Fixed delay applied when the remote store asks for re-authentication.
    pub reauth_delay_secs: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_REPLAY_ATTEMPTS,
            reauth_delay_secs: 30,
        }
    }
}

impl RetryPolicy {
    pub fn backoff_seconds(&self, attempts: u32) -> i64 {
        backoff_seconds(attempts)
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Counters emitted by one queue flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub replayed: usize,
    pub retried: usize,
    pub skipped: usize,
    pub dead_lettered: usize,
    pub remaining: usize,
    pub reauth_required: bool,
}
