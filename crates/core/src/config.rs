//! Runtime settings for the sync layer.

use std::str::FromStr;

use crate::errors::{Error, Result};
use crate::sync::{
    RetryPolicy, TieBreak, SYNC_FLUSH_INTERVAL_SECS, SYNC_FLUSH_JITTER_SECS,
};

pub const ENV_SYNC_MAX_ATTEMPTS: &str = "MIZANFLOW_SYNC_MAX_ATTEMPTS";
pub const ENV_SYNC_FLUSH_INTERVAL_SECS: &str = "MIZANFLOW_SYNC_FLUSH_INTERVAL_SECS";
pub const ENV_SYNC_TIE_BREAK: &str = "MIZANFLOW_SYNC_TIE_BREAK";

/// Knobs of the sync orchestrator and the background flusher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub retry: RetryPolicy,
    pub tie_break: TieBreak,
    pub flush_interval_ms: u64,
    pub flush_jitter_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            tie_break: TieBreak::default(),
            flush_interval_ms: SYNC_FLUSH_INTERVAL_SECS * 1000,
            flush_jitter_ms: SYNC_FLUSH_JITTER_SECS * 1000,
        }
    }
}

impl SyncSettings {
    /// Defaults overridden by `MIZANFLOW_SYNC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(max_attempts) = parse_var::<u32, _>(&lookup, ENV_SYNC_MAX_ATTEMPTS)? {
            if max_attempts == 0 {
                return Err(Error::Config(format!(
                    "{} must be at least 1",
                    ENV_SYNC_MAX_ATTEMPTS
                )));
            }
            settings.retry.max_attempts = max_attempts;
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_SYNC_FLUSH_INTERVAL_SECS)? {
            settings.flush_interval_ms = secs.saturating_mul(1000);
        }

        if let Some(value) = non_empty(&lookup, ENV_SYNC_TIE_BREAK) {
            settings.tie_break = match value.to_ascii_lowercase().as_str() {
                "local" => TieBreak::PreferLocal,
                "remote" => TieBreak::PreferRemote,
                other => {
                    return Err(Error::Config(format!(
                        "{} must be 'local' or 'remote', got '{}'",
                        ENV_SYNC_TIE_BREAK, other
                    )))
                }
            };
        }

        Ok(settings)
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid value '{}' for {}", raw, name))),
        None => Ok(None),
    }
}
