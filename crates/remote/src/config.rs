//! Connection settings for the remote record store.

use std::time::Duration;

use mizanflow_core::errors::{Error, Result};

pub const ENV_API_URL: &str = "MIZANFLOW_API_URL";
pub const ENV_API_KEY: &str = "MIZANFLOW_API_KEY";
pub const ENV_ACCESS_TOKEN: &str = "MIZANFLOW_ACCESS_TOKEN";
pub const ENV_API_TIMEOUT_SECS: &str = "MIZANFLOW_API_TIMEOUT_SECS";

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Project URL without the `/rest/v1` suffix.
    pub base_url: String,
    /// Public API key sent as the `apikey` header.
    pub api_key: String,
    /// User JWT. Requests fall back to the API key when absent.
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &mask(&self.api_key))
            .field("access_token", &self.access_token.as_deref().map(mask))
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn mask(secret: &str) -> String {
    let prefix: String = secret.chars().take(8).collect();
    format!("{}...", prefix)
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads `MIZANFLOW_API_*` variables from `lookup`. URL and key are required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = required(&lookup, ENV_API_URL)?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "{} must be an http(s) URL, got '{}'",
                ENV_API_URL, base_url
            )));
        }
        let mut config = Self::new(base_url, required(&lookup, ENV_API_KEY)?);

        if let Some(token) = non_empty(&lookup, ENV_ACCESS_TOKEN) {
            config.access_token = Some(token);
        }
        if let Some(raw) = non_empty(&lookup, ENV_API_TIMEOUT_SECS) {
            let secs = raw.parse::<u64>().ok().filter(|secs| *secs > 0).ok_or_else(|| {
                Error::Config(format!("Invalid value '{}' for {}", raw, ENV_API_TIMEOUT_SECS))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
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

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, name).ok_or_else(|| Error::Config(format!("{} is not set", name)))
}
