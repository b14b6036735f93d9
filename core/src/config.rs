//! Construction-time configuration for `ToonDbClient`.
//!
//! A `ClientConfig` is built once and never changes afterwards; the client
//! moves it into its `Transport` and every request reads from it.

use std::fmt;
use std::time::Duration;

use crate::error::ToonDbError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);

pub const ENV_URL: &str = "TOONDB_URL";
pub const ENV_API_KEY: &str = "TOONDB_API_KEY";
pub const ENV_TIMEOUT_SECS: &str = "TOONDB_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "TOONDB_MAX_RETRIES";

#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    url: String,
    api_key: String,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ClientConfig {
    /// Trailing slashes are stripped from `url` here, once.
    pub fn new(url: &str, api_key: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Read `TOONDB_URL`, `TOONDB_API_KEY` and the optional
    /// `TOONDB_TIMEOUT_SECS` / `TOONDB_MAX_RETRIES` from the process
    /// environment.
    pub fn from_env() -> Result<Self, ToonDbError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ToonDbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ToonDbError::Config(format!("{name} is not set")))
        };
        let mut config = Self::new(&required(ENV_URL)?, &required(ENV_API_KEY)?);

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ToonDbError::Config(format!("{ENV_TIMEOUT_SECS} must be a whole number of seconds, got {raw:?}"))
            })?;
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            let retries: u32 = raw.trim().parse().map_err(|_| {
                ToonDbError::Config(format!("{ENV_MAX_RETRIES} must be a non-negative integer, got {raw:?}"))
            })?;
            config = config.with_max_retries(retries);
        }
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extra attempts allowed for GET requests that fail with a transport
    /// error or a 5xx status. Other methods are sent exactly once.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before the first retry; doubles on each following one.
    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    pub(crate) fn validate(&self) -> Result<(), ToonDbError> {
        if self.url.is_empty() {
            return Err(ToonDbError::Config("url must not be empty".to_string()));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ToonDbError::Config(format!(
                "url must start with http:// or https://, got {:?}",
                self.url
            )));
        }
        if self.api_key.is_empty() {
            return Err(ToonDbError::Config("api_key must not be empty".to_string()));
        }
        Ok(())
    }
}

// The key is a credential; keep it out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}
