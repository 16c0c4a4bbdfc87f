//! Cache and listing configuration
//!
//! Defaults: caching on, 120 second attribute TTL,
//! 20 consecutive list failures before giving up, no delay between retries.

use std::time::Duration;

/// Default attribute TTL
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(120);

/// Consecutive failed page fetches tolerated by one listing operation
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 20;

/// Upper bound on the delay between page retries when backoff is enabled
const MAX_BACKOFF: Duration = Duration::from_secs(30);

const ENV_ATTR_CACHE: &str = "BLOBCACHE_ATTR_CACHE";
const ENV_ATTR_TTL_SECS: &str = "BLOBCACHE_ATTR_TTL_SECS";
const ENV_LIST_MAX_FAILURES: &str = "BLOBCACHE_LIST_MAX_FAILURES";
const ENV_LIST_BACKOFF_MS: &str = "BLOBCACHE_LIST_BACKOFF_MS";

#[derive(Debug, thiserror::Error)]
#[error("Invalid value {value:?} for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Exponential delay between retries of the same page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Delay before the retry that follows the `failures`-th consecutive failure
    pub fn delay(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        self.initial
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Retry behaviour of paginated listing and the directory-empty probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures on one page before the operation is abandoned
    pub max_consecutive_failures: u32,
    /// None retries immediately
    pub backoff: Option<Backoff>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            backoff: None,
        }
    }
}

/// Construction-time configuration of the caching client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// When false every operation is a pure pass-through
    pub enabled: bool,
    /// How long a cached attribute entry is served without a remote call
    pub ttl: Duration,
    pub retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_ATTR_TTL,
            retry: RetryPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Caching disabled, everything else default
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build configuration from `BLOBCACHE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_ATTR_CACHE) {
            config.enabled = parse_bool(ENV_ATTR_CACHE, &value)?;
        }
        if let Some(value) = lookup(ENV_ATTR_TTL_SECS) {
            config.ttl = Duration::from_secs(parse_num(ENV_ATTR_TTL_SECS, &value)?);
        }
        if let Some(value) = lookup(ENV_LIST_MAX_FAILURES) {
            let max = parse_num::<u32>(ENV_LIST_MAX_FAILURES, &value)?;
            if max == 0 {
                return Err(ConfigError {
                    var: ENV_LIST_MAX_FAILURES,
                    value,
                    reason: "must be at least 1".to_string(),
                });
            }
            config.retry.max_consecutive_failures = max;
        }
        if let Some(value) = lookup(ENV_LIST_BACKOFF_MS) {
            let ms = parse_num::<u64>(ENV_LIST_BACKOFF_MS, &value)?;
            config.retry.backoff = (ms > 0).then(|| Backoff {
                initial: Duration::from_millis(ms),
                max: MAX_BACKOFF,
            });
        }

        Ok(config)
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            var,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_num<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
