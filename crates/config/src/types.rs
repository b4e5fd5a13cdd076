//! Configuration types for session caching and request retries.
//!
//! Responsibilities:
//! - Define the settings consumed by the session cache and retry policy.
//! - Provide defaults sourced from [`crate::constants`].
//!
//! Does NOT handle:
//! - Reading values from the environment (see `loader`).
//! - Validation of bounds (performed by `ConfigLoader::build`).

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    DEFAULT_BASE_BACKOFF_MS, DEFAULT_LOGIN_TIMEOUT_RETRIES, DEFAULT_LOGIN_TIMEOUT_SECS,
    DEFAULT_LOGOUT_TIMEOUT_SECS, DEFAULT_MAX_BACKOFF_SECS, DEFAULT_MAX_RETRIES,
    DEFAULT_REFRESH_BUFFER_SECS,
};

/// Settings that govern how sessions are obtained, trusted and released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Upper bound for a single login call.
    pub login_timeout: Duration,
    /// Upper bound for a single logout call during shutdown.
    pub logout_timeout: Duration,
    /// Extra login attempts made inside one load when a login call times out.
    pub login_timeout_retries: u32,
    /// TTL applied to sessions whose authenticator did not report one.
    pub default_ttl: Option<Duration>,
    /// Sessions within this window of their expiry are treated as expired.
    pub refresh_buffer: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            login_timeout: Duration::from_secs(DEFAULT_LOGIN_TIMEOUT_SECS),
            logout_timeout: Duration::from_secs(DEFAULT_LOGOUT_TIMEOUT_SECS),
            login_timeout_retries: DEFAULT_LOGIN_TIMEOUT_RETRIES,
            default_ttl: None,
            refresh_buffer: Duration::from_secs(DEFAULT_REFRESH_BUFFER_SECS),
        }
    }
}

/// Settings for the generic backoff applied to transient, non-auth failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries allowed after the first attempt.
    pub max_retries: usize,
    /// Delay before the first retry; doubled for each subsequent one.
    pub base_backoff: Duration,
    /// Cap on any single computed delay.
    pub max_backoff: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
            max_backoff: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
        }
    }
}

/// Identity and secret read from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    pub identity: String,
    pub secret: SecretString,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub session: SessionSettings,
    pub retry: RetrySettings,
    pub credentials: Option<CredentialsConfig>,
}
