//! Environment variable parsing for configuration.
//!
//! Responsibilities:
//! - Read and parse `AUTHSESSION_*` environment variables.
//! - Apply environment variable values to a ConfigLoader instance.
//!
//! Does NOT handle:
//! - Building or validating the final Config (see builder.rs).
//! - .env file loading (handled by ConfigLoader::load_dotenv).
//!
//! Invariants:
//! - Empty or whitespace-only environment variables are treated as unset.
//! - Returned values are trimmed (leading/trailing whitespace removed).
//! - Invalid numeric values return ConfigError::InvalidValue.

use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;

use super::builder::ConfigLoader;
use super::error::ConfigError;
use crate::constants::{
    ENV_BASE_BACKOFF_MS, ENV_IDENTITY, ENV_LOGIN_TIMEOUT, ENV_LOGIN_TIMEOUT_RETRIES,
    ENV_LOGOUT_TIMEOUT, ENV_MAX_BACKOFF, ENV_MAX_RETRIES, ENV_REFRESH_BUFFER, ENV_SECRET,
    ENV_SESSION_TTL,
};

/// Read an environment variable, returning None if unset, empty, or whitespace-only.
/// Returns the trimmed value (leading/trailing whitespace removed) if present.
pub fn env_var_or_none(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == s.len() {
            Some(s)
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_env<T: FromStr>(key: &str, message: &str) -> Result<Option<T>, ConfigError> {
    env_var_or_none(key)
        .map(|value| {
            value.parse::<T>().map_err(|_| ConfigError::InvalidValue {
                var: key.to_string(),
                message: message.to_string(),
            })
        })
        .transpose()
}

fn parse_secs(key: &str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_env::<u64>(key, "must be a number of seconds")?.map(Duration::from_secs))
}

/// Apply environment variable configuration to the loader.
///
/// Environment variables override values already present on the loader.
pub fn apply_env(loader: &mut ConfigLoader) -> Result<(), ConfigError> {
    if let Some(timeout) = parse_secs(ENV_LOGIN_TIMEOUT)? {
        loader.set_login_timeout(Some(timeout));
    }
    if let Some(timeout) = parse_secs(ENV_LOGOUT_TIMEOUT)? {
        loader.set_logout_timeout(Some(timeout));
    }
    if let Some(retries) =
        parse_env::<u32>(ENV_LOGIN_TIMEOUT_RETRIES, "must be a non-negative integer")?
    {
        loader.set_login_timeout_retries(Some(retries));
    }
    // A TTL of zero disables the default TTL.
    if let Some(ttl) = parse_secs(ENV_SESSION_TTL)? {
        loader.set_default_ttl(Some((!ttl.is_zero()).then_some(ttl)));
    }
    if let Some(buffer) = parse_secs(ENV_REFRESH_BUFFER)? {
        loader.set_refresh_buffer(Some(buffer));
    }
    if let Some(retries) = parse_env::<usize>(ENV_MAX_RETRIES, "must be a non-negative integer")? {
        loader.set_max_retries(Some(retries));
    }
    if let Some(millis) = parse_env::<u64>(ENV_BASE_BACKOFF_MS, "must be a number of milliseconds")?
    {
        loader.set_base_backoff(Some(Duration::from_millis(millis)));
    }
    if let Some(backoff) = parse_secs(ENV_MAX_BACKOFF)? {
        loader.set_max_backoff(Some(backoff));
    }
    if let Some(identity) = env_var_or_none(ENV_IDENTITY) {
        loader.set_identity(Some(identity));
    }
    if let Some(secret) = env_var_or_none(ENV_SECRET) {
        loader.set_secret(Some(SecretString::new(secret.into())));
    }

    Ok(())
}
