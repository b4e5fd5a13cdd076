//! Configuration loader builder implementation.
//!
//! Responsibilities:
//! - Provide a builder-pattern `ConfigLoader` that layers defaults, `.env`,
//!   environment variables and explicit builder calls.
//! - Validate bounds and build the final [`Config`].
//!
//! Does NOT handle:
//! - Direct environment variable parsing logic (delegated to env.rs).
//!
//! Invariants / Assumptions:
//! - Later layers win: a builder call made after `from_env()` overrides the
//!   environment, and `from_env()` overrides earlier builder calls.
//! - `load_dotenv()` must be called explicitly to enable `.env` file loading.
//! - The `DOTENV_DISABLED` variable is checked before `dotenvy::dotenv()` is called.

use secrecy::SecretString;
use std::time::Duration;

use super::env::apply_env;
use super::error::ConfigError;
use crate::constants::{
    ENV_IDENTITY, ENV_SECRET, MAX_BACKOFF_SECS, MAX_LOGIN_TIMEOUT_RETRIES, MAX_MAX_RETRIES,
    MAX_SESSION_TTL_SECS, MAX_TIMEOUT_SECS,
};
use crate::types::{Config, CredentialsConfig, RetrySettings, SessionSettings};

/// Configuration loader that builds config from environment variables and builder calls.
#[derive(Default)]
pub struct ConfigLoader {
    login_timeout: Option<Duration>,
    logout_timeout: Option<Duration>,
    login_timeout_retries: Option<u32>,
    default_ttl: Option<Option<Duration>>,
    refresh_buffer: Option<Duration>,
    max_retries: Option<usize>,
    base_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    identity: Option<String>,
    secret: Option<SecretString>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if dotenv loading is disabled via environment variable.
    fn dotenv_disabled() -> bool {
        matches!(
            std::env::var("DOTENV_DISABLED").ok().as_deref(),
            Some("true") | Some("1")
        )
    }

    /// Load environment variables from .env file if present.
    ///
    /// If `DOTENV_DISABLED` environment variable is set to "true" or "1",
    /// the .env file will not be loaded (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DotenvParse` or `ConfigError::DotenvIo` when a
    /// `.env` file exists but cannot be used. Missing files are ignored.
    pub fn load_dotenv(self) -> Result<Self, ConfigError> {
        if Self::dotenv_disabled() {
            return Ok(self);
        }

        match dotenvy::dotenv() {
            Ok(path) => {
                tracing::debug!(path = %path.display(), "Loaded .env file");
                Ok(self)
            }
            Err(e) if Self::is_not_found(&e) => Ok(self),
            Err(dotenvy::Error::LineParse(_, idx)) => {
                Err(ConfigError::DotenvParse { error_index: idx })
            }
            Err(dotenvy::Error::Io(io_err)) => Err(ConfigError::DotenvIo {
                kind: io_err.kind(),
            }),
            Err(_) => Err(ConfigError::DotenvUnknown),
        }
    }

    fn is_not_found(err: &dotenvy::Error) -> bool {
        matches!(
            err,
            dotenvy::Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound
        )
    }

    /// Read configuration from environment variables.
    pub fn from_env(mut self) -> Result<Self, ConfigError> {
        apply_env(&mut self)?;
        Ok(self)
    }

    /// Set the login timeout.
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = Some(timeout);
        self
    }

    /// Set the logout timeout used during shutdown.
    pub fn with_logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = Some(timeout);
        self
    }

    /// Set the TTL applied to sessions that report none. `None` disables it.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the refresh buffer.
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = Some(buffer);
        self
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the base and maximum backoff delays.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = Some(base);
        self.max_backoff = Some(max);
        self
    }

    /// Set the credentials.
    pub fn with_credentials(mut self, identity: String, secret: String) -> Self {
        self.identity = Some(identity);
        self.secret = Some(SecretString::new(secret.into()));
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let defaults = SessionSettings::default();
        let session = SessionSettings {
            login_timeout: self.login_timeout.unwrap_or(defaults.login_timeout),
            logout_timeout: self.logout_timeout.unwrap_or(defaults.logout_timeout),
            login_timeout_retries: self
                .login_timeout_retries
                .unwrap_or(defaults.login_timeout_retries),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            refresh_buffer: self.refresh_buffer.unwrap_or(defaults.refresh_buffer),
        };

        let defaults = RetrySettings::default();
        let retry = RetrySettings {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            base_backoff: self.base_backoff.unwrap_or(defaults.base_backoff),
            max_backoff: self.max_backoff.unwrap_or(defaults.max_backoff),
        };

        Self::validate_session(&session)?;
        Self::validate_retry(&retry)?;

        let credentials = match (self.identity, self.secret) {
            (Some(identity), Some(secret)) => Some(CredentialsConfig { identity, secret }),
            (Some(_), None) => return Err(ConfigError::IncompleteCredentials(ENV_IDENTITY)),
            (None, Some(_)) => return Err(ConfigError::IncompleteCredentials(ENV_SECRET)),
            (None, None) => None,
        };

        Ok(Config {
            session,
            retry,
            credentials,
        })
    }

    /// Validates session settings.
    ///
    /// Checks:
    /// - login and logout timeouts are greater than 0 and at most MAX_TIMEOUT_SECS
    /// - login_timeout_retries does not exceed MAX_LOGIN_TIMEOUT_RETRIES
    /// - a default TTL, when present, exceeds the refresh buffer and MAX_SESSION_TTL_SECS bounds it
    fn validate_session(session: &SessionSettings) -> Result<(), ConfigError> {
        for (name, timeout) in [
            ("login_timeout", session.login_timeout),
            ("logout_timeout", session.logout_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidTimeout {
                    message: format!("{name} must be greater than 0"),
                });
            }
            if timeout > Duration::from_secs(MAX_TIMEOUT_SECS) {
                return Err(ConfigError::InvalidTimeout {
                    message: format!(
                        "{name} exceeds maximum allowed value of {MAX_TIMEOUT_SECS} seconds"
                    ),
                });
            }
        }

        if session.login_timeout_retries > MAX_LOGIN_TIMEOUT_RETRIES {
            return Err(ConfigError::InvalidTimeout {
                message: format!(
                    "login_timeout_retries must be between 0 and {} (got {})",
                    MAX_LOGIN_TIMEOUT_RETRIES, session.login_timeout_retries
                ),
            });
        }

        if let Some(ttl) = session.default_ttl {
            if ttl <= session.refresh_buffer {
                return Err(ConfigError::InvalidSessionTtl {
                    message: format!(
                        "default_ttl ({}s) must be greater than refresh_buffer ({}s)",
                        ttl.as_secs(),
                        session.refresh_buffer.as_secs()
                    ),
                });
            }
            if ttl > Duration::from_secs(MAX_SESSION_TTL_SECS) {
                return Err(ConfigError::InvalidSessionTtl {
                    message: format!(
                        "default_ttl exceeds maximum allowed value of {MAX_SESSION_TTL_SECS} seconds"
                    ),
                });
            }
        }

        Ok(())
    }

    fn validate_retry(retry: &RetrySettings) -> Result<(), ConfigError> {
        if retry.max_retries > MAX_MAX_RETRIES {
            return Err(ConfigError::InvalidRetry {
                message: format!(
                    "max_retries must be between 0 and {} (got {})",
                    MAX_MAX_RETRIES, retry.max_retries
                ),
            });
        }
        if retry.max_backoff > Duration::from_secs(MAX_BACKOFF_SECS) {
            return Err(ConfigError::InvalidRetry {
                message: format!(
                    "max_backoff exceeds maximum allowed value of {MAX_BACKOFF_SECS} seconds"
                ),
            });
        }
        if retry.base_backoff > retry.max_backoff {
            return Err(ConfigError::InvalidRetry {
                message: "base_backoff must not exceed max_backoff".to_string(),
            });
        }
        Ok(())
    }

    // Internal setters used by env.rs

    pub(crate) fn set_login_timeout(&mut self, timeout: Option<Duration>) {
        self.login_timeout = timeout;
    }

    pub(crate) fn set_logout_timeout(&mut self, timeout: Option<Duration>) {
        self.logout_timeout = timeout;
    }

    pub(crate) fn set_login_timeout_retries(&mut self, retries: Option<u32>) {
        self.login_timeout_retries = retries;
    }

    pub(crate) fn set_default_ttl(&mut self, ttl: Option<Option<Duration>>) {
        self.default_ttl = ttl;
    }

    pub(crate) fn set_refresh_buffer(&mut self, buffer: Option<Duration>) {
        self.refresh_buffer = buffer;
    }

    pub(crate) fn set_max_retries(&mut self, retries: Option<usize>) {
        self.max_retries = retries;
    }

    pub(crate) fn set_base_backoff(&mut self, backoff: Option<Duration>) {
        self.base_backoff = backoff;
    }

    pub(crate) fn set_max_backoff(&mut self, backoff: Option<Duration>) {
        self.max_backoff = backoff;
    }

    pub(crate) fn set_identity(&mut self, identity: Option<String>) {
        self.identity = identity;
    }

    pub(crate) fn set_secret(&mut self, secret: Option<SecretString>) {
        self.secret = secret;
    }
}
