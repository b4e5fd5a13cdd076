//! Centralized constants for the authsession workspace.
//!
//! This module contains default values used across crates to avoid
//! magic number duplication and improve maintainability.

// =============================================================================
// Login & Logout Defaults
// =============================================================================

/// Default upper bound for a single login call in seconds.
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 10;

/// Default upper bound for a single logout call in seconds.
pub const DEFAULT_LOGOUT_TIMEOUT_SECS: u64 = 10;

/// Default number of extra login attempts when a login call times out.
pub const DEFAULT_LOGIN_TIMEOUT_RETRIES: u32 = 1;

/// Default buffer subtracted from a session's ttl when deciding whether it is current.
pub const DEFAULT_REFRESH_BUFFER_SECS: u64 = 0;

// =============================================================================
// Request Retry Defaults
// =============================================================================

/// Default maximum number of retries for transient request failures.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Default base delay for exponential backoff in milliseconds.
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 1000;

/// Default cap on a single backoff delay in seconds.
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 30;

// =============================================================================
// Configuration Bounds
// =============================================================================

/// Maximum allowed login/logout timeout in seconds (10 minutes).
pub const MAX_TIMEOUT_SECS: u64 = 600;

/// Maximum allowed number of extra login attempts after a timeout.
pub const MAX_LOGIN_TIMEOUT_RETRIES: u32 = 5;

/// Maximum allowed session TTL in seconds (24 hours).
pub const MAX_SESSION_TTL_SECS: u64 = 86400;

/// Maximum allowed number of request retries.
pub const MAX_MAX_RETRIES: usize = 10;

/// Maximum allowed backoff cap in seconds (5 minutes).
pub const MAX_BACKOFF_SECS: u64 = 300;

// =============================================================================
// Environment Variable Names
// =============================================================================

pub const ENV_LOGIN_TIMEOUT: &str = "AUTHSESSION_LOGIN_TIMEOUT";
pub const ENV_LOGOUT_TIMEOUT: &str = "AUTHSESSION_LOGOUT_TIMEOUT";
pub const ENV_LOGIN_TIMEOUT_RETRIES: &str = "AUTHSESSION_LOGIN_TIMEOUT_RETRIES";
pub const ENV_SESSION_TTL: &str = "AUTHSESSION_SESSION_TTL";
pub const ENV_REFRESH_BUFFER: &str = "AUTHSESSION_REFRESH_BUFFER";
pub const ENV_MAX_RETRIES: &str = "AUTHSESSION_MAX_RETRIES";
pub const ENV_BASE_BACKOFF_MS: &str = "AUTHSESSION_BASE_BACKOFF_MS";
pub const ENV_MAX_BACKOFF: &str = "AUTHSESSION_MAX_BACKOFF";
pub const ENV_IDENTITY: &str = "AUTHSESSION_IDENTITY";
pub const ENV_SECRET: &str = "AUTHSESSION_SECRET";
