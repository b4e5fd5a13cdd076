//! Configuration management for authsession.
//!
//! This crate provides the settings consumed by the session cache and retry
//! policy, and a loader that reads them from `.env` files and environment
//! variables.

pub mod constants;
mod loader;
pub mod types;

pub use loader::{ConfigError, ConfigLoader, env_var_or_none};
pub use types::{Config, CredentialsConfig, RetrySettings, SessionSettings};
