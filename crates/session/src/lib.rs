//! Authenticated session cache with retry on expiry.
//!
//! This crate wraps stateless HTTP calls to APIs that require a short-lived
//! token from a separate login call. A [`SessionCache`] logs in once per set
//! of [`Credentials`] and shares the session, an [`AuthDecorator`] attaches
//! the token to outgoing requests, and a [`RetryPolicy`] decides what to do
//! when the remote rejects a request. [`ShutdownLogout`] revokes whatever is
//! left at teardown.
//!
//! The login wire format is supplied by an [`Authenticator`] implementation;
//! transport stays with the caller.

pub mod authenticator;
pub mod cache;
pub mod credentials;
pub mod decorator;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod retry;
pub mod session;
pub mod shutdown;
pub mod supplier;

pub use authenticator::Authenticator;
pub use cache::SessionCache;
pub use credentials::Credentials;
pub use decorator::{AuthDecorator, AuthRequest, TokenPlacement};
pub use error::{AuthError, Result, TransportError, TransportErrorKind};
pub use logging::LogFormat;
pub use metrics::MetricsCollector;
pub use retry::{
    AttemptState, Decision, InspectResponse, InvalidationScope, Phase, ResponseInfo, RetryPolicy,
};
pub use session::Session;
pub use shutdown::{LogoutReport, ShutdownLogout};
pub use supplier::MemoizedSupplier;

pub use authsession_config::{RetrySettings, SessionSettings};
