//! The login capability consumed by the session cache.
//!
//! Responsibilities:
//! - Define how a [`Session`] is obtained from [`Credentials`].
//! - Define how a session is revoked at shutdown.
//!
//! Does NOT handle:
//! - Caching, expiry or single-flight coordination (see [`crate::cache`]).
//! - Any provider-specific wire format. Implementations own that.
//!
//! Invariants / Assumptions:
//! - `login` may be slow; the cache bounds it with the configured login timeout.
//! - Rejected credentials must be reported as [`AuthError::Authentication`] so
//!   that they are never retried as if they were transient.
//!
//! [`AuthError::Authentication`]: crate::error::AuthError::Authentication

use std::future::Future;

use crate::credentials::Credentials;
use crate::error::Result;
use crate::session::Session;

/// Obtains and revokes sessions against a remote API.
///
/// The cache calls `login` from a spawned task, so implementations must be
/// `Send + Sync + 'static` and return `Send` futures.
///
/// # Example
///
/// ```rust,ignore
/// struct StaticToken;
///
/// impl Authenticator for StaticToken {
///     async fn login(&self, credentials: &Credentials) -> Result<Session> {
///         Ok(Session::new(format!("token-for-{}", credentials.identity())))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Exchange credentials for a fresh session.
    fn login(&self, credentials: &Credentials) -> impl Future<Output = Result<Session>> + Send;

    /// Revoke a session. Tokens with nothing to revoke keep the default.
    fn logout(&self, session: &Session) -> impl Future<Output = Result<()>> + Send {
        let _ = session;
        async { Ok(()) }
    }
}
