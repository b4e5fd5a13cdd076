//! Error types for session management and authenticated requests.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while obtaining sessions or issuing authenticated requests.
///
/// `AuthError` is `Clone` so that a single failed login can be handed to
/// every caller that was waiting on it.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    /// Login itself failed: bad credentials, or the remote refused to issue a session.
    #[error("Authentication failed for {identity}: {reason}")]
    Authentication { identity: String, reason: String },

    /// The remote rejected a request even after a fresh session was obtained.
    #[error("Authorization denied ({status}): {message}")]
    Authorization { status: u16, message: String },

    /// Network-level failure unrelated to authentication.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Non-auth, non-retryable HTTP failure.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A login call did not complete within the configured timeout.
    #[error("Login timed out after {0:?}")]
    LoginTimeout(Duration),

    /// Retries for transient failures were exhausted.
    #[error("Maximum retries exceeded ({attempts} attempts): {last}")]
    MaxRetriesExceeded {
        attempts: usize,
        last: Box<AuthError>,
    },

    /// The request could not be cloned for another attempt.
    #[error("Request cannot be replayed for retry")]
    NotReplayable,

    /// Logout failed. Only ever collected during shutdown, never propagated.
    #[error("Logout failed for {identity}: {reason}")]
    Logout { identity: String, reason: String },

    /// A login finished but its result could not be installed: the load task
    /// panicked, the runtime shut down, or the cache was evicted meanwhile.
    #[error("Session load for {identity} was aborted")]
    LoadAborted { identity: String },
}

impl AuthError {
    /// Convenience constructor for authenticator implementations.
    pub fn authentication(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Authentication {
            identity: identity.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is retryable by the generic backoff policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_retryable(),
            Self::LoginTimeout(_) => true,
            _ => false,
        }
    }

    /// Check if an HTTP status code is retryable.
    ///
    /// Retryable status codes:
    /// - 429: Too Many Requests (rate limiting)
    /// - 502: Bad Gateway (transient server error)
    /// - 503: Service Unavailable (transient server error)
    /// - 504: Gateway Timeout (transient server error)
    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 429 | 502 | 503 | 504)
    }

    /// Check if an HTTP status code signals a rejected or expired session.
    pub fn is_auth_status(status: u16) -> bool {
        matches!(status, 401 | 403)
    }

    /// Check if this error indicates an authentication or authorization failure.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::Authorization { .. })
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(TransportError::from(error))
    }
}

/// Broad classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// A failure to exchange a request with the remote at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Connection failures and timeouts are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Connect | TransportErrorKind::Timeout
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            TransportErrorKind::Timeout
        } else if error.is_connect() {
            TransportErrorKind::Connect
        } else {
            TransportErrorKind::Other
        };
        // URLs may carry tokens in query strings.
        Self::new(kind, error.without_url().to_string())
    }
}
