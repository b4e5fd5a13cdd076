//! Sessions returned by a successful login.

use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Session token with expiry information.
///
/// A session is immutable once the cache has installed it and is shared as
/// `Arc<Session>`. The token is held in a [`SecretString`] so it never shows
/// up in `Debug` output.
#[derive(Debug, Clone)]
pub struct Session {
    id: u64,
    token: SecretString,
    obtained_at: Instant,
    ttl: Option<Duration>,
    attributes: BTreeMap<String, String>,
}

impl Session {
    /// Create a session obtained now, with no ttl.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            id: 0,
            token: SecretString::new(token.into().into()),
            obtained_at: Instant::now(),
            ttl: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Set the time-to-live reported by the remote.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Attach structured data returned alongside the token (org links, user id, ...).
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Identifier assigned by the cache when the session was installed; 0 before that.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub(crate) fn expose_token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn obtained_at(&self) -> Instant {
        self.obtained_at
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Instant after which the session is no longer trusted, if it has a ttl.
    pub fn expires_at(&self) -> Option<Instant> {
        self.ttl.map(|ttl| self.obtained_at + ttl)
    }

    /// Check if the session is past its actual expiry time.
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::ZERO)
    }

    /// Check if the session expires within `buffer` from now.
    ///
    /// Sessions without a ttl never expire by time.
    pub fn expires_within(&self, buffer: Duration) -> bool {
        self.expires_at()
            .map(|exp| exp.saturating_duration_since(Instant::now()) <= buffer)
            .unwrap_or(false)
    }

    pub(crate) fn installed(mut self, id: u64, default_ttl: Option<Duration>) -> Self {
        self.id = id;
        if self.ttl.is_none() {
            self.ttl = default_ttl;
        }
        self
    }
}
