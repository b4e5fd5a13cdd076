//! Common test utilities for integration tests.
//!
//! This module provides a scriptable in-memory authenticator and an
//! authenticator that talks to a wiremock server over reqwest.
//!
//! # What this does NOT handle
//! - Mock server setup (use wiremock directly in tests)

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use authsession::{AuthError, Authenticator, Credentials, Result, Session};
use secrecy::ExposeSecret;

#[allow(unused_imports)]
pub use authsession::{
    AuthDecorator, RetryPolicy, RetrySettings, SessionCache, SessionSettings, ShutdownLogout,
};
#[allow(unused_imports)]
pub use wiremock::{Mock, MockServer, ResponseTemplate};

/// Read a session's token in tests.
#[allow(dead_code)]
pub fn token(session: &Session) -> String {
    session.token().expose_secret().to_string()
}

/// Retry settings with short delays so tests run quickly in real time.
#[allow(dead_code)]
pub fn fast_retry() -> RetrySettings {
    RetrySettings {
        max_retries: 3,
        base_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(100),
    }
}

/// In-memory authenticator that counts calls.
///
/// Tokens come from the scripted queue, falling back to `T<n>` for the n-th login.
#[derive(Default)]
pub struct FakeAuthenticator {
    logins: AtomicUsize,
    logouts: Mutex<Vec<String>>,
    tokens: Mutex<VecDeque<String>>,
    failing_logouts: HashSet<String>,
    ttl: Option<Duration>,
    delay: Duration,
    reject: bool,
}

#[allow(dead_code)]
impl FakeAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens<I, S>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: Mutex::new(tokens.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    pub fn with_ttl(self, ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..self
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    /// Every login fails with "bad creds".
    pub fn rejecting(self) -> Self {
        Self {
            reject: true,
            ..self
        }
    }

    pub fn failing_logout_for(mut self, token: &str) -> Self {
        self.failing_logouts.insert(token.to_string());
        self
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn logged_out(&self) -> Vec<String> {
        let mut tokens = self.logouts.lock().unwrap().clone();
        tokens.sort();
        tokens
    }
}

impl Authenticator for FakeAuthenticator {
    async fn login(&self, credentials: &Credentials) -> Result<Session> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self.tokens.lock().unwrap().pop_front();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.reject {
            return Err(AuthError::authentication(credentials.identity(), "bad creds"));
        }

        let session = Session::new(scripted.unwrap_or_else(|| format!("T{n}")));
        Ok(match self.ttl {
            Some(ttl) => session.with_ttl(ttl),
            None => session,
        })
    }

    async fn logout(&self, session: &Session) -> Result<()> {
        let token = token(session);
        if self.failing_logouts.contains(&token) {
            return Err(AuthError::Api {
                status: 503,
                message: "logout endpoint unavailable".to_string(),
            });
        }
        self.logouts.lock().unwrap().push(token);
        Ok(())
    }
}

/// Authenticator that logs in against `<base_url>/auth/login` and logs out
/// with `DELETE <base_url>/auth/session`.
#[allow(dead_code)]
pub struct HttpAuthenticator {
    client: reqwest::Client,
    base_url: String,
}

#[allow(dead_code)]
impl HttpAuthenticator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Authenticator for HttpAuthenticator {
    async fn login(&self, credentials: &Credentials) -> Result<Session> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .form(&[
                ("username", credentials.identity()),
                ("password", credentials.secret().expose_secret()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::authentication(
                credentials.identity(),
                format!("login returned {status}"),
            ));
        }

        let body: serde_json::Value = response.json().await?;
        let token = body["sessionKey"].as_str().ok_or_else(|| {
            AuthError::authentication(credentials.identity(), "missing sessionKey")
        })?;
        Ok(Session::new(token))
    }

    async fn logout(&self, session: &Session) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/auth/session", self.base_url))
            .bearer_auth(token(session))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AuthError::Api {
                status: response.status().as_u16(),
                message: "logout rejected".to_string(),
            })
        }
    }
}
