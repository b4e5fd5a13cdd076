//! Attaching session tokens to outgoing requests.
//!
//! Responsibilities:
//! - Fetch a current session from the cache and place its token on a request.
//! - Abstract over request types through [`AuthRequest`].
//!
//! Does NOT handle:
//! - Sending requests or interpreting responses (see [`crate::retry`]).
//!
//! Invariants / Assumptions:
//! - Decoration has no side effects beyond the cache lookup.
//! - Token header values are marked sensitive so they are redacted by `http`'s
//!   `Debug` output.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, COOKIE, HeaderName, HeaderValue};

use crate::authenticator::Authenticator;
use crate::cache::SessionCache;
use crate::credentials::Credentials;
use crate::error::{AuthError, Result};
use crate::session::Session;

/// A request that can carry an auth header and possibly be replayed.
pub trait AuthRequest: Sized {
    /// Return the request with `name: value` set.
    fn with_header(self, name: HeaderName, value: HeaderValue) -> Self;

    /// Clone the request for another attempt, if its body allows it.
    fn try_clone(&self) -> Option<Self>;
}

impl AuthRequest for reqwest::RequestBuilder {
    fn with_header(self, name: HeaderName, value: HeaderValue) -> Self {
        self.header(name, value)
    }

    fn try_clone(&self) -> Option<Self> {
        reqwest::RequestBuilder::try_clone(self)
    }
}

impl AuthRequest for reqwest::Request {
    /// Replaces any value already present under `name`.
    fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers_mut().insert(name, value);
        self
    }

    fn try_clone(&self) -> Option<Self> {
        reqwest::Request::try_clone(self)
    }
}

/// Where the session token goes on the request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TokenPlacement {
    /// `Authorization: Bearer <token>`
    #[default]
    Bearer,
    /// `<name>: <token>`, e.g. `X-Session-Token`
    Header(HeaderName),
    /// `Cookie: <name>=<token>`
    Cookie(String),
}

impl TokenPlacement {
    fn render(&self, token: &str) -> (HeaderName, String) {
        match self {
            TokenPlacement::Bearer => (AUTHORIZATION, format!("Bearer {token}")),
            TokenPlacement::Header(name) => (name.clone(), token.to_string()),
            TokenPlacement::Cookie(name) => (COOKIE, format!("{name}={token}")),
        }
    }
}

/// Decorates requests with a valid session token.
pub struct AuthDecorator<A> {
    cache: SessionCache<A>,
    placement: TokenPlacement,
}

impl<A> Clone for AuthDecorator<A> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            placement: self.placement.clone(),
        }
    }
}

impl<A: Authenticator> AuthDecorator<A> {
    /// Create a decorator that sends the token as a bearer token.
    pub fn new(cache: SessionCache<A>) -> Self {
        Self {
            cache,
            placement: TokenPlacement::default(),
        }
    }

    pub fn with_placement(mut self, placement: TokenPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn cache(&self) -> &SessionCache<A> {
        &self.cache
    }

    pub fn placement(&self) -> &TokenPlacement {
        &self.placement
    }

    /// Attach a current session token for `credentials` to `request`.
    ///
    /// Login failures are returned as-is and are not retried here.
    pub async fn decorate<R: AuthRequest>(&self, request: R, credentials: &Credentials) -> Result<R> {
        self.decorate_with_session(request, credentials)
            .await
            .map(|(request, _)| request)
    }

    /// Like [`decorate`](Self::decorate), also returning the session that was used.
    pub async fn decorate_with_session<R: AuthRequest>(
        &self,
        request: R,
        credentials: &Credentials,
    ) -> Result<(R, Arc<Session>)> {
        let session = self.cache.get(credentials).await?;
        let request = self.apply(request, credentials, &session)?;
        Ok((request, session))
    }

    /// Place `session`'s token on `request` without consulting the cache.
    ///
    /// A token that cannot be sent is dropped from the cache so the next
    /// lookup logs in again.
    pub fn apply<R: AuthRequest>(
        &self,
        request: R,
        credentials: &Credentials,
        session: &Session,
    ) -> Result<R> {
        let (name, value) = self.placement.render(session.expose_token());
        let mut value = HeaderValue::from_str(&value).map_err(|_| {
            self.cache.invalidate_session(credentials, session);
            AuthError::authentication(
                credentials.identity(),
                "session token is not a valid header value",
            )
        })?;
        value.set_sensitive(true);
        Ok(request.with_header(name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authsession_config::SessionSettings;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        logins: AtomicUsize,
    }

    impl Authenticator for Counting {
        async fn login(&self, credentials: &Credentials) -> Result<Session> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            if credentials.identity() == "bad-token" {
                return Ok(Session::new("line\nbreak"));
            }
            Ok(Session::new(format!("T{n}")))
        }
    }

    struct Rejecting;

    impl Authenticator for Rejecting {
        async fn login(&self, credentials: &Credentials) -> Result<Session> {
            Err(AuthError::authentication(credentials.identity(), "denied"))
        }
    }

    fn decorator() -> AuthDecorator<Counting> {
        AuthDecorator::new(SessionCache::new(Counting::default(), SessionSettings::default()))
    }

    fn builder() -> reqwest::RequestBuilder {
        reqwest::Client::new().get("http://localhost/api/items")
    }

    #[tokio::test]
    async fn test_bearer_placement() {
        let decorator = decorator();
        let creds = Credentials::new("admin", "pw");

        let request = decorator.decorate(builder(), &creds).await.unwrap();
        let request = request.build().unwrap();

        assert_eq!(request.headers()[AUTHORIZATION], "Bearer T1");
        assert!(request.headers()[AUTHORIZATION].is_sensitive());
    }

    #[tokio::test]
    async fn test_decorate_reuses_cached_session() {
        let decorator = decorator();
        let creds = Credentials::new("admin", "pw");

        decorator.decorate(builder(), &creds).await.unwrap();
        let (_, session) = decorator
            .decorate_with_session(builder(), &creds)
            .await
            .unwrap();

        assert_eq!(session.expose_token(), "T1");
        assert_eq!(decorator.cache().authenticator().logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_header_and_cookie_placement() {
        let creds = Credentials::new("admin", "pw");

        let decorator =
            decorator().with_placement(TokenPlacement::Header(HeaderName::from_static("x-session-token")));
        let request = decorator.decorate(builder(), &creds).await.unwrap().build().unwrap();
        assert_eq!(request.headers()["x-session-token"], "T1");
        assert!(request.headers().get(AUTHORIZATION).is_none());

        let decorator = decorator.with_placement(TokenPlacement::Cookie("session".to_string()));
        let request = decorator.decorate(builder(), &creds).await.unwrap().build().unwrap();
        assert_eq!(request.headers()[COOKIE], "session=T1");
    }

    #[tokio::test]
    async fn test_decorate_built_request_replaces_header() {
        let decorator = decorator();
        let creds = Credentials::new("admin", "pw");
        let request = builder()
            .header(AUTHORIZATION, "Bearer stale")
            .build()
            .unwrap();

        let request = decorator.decorate(request, &creds).await.unwrap();
        assert_eq!(request.headers().get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer T1");
    }

    #[tokio::test]
    async fn test_login_failure_propagates() {
        let decorator =
            AuthDecorator::new(SessionCache::new(Rejecting, SessionSettings::default()));
        let err = decorator
            .decorate(builder(), &Credentials::new("admin", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_unrepresentable_token_is_rejected() {
        let decorator = decorator();
        let err = decorator
            .decorate(builder(), &Credentials::new("bad-token", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Authentication { .. }));
        assert!(!err.to_string().contains("line"));
    }

    #[tokio::test]
    async fn test_unrepresentable_token_is_not_reused() {
        let decorator = decorator();
        let credentials = Credentials::new("bad-token", "pw");

        for _ in 0..2 {
            assert!(decorator.decorate(builder(), &credentials).await.is_err());
        }

        assert!(decorator.cache().entries().is_empty());
        assert_eq!(decorator.cache().authenticator().logins.load(Ordering::SeqCst), 2);
    }
}
