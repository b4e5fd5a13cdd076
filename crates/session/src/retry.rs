//! Retry decisions for authenticated requests.
//!
//! Responsibilities:
//! - Classify a response or transport failure into retry, fail or success.
//! - Invalidate the session that was rejected and re-decorate the request,
//!   at most once per logical request.
//! - Apply bounded exponential backoff to rate limits and transient failures,
//!   honouring `Retry-After`.
//!
//! Does NOT handle:
//! - Sending requests. [`RetryPolicy::execute`] takes the transport as a closure.
//!
//! Invariants / Assumptions:
//! - A second 401/403 after a re-authentication is final (`PermanentlyDenied`).
//! - Backoff delays are `base * 2^retry`, capped at `max_backoff`; a
//!   `Retry-After` hint longer than that wins.
//! - Every attempt is cloned from the caller's template, never from a request
//!   that was already sent.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use authsession_config::RetrySettings;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use tracing::{debug, warn};

use crate::authenticator::Authenticator;
use crate::credentials::Credentials;
use crate::decorator::{AuthDecorator, AuthRequest};
use crate::error::{AuthError, Result, TransportError};
use crate::metrics::MetricsCollector;
use crate::session::Session;

/// What to invalidate when a request is rejected as unauthorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidationScope {
    /// Only the session the rejected request carried.
    #[default]
    Key,
    /// Every cached session, for APIs where the failing key cannot be told apart.
    All,
}

/// Where a logical request is in its retry lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Initial,
    /// The session was rejected once and the request was re-issued with a fresh one.
    RetryOnce,
    Success,
    PermanentlyDenied,
    ExhaustedRetries,
    /// Ended on a non-retryable error.
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Phase::Initial | Phase::RetryOnce)
    }
}

/// Per-request retry bookkeeping, owned by the caller.
#[derive(Debug, Clone, Default)]
pub struct AttemptState {
    phase: Phase,
    attempts: usize,
    backoff_retries: usize,
    session: Option<Arc<Session>>,
}

impl AttemptState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Requests prepared so far, including the first.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Backoff retries consumed so far.
    pub fn backoff_retries(&self) -> usize {
        self.backoff_retries
    }

    /// The session carried by the most recently prepared request.
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }
}

/// The parts of a response the policy needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseInfo {
    pub status: u16,
    pub body: Option<String>,
    /// Raw `Retry-After` header value.
    pub retry_after: Option<String>,
}

impl ResponseInfo {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            body: None,
            retry_after: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_retry_after(mut self, value: impl Into<String>) -> Self {
        self.retry_after = Some(value.into());
        self
    }

    /// Capture status and `Retry-After` from a reqwest response. The body is left unread.
    pub fn from_response(response: &reqwest::Response) -> Self {
        Self {
            status: response.status().as_u16(),
            body: None,
            retry_after: response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn message(&self) -> String {
        match &self.body {
            Some(body) if !body.trim().is_empty() => body.clone(),
            _ => StatusCode::from_u16(self.status)
                .ok()
                .and_then(|status| status.canonical_reason())
                .unwrap_or("unknown status")
                .to_string(),
        }
    }
}

/// Responses that [`RetryPolicy::execute`] can classify.
pub trait InspectResponse {
    fn response_info(&self) -> ResponseInfo;
}

impl InspectResponse for reqwest::Response {
    fn response_info(&self) -> ResponseInfo {
        ResponseInfo::from_response(self)
    }
}

impl InspectResponse for ResponseInfo {
    fn response_info(&self) -> ResponseInfo {
        self.clone()
    }
}

/// The policy's verdict on one attempt.
#[derive(Debug)]
pub enum Decision<R> {
    /// Send `request` after waiting `delay`.
    Retry { request: R, delay: Duration },
    Fail(AuthError),
    Success,
}

/// Compute the exponential backoff delay for the given retry (0-based).
pub fn backoff_delay(settings: &RetrySettings, retry: usize) -> Duration {
    let exponent = u32::try_from(retry).unwrap_or(u32::MAX);
    let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
    settings
        .base_backoff
        .saturating_mul(factor)
        .min(settings.max_backoff)
}

/// Parse a `Retry-After` value given as delta-seconds or an HTTP-date.
///
/// Dates in the past and unparseable values yield `None`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    (at.with_timezone(&Utc) - now).to_std().ok()
}

/// Decides whether and how to retry requests decorated with session tokens.
pub struct RetryPolicy<A> {
    decorator: AuthDecorator<A>,
    settings: RetrySettings,
    scope: InvalidationScope,
    metrics: MetricsCollector,
}

impl<A> Clone for RetryPolicy<A> {
    fn clone(&self) -> Self {
        Self {
            decorator: self.decorator.clone(),
            settings: self.settings,
            scope: self.scope,
            metrics: self.metrics.clone(),
        }
    }
}

impl<A: Authenticator> RetryPolicy<A> {
    pub fn new(decorator: AuthDecorator<A>, settings: RetrySettings) -> Self {
        let metrics = decorator.cache().metrics().clone();
        Self {
            decorator,
            settings,
            scope: InvalidationScope::default(),
            metrics,
        }
    }

    pub fn with_scope(mut self, scope: InvalidationScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn decorator(&self) -> &AuthDecorator<A> {
        &self.decorator
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// Decorate the first attempt from `template`.
    pub async fn prepare<R: AuthRequest>(
        &self,
        template: &R,
        credentials: &Credentials,
        state: &mut AttemptState,
    ) -> Result<R> {
        let request = template.try_clone().ok_or(AuthError::NotReplayable)?;
        let (request, session) = self
            .decorator
            .decorate_with_session(request, credentials)
            .await?;
        state.session = Some(session);
        state.attempts += 1;
        Ok(request)
    }

    /// Classify the outcome of the last attempt.
    ///
    /// A `Retry` carries a request already decorated with a current session.
    pub async fn on_response<R: AuthRequest>(
        &self,
        template: &R,
        outcome: std::result::Result<&ResponseInfo, &TransportError>,
        credentials: &Credentials,
        state: &mut AttemptState,
    ) -> Decision<R> {
        match outcome {
            Ok(info) if info.is_success() => {
                if state.attempts > 1 {
                    debug!(attempts = state.attempts, "Request succeeded after retry");
                }
                state.phase = Phase::Success;
                Decision::Success
            }
            Ok(info) if AuthError::is_auth_status(info.status) => {
                self.on_rejected(template, info, credentials, state).await
            }
            Ok(info) if AuthError::is_retryable_status(info.status) => {
                let hint = info
                    .retry_after
                    .as_deref()
                    .and_then(|value| parse_retry_after(value, Utc::now()));
                let err = AuthError::Api {
                    status: info.status,
                    message: info.message(),
                };
                self.backoff(template, credentials, state, err, hint, &info.status.to_string())
                    .await
            }
            Ok(info) => {
                state.phase = Phase::Failed;
                Decision::Fail(AuthError::Api {
                    status: info.status,
                    message: info.message(),
                })
            }
            Err(err) if err.is_retryable() => {
                let err = AuthError::Transport(err.clone());
                self.backoff(template, credentials, state, err, None, "transport")
                    .await
            }
            Err(err) => {
                state.phase = Phase::Failed;
                Decision::Fail(AuthError::Transport(err.clone()))
            }
        }
    }

    async fn on_rejected<R: AuthRequest>(
        &self,
        template: &R,
        info: &ResponseInfo,
        credentials: &Credentials,
        state: &mut AttemptState,
    ) -> Decision<R> {
        if state.phase == Phase::RetryOnce {
            warn!(
                identity = %credentials.identity(),
                status = info.status,
                "Request rejected again after re-authentication"
            );
            state.phase = Phase::PermanentlyDenied;
            return Decision::Fail(AuthError::Authorization {
                status: info.status,
                message: info.message(),
            });
        }

        let cache = self.decorator.cache();
        match (self.scope, &state.session) {
            (InvalidationScope::Key, Some(session)) => {
                cache.invalidate_session(credentials, session);
            }
            (InvalidationScope::Key, None) => cache.invalidate(credentials),
            (InvalidationScope::All, _) => cache.invalidate_all(),
        }
        warn!(
            identity = %credentials.identity(),
            status = info.status,
            "Session rejected, re-authenticating"
        );
        self.metrics.record_reauth(info.status);
        state.phase = Phase::RetryOnce;

        match self.prepare(template, credentials, state).await {
            Ok(request) => Decision::Retry {
                request,
                delay: Duration::ZERO,
            },
            Err(err) => {
                state.phase = Phase::Failed;
                Decision::Fail(err)
            }
        }
    }

    async fn backoff<R: AuthRequest>(
        &self,
        template: &R,
        credentials: &Credentials,
        state: &mut AttemptState,
        last: AuthError,
        retry_after: Option<Duration>,
        reason: &str,
    ) -> Decision<R> {
        if state.backoff_retries >= self.settings.max_retries {
            debug!(
                attempts = state.attempts,
                "Max retries exhausted for transient failure"
            );
            state.phase = Phase::ExhaustedRetries;
            return Decision::Fail(AuthError::MaxRetriesExceeded {
                attempts: state.attempts,
                last: Box::new(last),
            });
        }

        let delay = backoff_delay(&self.settings, state.backoff_retries)
            .max(retry_after.unwrap_or_default());
        state.backoff_retries += 1;
        debug!(
            reason,
            retry = state.backoff_retries,
            max_retries = self.settings.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Transient failure, retrying with backoff"
        );
        self.metrics.record_retry(reason, state.backoff_retries);

        match self.prepare(template, credentials, state).await {
            Ok(request) => Decision::Retry { request, delay },
            Err(err) => {
                state.phase = Phase::Failed;
                Decision::Fail(err)
            }
        }
    }

    /// Send `template` through `send` until the policy reaches a verdict.
    ///
    /// Returns the successful response, or the error the policy failed with.
    pub async fn execute<R, T, F, Fut>(
        &self,
        template: R,
        credentials: &Credentials,
        mut send: F,
    ) -> Result<T>
    where
        R: AuthRequest,
        T: InspectResponse,
        F: FnMut(R) -> Fut,
        Fut: Future<Output = std::result::Result<T, TransportError>>,
    {
        let mut state = AttemptState::new();
        let mut request = self.prepare(&template, credentials, &mut state).await?;

        loop {
            let result = send(request).await;
            let decision = match &result {
                Ok(response) => {
                    let info = response.response_info();
                    self.on_response(&template, Ok(&info), credentials, &mut state)
                        .await
                }
                Err(err) => {
                    self.on_response(&template, Err(err), credentials, &mut state)
                        .await
                }
            };

            match decision {
                Decision::Success => return result.map_err(AuthError::Transport),
                Decision::Fail(err) => return Err(err),
                Decision::Retry {
                    request: next,
                    delay,
                } => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    request = next;
                }
            }
        }
    }
}
