//! Single-flight session cache keyed by credentials.
//!
//! Responsibilities:
//! - Return a current session for a set of credentials, logging in on a miss.
//! - Coalesce concurrent misses for the same credentials into one login.
//! - Mark sessions stale on request (per key, per session, or all at once).
//! - Drain every entry at shutdown so sessions can be logged out.
//!
//! Does NOT handle:
//! - Attaching tokens to requests (see [`crate::decorator`]).
//! - Deciding when a response means the session expired (see [`crate::retry`]).
//!
//! Invariants / Assumptions:
//! - At most one login is in flight per distinct credentials.
//! - A login runs on its own task. Dropping a waiter never cancels it, and its
//!   result is installed even when every waiter has gone away.
//! - Failed logins are never cached; the next `get` logs in again. Their
//!   entries hold only the error and stay until `purge_expired` or `evict_all`.
//! - A load whose task dies without a result (runtime shutdown) is released
//!   by the first waiter to observe it.
//! - Once `invalidate` returns, no later `get` returns the invalidated session.
//! - The map lock is never held across an `.await`.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use authsession_config::SessionSettings;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::authenticator::Authenticator;
use crate::credentials::Credentials;
use crate::error::{AuthError, Result};
use crate::metrics::{MetricsCollector, Outcome};
use crate::session::Session;

type LoadResult = Result<Arc<Session>>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

struct InFlight {
    id: u64,
    future: SharedLoad,
}

#[derive(Default)]
struct Slot {
    session: Option<Arc<Session>>,
    stale: bool,
    loading: Option<InFlight>,
    last_error: Option<AuthError>,
}

impl Slot {
    fn current(&self, refresh_buffer: Duration) -> Option<Arc<Session>> {
        if self.stale {
            return None;
        }
        self.session
            .as_ref()
            .filter(|session| !session.expires_within(refresh_buffer))
            .cloned()
    }
}

enum Installed {
    Current(Arc<Session>),
    Orphaned(Arc<Session>),
    Failed(AuthError),
}

struct Inner<A> {
    authenticator: Arc<A>,
    settings: SessionSettings,
    metrics: MetricsCollector,
    slots: Mutex<HashMap<Credentials, Slot>>,
    next_session_id: AtomicU64,
    next_load_id: AtomicU64,
}

/// Cache of sessions keyed by [`Credentials`].
///
/// Cloning is cheap and every clone shares the same entries.
pub struct SessionCache<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for SessionCache<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for SessionCache<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("entries", &self.inner.lock_slots().len())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl<A: Authenticator> SessionCache<A> {
    /// Create a cache without metrics.
    pub fn new(authenticator: impl Into<Arc<A>>, settings: SessionSettings) -> Self {
        Self::with_metrics(authenticator, settings, MetricsCollector::disabled())
    }

    /// Create a cache that records login and lookup metrics.
    pub fn with_metrics(
        authenticator: impl Into<Arc<A>>,
        settings: SessionSettings,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                authenticator: authenticator.into(),
                settings,
                metrics,
                slots: Mutex::new(HashMap::new()),
                next_session_id: AtomicU64::new(1),
                next_load_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn authenticator(&self) -> &Arc<A> {
        &self.inner.authenticator
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.inner.metrics
    }

    /// Get a current session for `credentials`, logging in if needed.
    ///
    /// Concurrent callers with equal credentials share a single login and
    /// all receive its result, success or failure.
    pub async fn get(&self, credentials: &Credentials) -> Result<Arc<Session>> {
        let load = {
            let mut slots = self.inner.lock_slots();
            let refresh_buffer = self.inner.settings.refresh_buffer;

            if let Some(session) = slots
                .get(credentials)
                .and_then(|slot| slot.current(refresh_buffer))
            {
                debug!(
                    identity = %credentials.identity(),
                    session_id = session.id(),
                    "Session cache hit"
                );
                self.inner.metrics.record_cache_hit();
                return Ok(session);
            }

            self.inner.metrics.record_cache_miss();
            let slot = slots.entry(credentials.clone()).or_default();
            match &slot.loading {
                Some(in_flight) => {
                    debug!(identity = %credentials.identity(), "Joining in-flight login");
                    in_flight.future.clone()
                }
                None => {
                    debug!(identity = %credentials.identity(), "Starting login");
                    let in_flight = self.spawn_load(credentials.clone());
                    let future = in_flight.future.clone();
                    slot.loading = Some(in_flight);
                    future
                }
            }
        };

        load.await
    }

    fn spawn_load(&self, credentials: Credentials) -> InFlight {
        let id = self.inner.next_load_id.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Inner<A>> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(Arc::clone(&self.inner).run_load(credentials.clone(), id));

        let future = async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => {
                    let identity = credentials.identity().to_string();
                    warn!(identity = %identity, error = %err, "Session load task did not complete");
                    let err = AuthError::LoadAborted { identity };
                    if let Some(inner) = weak.upgrade() {
                        inner.abandon(&credentials, id, &err);
                    }
                    Err(err)
                }
            }
        }
        .boxed()
        .shared();

        InFlight { id, future }
    }

    /// Mark the session for `credentials` stale.
    ///
    /// A login already in flight still installs its result.
    pub fn invalidate(&self, credentials: &Credentials) {
        let mut slots = self.inner.lock_slots();
        if let Some(slot) = slots.get_mut(credentials)
            && slot.session.is_some()
        {
            slot.stale = true;
        }
        debug!(identity = %credentials.identity(), "Invalidated session");
        self.inner.metrics.record_invalidation("key");
    }

    /// Mark the entry stale only if it still holds `session`.
    ///
    /// Returns `false` when the entry has already moved on to a newer session,
    /// so many requests failing with the same token trigger one re-login.
    pub fn invalidate_session(&self, credentials: &Credentials, session: &Session) -> bool {
        let mut slots = self.inner.lock_slots();
        let Some(slot) = slots.get_mut(credentials) else {
            return false;
        };

        let matches = !slot.stale
            && slot
                .session
                .as_ref()
                .is_some_and(|cached| cached.id() == session.id());
        if matches {
            slot.stale = true;
            debug!(
                identity = %credentials.identity(),
                session_id = session.id(),
                "Invalidated session"
            );
            self.inner.metrics.record_invalidation("key");
        }
        matches
    }

    /// Mark every cached session stale.
    pub fn invalidate_all(&self) {
        let mut slots = self.inner.lock_slots();
        for slot in slots.values_mut().filter(|slot| slot.session.is_some()) {
            slot.stale = true;
        }
        debug!(entries = slots.len(), "Invalidated all sessions");
        self.inner.metrics.record_invalidation("all");
    }

    /// Snapshot of the entries holding a current session.
    pub fn entries(&self) -> Vec<(Credentials, Arc<Session>)> {
        let refresh_buffer = self.inner.settings.refresh_buffer;
        self.inner
            .lock_slots()
            .iter()
            .filter_map(|(credentials, slot)| {
                slot.current(refresh_buffer)
                    .map(|session| (credentials.clone(), session))
            })
            .collect()
    }

    /// Remove every entry and return those that held a session, stale or not.
    ///
    /// Logins in flight are not installed afterwards; their sessions are
    /// logged out as soon as they arrive.
    pub fn evict_all(&self) -> Vec<(Credentials, Arc<Session>)> {
        let drained: Vec<_> = self.inner.lock_slots().drain().collect();
        self.inner.metrics.record_cache_size(0);

        drained
            .into_iter()
            .filter_map(|(credentials, slot)| slot.session.map(|session| (credentials, session)))
            .collect()
    }

    /// Drop idle entries whose session has expired or never arrived.
    ///
    /// An entry whose login failed is kept so [`Self::last_error`] can report
    /// it, and only this call removes it. Caches that see many distinct
    /// failing credentials should call this periodically to bound their size.
    pub fn purge_expired(&self) -> usize {
        let mut slots = self.inner.lock_slots();
        let before = slots.len();
        slots.retain(|_, slot| {
            slot.loading.is_some() || slot.session.as_ref().is_some_and(|s| !s.is_expired())
        });
        let removed = before - slots.len();
        if removed > 0 {
            debug!(removed, "Purged expired sessions");
        }
        self.inner.metrics.record_cache_size(slots.len());
        removed
    }

    /// The error from the most recent failed login for `credentials`.
    ///
    /// Cleared by the next successful login. For inspection only.
    pub fn last_error(&self, credentials: &Credentials) -> Option<AuthError> {
        self.inner
            .lock_slots()
            .get(credentials)
            .and_then(|slot| slot.last_error.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Log a session out, bounded by the configured logout timeout.
    pub(crate) async fn logout(&self, credentials: &Credentials, session: &Session) -> Result<()> {
        self.inner.logout(credentials, session).await
    }
}

impl<A> Inner<A> {
    fn lock_slots(&self) -> MutexGuard<'_, HashMap<Credentials, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release a load whose task ended without installing a result.
    fn abandon(&self, credentials: &Credentials, load_id: u64, err: &AuthError) {
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.get_mut(credentials)
            && slot.loading.as_ref().is_some_and(|l| l.id == load_id)
        {
            slot.loading = None;
            slot.last_error = Some(err.clone());
        }
    }
}

impl<A: Authenticator> Inner<A> {
    async fn run_load(self: Arc<Self>, credentials: Credentials, load_id: u64) -> LoadResult {
        let result = AssertUnwindSafe(self.login(&credentials))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                warn!(identity = %credentials.identity(), "Authenticator panicked during login");
                Err(AuthError::LoadAborted {
                    identity: credentials.identity().to_string(),
                })
            });

        match self.install(&credentials, load_id, result) {
            Installed::Current(session) => Ok(session),
            Installed::Failed(err) => Err(err),
            Installed::Orphaned(session) => {
                debug!(
                    identity = %credentials.identity(),
                    "Cache evicted during login, discarding session"
                );
                if let Err(err) = self.logout(&credentials, &session).await {
                    warn!(error = %err, "Failed to log out discarded session");
                }
                Err(AuthError::LoadAborted {
                    identity: credentials.identity().to_string(),
                })
            }
        }
    }

    /// Call the authenticator, retrying calls that exceed the login timeout.
    async fn login(&self, credentials: &Credentials) -> Result<Session> {
        let timeout = self.settings.login_timeout;
        let max_attempts = self.settings.login_timeout_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let started = Instant::now();
            let result = tokio::time::timeout(timeout, self.authenticator.login(credentials))
                .instrument(info_span!("login", identity = %credentials.identity(), attempt))
                .await
                .unwrap_or(Err(AuthError::LoginTimeout(timeout)));
            let elapsed = started.elapsed();

            match result {
                Ok(session) => {
                    info!(
                        identity = %credentials.identity(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Login succeeded"
                    );
                    self.metrics.record_login(Outcome::Success, elapsed);
                    return Ok(session);
                }
                Err(err @ AuthError::LoginTimeout(_)) if attempt < max_attempts => {
                    warn!(
                        identity = %credentials.identity(),
                        attempt,
                        max_attempts,
                        "Login timed out, retrying"
                    );
                    self.metrics.record_login(Outcome::from(&err), elapsed);
                }
                Err(err) => {
                    warn!(identity = %credentials.identity(), error = %err, "Login failed");
                    self.metrics.record_login(Outcome::from(&err), elapsed);
                    return Err(err);
                }
            }
        }
    }

    fn install(&self, credentials: &Credentials, load_id: u64, result: Result<Session>) -> Installed {
        let mut slots = self.lock_slots();
        let slot = match slots.get_mut(credentials) {
            Some(slot) if slot.loading.as_ref().is_some_and(|l| l.id == load_id) => slot,
            _ => {
                return match result {
                    Ok(session) => Installed::Orphaned(Arc::new(self.assign_id(session))),
                    Err(err) => Installed::Failed(err),
                };
            }
        };

        slot.loading = None;
        match result {
            Ok(session) => {
                let session = Arc::new(self.assign_id(session));
                slot.session = Some(Arc::clone(&session));
                slot.stale = false;
                slot.last_error = None;
                let size = slots.len();
                self.metrics.record_cache_size(size);
                Installed::Current(session)
            }
            Err(err) => {
                slot.last_error = Some(err.clone());
                Installed::Failed(err)
            }
        }
    }

    fn assign_id(&self, session: Session) -> Session {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        session.installed(id, self.settings.default_ttl)
    }

    async fn logout(&self, credentials: &Credentials, session: &Session) -> Result<()> {
        let timeout = self.settings.logout_timeout;
        let identity = credentials.identity();
        let outcome = tokio::time::timeout(timeout, self.authenticator.logout(session))
            .instrument(info_span!("logout", identity = %identity, session_id = session.id()))
            .await;

        let (result, label) = match outcome {
            Ok(Ok(())) => (Ok(()), Outcome::Success),
            Ok(Err(err)) => {
                let label = Outcome::from(&err);
                (
                    Err(AuthError::Logout {
                        identity: identity.to_string(),
                        reason: err.to_string(),
                    }),
                    label,
                )
            }
            Err(_) => (
                Err(AuthError::Logout {
                    identity: identity.to_string(),
                    reason: format!("timed out after {timeout:?}"),
                }),
                Outcome::Timeout,
            ),
        };
        self.metrics.record_logout(label);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Copy)]
    enum Step {
        Grant,
        Reject,
        Hang,
        Panic,
    }

    #[derive(Default)]
    struct TestAuth {
        logins: AtomicUsize,
        logouts: Mutex<Vec<String>>,
        script: Mutex<VecDeque<Step>>,
        delay: Duration,
        ttl: Option<Duration>,
    }

    impl TestAuth {
        fn delayed(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        fn scripted(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                script: Mutex::new(steps.into_iter().collect()),
                ..Self::default()
            }
        }

        fn logins(&self) -> usize {
            self.logins.load(Ordering::SeqCst)
        }
    }

    impl Authenticator for TestAuth {
        async fn login(&self, credentials: &Credentials) -> Result<Session> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Grant);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match step {
                Step::Grant => {
                    let session = Session::new(format!("{}-{n}", credentials.identity()));
                    Ok(match self.ttl {
                        Some(ttl) => session.with_ttl(ttl),
                        None => session,
                    })
                }
                Step::Reject => Err(AuthError::authentication(
                    credentials.identity(),
                    "invalid credentials",
                )),
                Step::Hang => std::future::pending().await,
                Step::Panic => panic!("authenticator blew up"),
            }
        }

        async fn logout(&self, session: &Session) -> Result<()> {
            self.logouts
                .lock()
                .unwrap()
                .push(session.expose_token().to_string());
            Ok(())
        }
    }

    fn creds() -> Credentials {
        Credentials::new("admin", "changeme")
    }

    fn cache(auth: TestAuth) -> SessionCache<TestAuth> {
        SessionCache::new(auth, SessionSettings::default())
    }

    #[tokio::test]
    async fn test_get_caches_session() {
        let cache = cache(TestAuth::default());

        let first = cache.get(&creds()).await.unwrap();
        let second = cache.get(&creds()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.expose_token(), "admin-1");
        assert_eq!(cache.authenticator().logins(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_credentials_get_distinct_sessions() {
        let cache = cache(TestAuth::default());

        let a = cache.get(&creds()).await.unwrap();
        let b = cache
            .get(&creds().with_extra("org", "acme"))
            .await
            .unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(cache.authenticator().logins(), 2);
        assert_eq!(cache.entries().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_gets_share_one_login() {
        let cache = cache(TestAuth::delayed(Duration::from_millis(100)));
        let credentials = creds();

        let results =
            futures::future::join_all((0..16).map(|_| cache.get(&credentials))).await;

        assert_eq!(cache.authenticator().logins(), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_failed_login_is_not_cached() {
        let cache = cache(TestAuth::scripted([Step::Reject]));

        let err = cache.get(&creds()).await.unwrap_err();
        assert!(matches!(err, AuthError::Authentication { .. }));
        assert!(matches!(
            cache.last_error(&creds()),
            Some(AuthError::Authentication { .. })
        ));
        assert!(cache.entries().is_empty());

        let session = cache.get(&creds()).await.unwrap();
        assert_eq!(session.expose_token(), "admin-2");
        assert!(cache.last_error(&creds()).is_none());
        assert_eq!(cache.authenticator().logins(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_login() {
        let cache = cache(TestAuth::default());

        let old = cache.get(&creds()).await.unwrap();
        cache.invalidate(&creds());
        assert!(cache.entries().is_empty());

        let new = cache.get(&creds()).await.unwrap();
        assert_ne!(old.id(), new.id());
        assert_eq!(new.expose_token(), "admin-2");
    }

    #[tokio::test]
    async fn test_invalidate_unknown_key_is_noop() {
        let cache = cache(TestAuth::default());
        cache.invalidate(&creds());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_session_only_once_per_session() {
        let cache = cache(TestAuth::default());

        let old = cache.get(&creds()).await.unwrap();
        assert!(cache.invalidate_session(&creds(), &old));
        assert!(!cache.invalidate_session(&creds(), &old));

        let new = cache.get(&creds()).await.unwrap();
        assert!(!cache.invalidate_session(&creds(), &old));
        assert!(Arc::ptr_eq(&new, &cache.get(&creds()).await.unwrap()));
        assert_eq!(cache.authenticator().logins(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_during_load_keeps_fresh_result() {
        let cache = cache(TestAuth::delayed(Duration::from_millis(100)));
        let credentials = creds();

        let pending = cache.get(&credentials);
        let invalidate = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.invalidate(&credentials);
        };
        let (session, ()) = tokio::join!(pending, invalidate);
        let session = session.unwrap();

        let again = cache.get(&credentials).await.unwrap();
        assert!(Arc::ptr_eq(&session, &again));
        assert_eq!(cache.authenticator().logins(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_all_marks_every_entry() {
        let cache = cache(TestAuth::default());
        let other = creds().with_extra("org", "acme");

        cache.get(&creds()).await.unwrap();
        cache.get(&other).await.unwrap();
        cache.invalidate_all();

        assert!(cache.entries().is_empty());
        assert_eq!(cache.len(), 2);
        cache.get(&creds()).await.unwrap();
        cache.get(&other).await.unwrap();
        assert_eq!(cache.authenticator().logins(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_triggers_login() {
        let auth = TestAuth {
            ttl: Some(Duration::from_secs(60)),
            ..TestAuth::default()
        };
        let cache = cache(auth);

        let first = cache.get(&creds()).await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(Arc::ptr_eq(&first, &cache.get(&creds()).await.unwrap()));

        tokio::time::advance(Duration::from_secs(2)).await;
        let second = cache.get(&creds()).await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(cache.authenticator().logins(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl_and_refresh_buffer() {
        let settings = SessionSettings {
            default_ttl: Some(Duration::from_secs(30)),
            refresh_buffer: Duration::from_secs(5),
            ..SessionSettings::default()
        };
        let cache = SessionCache::new(TestAuth::default(), settings);

        let first = cache.get(&creds()).await.unwrap();
        assert_eq!(first.ttl(), Some(Duration::from_secs(30)));

        tokio::time::advance(Duration::from_secs(26)).await;
        let second = cache.get(&creds()).await.unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_timeout_is_retried() {
        let cache = cache(TestAuth::scripted([Step::Hang]));

        let session = cache.get(&creds()).await.unwrap();
        assert_eq!(session.expose_token(), "admin-2");
        assert_eq!(cache.authenticator().logins(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_timeout_retries_are_bounded() {
        let cache = cache(TestAuth::scripted([Step::Hang, Step::Hang, Step::Hang]));

        let err = cache.get(&creds()).await.unwrap_err();
        assert!(matches!(err, AuthError::LoginTimeout(_)));
        assert_eq!(cache.authenticator().logins(), 2);
    }

    #[tokio::test]
    async fn test_rejected_login_is_not_retried_inside_load() {
        let cache = cache(TestAuth::scripted([Step::Reject]));
        assert!(cache.get(&creds()).await.is_err());
        assert_eq!(cache.authenticator().logins(), 1);
    }

    #[tokio::test]
    async fn test_panicking_authenticator_reports_aborted_load() {
        let cache = cache(TestAuth::scripted([Step::Panic]));

        let err = cache.get(&creds()).await.unwrap_err();
        assert!(matches!(err, AuthError::LoadAborted { .. }));

        // The panic does not wedge the entry.
        assert!(cache.get(&creds()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_does_not_cancel_login() {
        let cache = cache(TestAuth::delayed(Duration::from_millis(100)));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), cache.get(&creds())).await;
        assert!(cancelled.is_err());

        let session = cache.get(&creds()).await.unwrap();
        assert_eq!(session.expose_token(), "admin-1");
        assert_eq!(cache.authenticator().logins(), 1);
    }

    #[test]
    fn test_load_lost_with_its_runtime_is_released() {
        let runtime = || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
        };
        let cache = cache(TestAuth::delayed(Duration::from_millis(200)));

        let first = runtime();
        let pending =
            first.block_on(async {
                tokio::time::timeout(Duration::from_millis(10), cache.get(&creds())).await
            });
        assert!(pending.is_err());
        drop(first);

        let second = runtime();
        let err = second.block_on(cache.get(&creds())).unwrap_err();
        assert!(matches!(err, AuthError::LoadAborted { .. }));
        assert!(matches!(
            cache.last_error(&creds()),
            Some(AuthError::LoadAborted { .. })
        ));

        let session = second.block_on(cache.get(&creds())).unwrap();
        assert_eq!(session.expose_token(), "admin-2");
        assert_eq!(cache.authenticator().logins(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_completes_with_no_waiters() {
        let cache = cache(TestAuth::delayed(Duration::from_millis(100)));

        let _ = tokio::time::timeout(Duration::from_millis(10), cache.get(&creds())).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(cache.entries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_during_load_logs_out_late_session() {
        let cache = cache(TestAuth::delayed(Duration::from_millis(100)));

        let _ = tokio::time::timeout(Duration::from_millis(10), cache.get(&creds())).await;
        assert!(cache.evict_all().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cache.is_empty());
        assert_eq!(*cache.authenticator().logouts.lock().unwrap(), vec!["admin-1"]);
    }

    #[tokio::test]
    async fn test_evict_all_returns_stale_sessions_too() {
        let cache = cache(TestAuth::default());
        let other = creds().with_extra("org", "acme");

        cache.get(&creds()).await.unwrap();
        cache.get(&other).await.unwrap();
        cache.invalidate(&other);

        let evicted = cache.evict_all();
        assert_eq!(evicted.len(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_removes_idle_entries() {
        let auth = TestAuth {
            ttl: Some(Duration::from_secs(10)),
            script: Mutex::new(VecDeque::from([Step::Grant, Step::Reject])),
            ..TestAuth::default()
        };
        let cache = cache(auth);
        let other = creds().with_extra("org", "acme");

        cache.get(&creds()).await.unwrap();
        assert!(cache.get(&other).await.is_err());
        assert_eq!(cache.purge_expired(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failed_entries_stay_until_purged() {
        let cache = cache(TestAuth::scripted([Step::Reject; 5]));

        for n in 0..5 {
            let credentials = Credentials::new(format!("user-{n}"), "wrong");
            assert!(cache.get(&credentials).await.is_err());
        }
        assert_eq!(cache.len(), 5);
        assert!(cache.last_error(&Credentials::new("user-0", "wrong")).is_some());

        assert_eq!(cache.purge_expired(), 5);
        assert!(cache.is_empty());
        assert!(cache.last_error(&Credentials::new("user-0", "wrong")).is_none());
    }
}
