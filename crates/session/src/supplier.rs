//! Memoized values derived from a session.
//!
//! Lookups built on top of an authenticated session (the caller's organisation,
//! a service catalog, a region map) are expensive to fetch and change rarely.
//! [`MemoizedSupplier`] keeps the last value for a ttl, coalesces concurrent
//! loads and retries loads that time out. Failures are never cached, and
//! rejected credentials are never retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use moka::future::Cache as MokaCache;
use tracing::{debug, warn};

use crate::error::{AuthError, Result, TransportErrorKind};

type Loader<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// A single lazily loaded value with a time-to-live.
pub struct MemoizedSupplier<T> {
    name: String,
    cache: MokaCache<(), T>,
    loader: Loader<T>,
    timeout_retries: u32,
}

impl<T> Clone for MemoizedSupplier<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            cache: self.cache.clone(),
            loader: Arc::clone(&self.loader),
            timeout_retries: self.timeout_retries,
        }
    }
}

fn is_timeout(err: &AuthError) -> bool {
    match err {
        AuthError::LoginTimeout(_) => true,
        AuthError::Transport(transport) => transport.kind == TransportErrorKind::Timeout,
        _ => false,
    }
}

impl<T: Clone + Send + Sync + 'static> MemoizedSupplier<T> {
    /// Create a supplier that keeps each loaded value for `ttl`.
    ///
    /// Timed-out loads are retried once by default.
    pub fn new<F, Fut>(name: impl Into<String>, ttl: Duration, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            cache: MokaCache::builder()
                .max_capacity(1)
                .time_to_live(ttl)
                .build(),
            loader: Arc::new(move || loader().boxed()),
            timeout_retries: 1,
        }
    }

    pub fn with_timeout_retries(mut self, retries: u32) -> Self {
        self.timeout_retries = retries;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the memoized value, loading it if absent or expired.
    pub async fn get(&self) -> Result<T> {
        self.cache
            .try_get_with((), self.load())
            .await
            .map_err(|err| AuthError::clone(&err))
    }

    /// Drop the memoized value so the next `get` reloads it.
    pub async fn invalidate(&self) {
        debug!(supplier = %self.name, "Invalidated memoized value");
        self.cache.invalidate(&()).await;
    }

    async fn load(&self) -> Result<T> {
        let mut attempt = 0;
        loop {
            match (self.loader)().await {
                Err(err) if is_timeout(&err) && attempt < self.timeout_retries => {
                    attempt += 1;
                    warn!(
                        supplier = %self.name,
                        attempt,
                        error = %err,
                        "Load timed out, retrying"
                    );
                }
                Err(err) => {
                    warn!(supplier = %self.name, error = %err, "Load failed");
                    return Err(err);
                }
                Ok(value) => {
                    debug!(supplier = %self.name, "Loaded memoized value");
                    return Ok(value);
                }
            }
        }
    }
}
