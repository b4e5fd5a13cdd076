//! Best-effort logout of every cached session at teardown.
//!
//! Responsibilities:
//! - Drain the cache and revoke each session concurrently.
//! - Report how many logouts succeeded and which failed.
//!
//! Does NOT handle:
//! - Abnormal termination. Nothing runs if the process is killed.
//!
//! Invariants / Assumptions:
//! - One failing or hanging logout never blocks the others; each is bounded
//!   by the configured logout timeout.
//! - Failures are logged and collected, never returned as an error.
//! - A [`ShutdownLogout`] runs at most once.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use tracing::{info, warn};

use crate::authenticator::Authenticator;
use crate::cache::SessionCache;
use crate::error::AuthError;

/// Outcome of a shutdown logout pass.
#[derive(Debug, Default)]
pub struct LogoutReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<AuthError>,
}

impl LogoutReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Teardown hook that logs out every session in a cache.
#[derive(Debug, Default)]
pub struct ShutdownLogout {
    done: AtomicBool,
}

impl ShutdownLogout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_run(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Evict every entry from `cache` and log each session out.
    ///
    /// Later calls return an empty report without touching the cache.
    pub async fn run<A: Authenticator>(&self, cache: &SessionCache<A>) -> LogoutReport {
        if self.done.swap(true, Ordering::AcqRel) {
            return LogoutReport::default();
        }

        let evicted = cache.evict_all();
        let attempted = evicted.len();
        let results = join_all(
            evicted
                .iter()
                .map(|(credentials, session)| cache.logout(credentials, session)),
        )
        .await;

        let mut report = LogoutReport {
            attempted,
            ..LogoutReport::default()
        };
        for result in results {
            match result {
                Ok(()) => report.succeeded += 1,
                Err(err) => {
                    warn!(error = %err, "Logout failed during shutdown");
                    report.failures.push(err);
                }
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed(),
            "Shutdown logout complete"
        );
        report
    }
}
