//! Metrics collection for logins, cache lookups and request retries.
//!
//! This module provides metrics for the session lifecycle, including:
//! - Login counters and a login latency histogram
//! - Cache hit/miss counters and invalidation counters
//! - Re-authentication and retry counters
//! - Logout counters recorded at shutdown
//!
//! # What this module does NOT handle:
//! - Metrics exposition/export (install a recorder such as a Prometheus exporter)
//! - Persistent storage of metrics
//!
//! # Invariants
//! - Labels never carry secrets; identities are not used as labels either,
//!   since their cardinality is unbounded
//! - Zero-cost when no metrics recorder is installed

use std::time::Duration;

use crate::error::AuthError;

/// Metric name for login counter.
pub const METRIC_LOGINS_TOTAL: &str = "authsession_logins_total";

/// Metric name for login duration histogram.
pub const METRIC_LOGIN_DURATION: &str = "authsession_login_duration_seconds";

/// Metric name for cache hit counter.
pub const METRIC_CACHE_HITS: &str = "authsession_cache_hits_total";

/// Metric name for cache miss counter.
pub const METRIC_CACHE_MISSES: &str = "authsession_cache_misses_total";

/// Metric name for cache size gauge.
pub const METRIC_CACHE_SIZE: &str = "authsession_cache_size";

/// Metric name for invalidation counter.
pub const METRIC_INVALIDATIONS_TOTAL: &str = "authsession_invalidations_total";

/// Metric name for re-authentication counter.
pub const METRIC_REAUTH_TOTAL: &str = "authsession_reauth_total";

/// Metric name for retry counter.
pub const METRIC_RETRIES_TOTAL: &str = "authsession_retries_total";

/// Metric name for logout counter.
pub const METRIC_LOGOUTS_TOTAL: &str = "authsession_logouts_total";

/// Outcome label for login and logout metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Rejected,
    Timeout,
    Error,
}

impl Outcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Rejected => "rejected",
            Outcome::Timeout => "timeout",
            Outcome::Error => "error",
        }
    }
}

impl From<&AuthError> for Outcome {
    fn from(error: &AuthError) -> Self {
        match error {
            AuthError::Authentication { .. } | AuthError::Authorization { .. } => {
                Outcome::Rejected
            }
            AuthError::LoginTimeout(_) => Outcome::Timeout,
            _ => Outcome::Error,
        }
    }
}

/// Metrics collector for session management.
///
/// A lightweight wrapper around the `metrics` crate macros with consistent
/// names and labels.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    /// Whether metrics collection is enabled.
    enabled: bool,
}

impl MetricsCollector {
    /// Create a new, enabled metrics collector.
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// Create a collector that records nothing.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a completed login attempt and how long it took.
    pub fn record_login(&self, outcome: Outcome, duration: Duration) {
        if !self.enabled {
            return;
        }

        metrics::counter!(METRIC_LOGINS_TOTAL, "outcome" => outcome.as_str()).increment(1);
        metrics::histogram!(METRIC_LOGIN_DURATION, "outcome" => outcome.as_str())
            .record(duration.as_secs_f64());
    }

    pub fn record_cache_hit(&self) {
        if !self.enabled {
            return;
        }
        metrics::counter!(METRIC_CACHE_HITS).increment(1);
    }

    pub fn record_cache_miss(&self) {
        if !self.enabled {
            return;
        }
        metrics::counter!(METRIC_CACHE_MISSES).increment(1);
    }

    /// Record current number of cache entries.
    pub fn record_cache_size(&self, size: usize) {
        if !self.enabled {
            return;
        }
        metrics::gauge!(METRIC_CACHE_SIZE).set(size as f64);
    }

    /// Record an invalidation.
    ///
    /// # Arguments
    /// * `scope` - `"key"` for a single entry, `"all"` for the whole cache
    pub fn record_invalidation(&self, scope: &'static str) {
        if !self.enabled {
            return;
        }
        metrics::counter!(METRIC_INVALIDATIONS_TOTAL, "scope" => scope).increment(1);
    }

    /// Record a re-authentication triggered by a 401/403 response.
    pub fn record_reauth(&self, status: u16) {
        if !self.enabled {
            return;
        }
        metrics::counter!(METRIC_REAUTH_TOTAL, "status" => status.to_string()).increment(1);
    }

    /// Record a backoff retry.
    ///
    /// # Arguments
    /// * `reason` - the status code, or `"transport"` for network failures
    /// * `attempt` - The retry attempt number (1-based)
    pub fn record_retry(&self, reason: &str, attempt: usize) {
        if !self.enabled {
            return;
        }

        metrics::counter!(METRIC_RETRIES_TOTAL,
            "reason" => reason.to_string(),
            "attempt" => attempt.to_string(),
        )
        .increment(1);
    }

    pub fn record_logout(&self, outcome: Outcome) {
        if !self.enabled {
            return;
        }
        metrics::counter!(METRIC_LOGOUTS_TOTAL, "outcome" => outcome.as_str()).increment(1);
    }
}
