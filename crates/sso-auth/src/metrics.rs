//! ---
//! sso_section: "02-identity-access"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Identity resolution, permission aggregation, and caching."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
use prometheus::{Histogram, HistogramOpts, HistogramTimer, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Outcome label recorded for each authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    NoToken,
    CacheHit,
    Success,
    Expired,
    Invalid,
    Error,
}

impl AuthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStatus::NoToken => "no_token",
            AuthStatus::CacheHit => "cache_hit",
            AuthStatus::Success => "success",
            AuthStatus::Expired => "expired",
            AuthStatus::Invalid => "invalid",
            AuthStatus::Error => "error",
        }
    }
}

/// SSO metrics exported via Prometheus.
#[derive(Clone)]
pub struct SsoMetrics {
    registry: Arc<Registry>,
    auth_requests_total: IntCounterVec,
    auth_latency_seconds: Histogram,
    permission_checks_total: IntCounterVec,
}

impl SsoMetrics {
    /// Register metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> anyhow::Result<Self> {
        let auth_requests_total = IntCounterVec::new(
            Opts::new("sso_auth_requests_total", "Authentication attempts by outcome"),
            &["status"],
        )?;
        let auth_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "sso_auth_latency_seconds",
            "Latency of remote token verification",
        ))?;
        let permission_checks_total = IntCounterVec::new(
            Opts::new("sso_permission_checks_total", "Authorization decisions by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(auth_requests_total.clone()))?;
        registry.register(Box::new(auth_latency_seconds.clone()))?;
        registry.register(Box::new(permission_checks_total.clone()))?;

        Ok(Self {
            registry,
            auth_requests_total,
            auth_latency_seconds,
            permission_checks_total,
        })
    }

    /// Access the underlying registry.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn inc_auth(&self, status: AuthStatus) {
        self.auth_requests_total
            .with_label_values(&[status.as_str()])
            .inc();
    }

    /// Current count for an authentication outcome.
    pub fn auth_count(&self, status: AuthStatus) -> u64 {
        self.auth_requests_total
            .with_label_values(&[status.as_str()])
            .get()
    }

    /// Timer that records into the latency histogram when dropped.
    pub fn start_auth_timer(&self) -> HistogramTimer {
        self.auth_latency_seconds.start_timer()
    }

    pub fn inc_permission_check(&self, allowed: bool) {
        let outcome = if allowed { "allow" } else { "deny" };
        self.permission_checks_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn permission_check_count(&self, allowed: bool) -> u64 {
        let outcome = if allowed { "allow" } else { "deny" };
        self.permission_checks_total
            .with_label_values(&[outcome])
            .get()
    }
}

impl std::fmt::Debug for SsoMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_increment() {
        let registry = Arc::new(Registry::new());
        let metrics = SsoMetrics::new(registry.clone()).unwrap();
        metrics.inc_auth(AuthStatus::CacheHit);
        metrics.inc_auth(AuthStatus::CacheHit);
        metrics.inc_permission_check(false);
        drop(metrics.start_auth_timer());

        assert_eq!(metrics.auth_count(AuthStatus::CacheHit), 2);
        assert_eq!(metrics.auth_count(AuthStatus::Success), 0);
        assert_eq!(metrics.permission_check_count(false), 1);
        assert_eq!(registry.gather().len(), 3);
    }

    #[test]
    fn double_registration_fails() {
        let registry = Arc::new(Registry::new());
        SsoMetrics::new(registry.clone()).unwrap();
        assert!(SsoMetrics::new(registry).is_err());
    }
}
