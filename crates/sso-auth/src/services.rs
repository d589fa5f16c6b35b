//! ---
//! sso_section: "02-identity-access"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Identity resolution, permission aggregation, and caching."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
use std::sync::Arc;

use sso_common::config::SsoConfig;
use tracing::info;

use crate::cache::CacheFacade;
use crate::client::{HttpSsoClient, SsoService};
use crate::gate::AuthorizationGate;
use crate::identity::IdentityResolver;
use crate::metrics::SsoMetrics;
use crate::permissions::PermissionScheme;

/// Components built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct SsoServices {
    pub cache: CacheFacade,
    pub resolver: IdentityResolver,
    pub gate: AuthorizationGate,
}

impl SsoServices {
    /// Wire the HTTP client, cache, resolver and gate from configuration.
    pub fn from_config(config: &SsoConfig, metrics: Option<SsoMetrics>) -> anyhow::Result<Self> {
        config.validate()?;
        let client: Arc<dyn SsoService> = Arc::new(HttpSsoClient::from_config(&config.service)?);
        let services = Self::with_service(config, client, metrics);
        info!(
            service = %config.service.url,
            parent = %config.modules.parent,
            children = config.modules.children.len(),
            cache_enabled = config.cache.enabled,
            "sso services ready"
        );
        Ok(services)
    }

    /// Same wiring over any [`SsoService`] implementation.
    pub fn with_service(
        config: &SsoConfig,
        service: Arc<dyn SsoService>,
        metrics: Option<SsoMetrics>,
    ) -> Self {
        let cache = CacheFacade::from_config(&config.cache);
        let scheme = PermissionScheme::from_config(&config.modules, &config.permissions);
        let mut resolver = IdentityResolver::new(service.clone(), cache.clone());
        let mut gate = AuthorizationGate::new(service, cache.clone(), scheme);
        if let Some(metrics) = metrics {
            resolver = resolver.with_metrics(metrics.clone());
            gate = gate.with_metrics(metrics);
        }
        Self {
            cache,
            resolver,
            gate,
        }
    }
}
