//! ---
//! sso_section: "02-identity-access"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Identity resolution, permission aggregation, and caching."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
//! Yes/no authorization decisions over the module hierarchy.
use std::fmt;
use std::sync::Arc;

use sso_logging::{log_auth_event, sso_debug, sso_warn, AuthEventOutcome};
use tracing::debug;

use crate::cache::CacheFacade;
use crate::client::{ClientError, SsoService};
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::identity::{Identity, Principal, UserId};
use crate::metrics::SsoMetrics;
use crate::permissions::{EffectivePermissions, PermissionPayload, PermissionScheme};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    Allow,
    Deny(String),
}

/// Decision surface composing the remote client, the cache and the scheme.
#[derive(Clone)]
pub struct AuthorizationGate {
    service: Arc<dyn SsoService>,
    cache: CacheFacade,
    scheme: PermissionScheme,
    metrics: Option<SsoMetrics>,
}

impl fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("scheme", &self.scheme)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl AuthorizationGate {
    pub fn new(service: Arc<dyn SsoService>, cache: CacheFacade, scheme: PermissionScheme) -> Self {
        Self {
            service,
            cache,
            scheme,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SsoMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn scheme(&self) -> &PermissionScheme {
        &self.scheme
    }

    /// Does `principal` hold every permission in `required` within `module`?
    /// Failures deny and are logged; nothing propagates.
    pub async fn check<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        principal: &Principal,
        module: &str,
        required: &[S],
    ) -> bool {
        matches!(
            self.decide(ctx, principal, module, required).await,
            Decision::Allow
        )
    }

    /// Like [`check`](Self::check) but yields `PermissionDenied` on deny.
    pub async fn require<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        principal: &Principal,
        module: &str,
        required: &[S],
    ) -> Result<(), AuthError> {
        match self.decide(ctx, principal, module, required).await {
            Decision::Allow => Ok(()),
            Decision::Deny(detail) => Err(AuthError::permission_denied(detail)),
        }
    }

    /// Decision for a known user and token, bypassing principal handling.
    pub async fn has_permission<S: AsRef<str>>(
        &self,
        user_id: &UserId,
        token: &str,
        module: &str,
        required: &[S],
    ) -> bool {
        match self.fetch_effective(user_id, token).await {
            Ok(effective) => self
                .scheme
                .missing_permission(&effective, module, required)
                .is_none(),
            Err(err) => {
                sso_warn!("permission lookup for user {} failed: {}", user_id, err);
                false
            }
        }
    }

    /// Effective permissions for the principal, fetched or served from cache.
    pub async fn effective_permissions(
        &self,
        ctx: &RequestContext,
        principal: &Principal,
    ) -> Result<EffectivePermissions, AuthError> {
        let Some(user_id) = principal.user_id() else {
            return Ok(EffectivePermissions::default());
        };
        let token = principal
            .token()
            .or_else(|| ctx.permission_token())
            .ok_or_else(|| AuthError::token_invalid(None, None))?;
        self.fetch_effective(user_id, token).await
    }

    /// Populate `identity.permission_set` unless it is already loaded.
    pub async fn load_permissions(
        &self,
        ctx: &RequestContext,
        identity: &Identity,
    ) -> Result<(), AuthError> {
        if identity.permission_set().is_some() {
            return Ok(());
        }
        let principal = Principal::Sso(identity.clone());
        let effective = self.effective_permissions(ctx, &principal).await?;
        identity.set_permission_set(effective);
        Ok(())
    }

    async fn decide<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        principal: &Principal,
        module: &str,
        required: &[S],
    ) -> Decision {
        let log = ctx.log_context().with_module(module);
        let decision = match principal {
            Principal::Anonymous => Decision::Deny("authentication required".into()),
            _ if principal.is_superuser() => {
                sso_debug!(context = log, "superuser bypass");
                Decision::Allow
            }
            _ if required.is_empty() => Decision::Allow,
            Principal::Sso(identity) if identity.permission_set().is_some() => {
                let loaded = identity.permission_set().cloned().unwrap_or_default();
                self.evaluate(&loaded, module, required)
            }
            _ => self.decide_remote(ctx, principal, module, required).await,
        };

        let allowed = decision == Decision::Allow;
        if let Some(metrics) = &self.metrics {
            metrics.inc_permission_check(allowed);
        }
        let log = match principal.username() {
            Some(user) => log.with_user(user),
            None => log,
        };
        match &decision {
            Decision::Allow => log_auth_event(
                Some(&log),
                "permission.check",
                "access granted",
                AuthEventOutcome::Allowed,
            ),
            Decision::Deny(detail) => log_auth_event(
                Some(&log),
                "permission.check",
                &format!("access denied: {detail}"),
                AuthEventOutcome::Denied,
            ),
        }
        decision
    }

    async fn decide_remote<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        principal: &Principal,
        module: &str,
        required: &[S],
    ) -> Decision {
        let Some(user_id) = principal.user_id() else {
            return Decision::Deny("principal has no user id".into());
        };
        let Some(token) = principal.token().or_else(|| ctx.permission_token()) else {
            return Decision::Deny("no token available for permission lookup".into());
        };
        match self.fetch_effective(user_id, token).await {
            Ok(effective) => self.evaluate(&effective, module, required),
            Err(err) => {
                log_auth_event(
                    Some(&ctx.log_context().with_module(module)),
                    "permission.fetch",
                    &err.to_string(),
                    AuthEventOutcome::Fault,
                );
                Decision::Deny(format!("permission lookup failed: {}", err.code()))
            }
        }
    }

    fn evaluate<S: AsRef<str>>(
        &self,
        effective: &EffectivePermissions,
        module: &str,
        required: &[S],
    ) -> Decision {
        match self.scheme.missing_permission(effective, module, required) {
            None => Decision::Allow,
            Some(missing) => Decision::Deny(missing),
        }
    }

    async fn fetch_effective(
        &self,
        user_id: &UserId,
        token: &str,
    ) -> Result<EffectivePermissions, AuthError> {
        let payload = self.permission_payload(user_id, token).await?;
        Ok(self.scheme.collect_effective_permissions(&payload))
    }

    /// Raw payload from cache, else from the service (then cached).
    async fn permission_payload(
        &self,
        user_id: &UserId,
        token: &str,
    ) -> Result<PermissionPayload, AuthError> {
        if let Some(payload) = self.cache.cached_permissions(user_id) {
            debug!(user_id = %user_id, "permission payload cache hit");
            return Ok(payload);
        }
        let payload = self
            .service
            .fetch_permissions(user_id, token)
            .await
            .map_err(|err| match err {
                ClientError::Status { status: 401, body } => {
                    AuthError::token_invalid(Some(401), Some(body))
                }
                other => AuthError::service_unavailable(other),
            })?;
        self.cache.store_permissions(user_id, &payload);
        Ok(payload)
    }
}
