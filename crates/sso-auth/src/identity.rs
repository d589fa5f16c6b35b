//! ---
//! sso_section: "02-identity-access"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Identity resolution, permission aggregation, and caching."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
//! Principals and the token-to-identity resolver.
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sso_logging::{log_auth_event, mask_token, sso_debug, sso_warn, AuthEventOutcome};
use tracing::{debug, error, warn};

use crate::cache::CacheFacade;
use crate::client::{SsoService, VerifyOutcome};
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::metrics::{AuthStatus, SsoMetrics};
use crate::permissions::EffectivePermissions;

/// Opaque user identifier, normalized to a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accept JSON numbers and non-empty strings.
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => Some(Self(number.to_string())),
            Value::String(text) if !text.trim().is_empty() => Some(Self(text.trim().to_owned())),
            _ => None,
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Principal authenticated by the identity service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Option<UserId>,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    /// Module codes the principal may enter.
    #[serde(default)]
    pub modules: BTreeSet<String>,
    /// Bearer credential used for permission lookups.
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    /// Nested profile object as returned by the service.
    #[serde(default)]
    pub profile: Map<String, Value>,
    #[serde(skip)]
    permission_set: OnceCell<EffectivePermissions>,
}

fn default_active() -> bool {
    true
}

impl Identity {
    /// Minimal identity, mostly useful for tests and tools.
    pub fn new(id: Option<UserId>, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            display_name: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            modules: BTreeSet::new(),
            token: String::new(),
            avatar_url: None,
            department: None,
            position: None,
            profile: Map::new(),
            permission_set: OnceCell::new(),
        }
    }

    /// Normalize a verification response. Top-level fields win over the
    /// nested `profile` object; a missing `token` records `token` itself.
    pub fn from_verify_response(body: &Value, token: &str) -> Result<Self, AuthError> {
        let Some(top) = body.as_object() else {
            return Err(AuthError::token_invalid(Some(200), Some(body.to_string())));
        };
        let profile = top
            .get("profile")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let lookup = |key: &str| {
            top.get(key)
                .filter(|value| !value.is_null())
                .or_else(|| profile.get(key).filter(|value| !value.is_null()))
        };
        let text = |key: &str| -> Option<String> {
            lookup(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
        };
        let flag = |key: &str, default: bool| lookup(key).and_then(Value::as_bool).unwrap_or(default);

        let modules = lookup("modules")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(code) => Some(code.clone()),
                        Value::Object(module) => module
                            .get("code")
                            .and_then(Value::as_str)
                            .map(str::to_owned),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut identity = Self::new(lookup("id").and_then(UserId::from_json), text("username").unwrap_or_default());
        identity.email = text("email").unwrap_or_default();
        identity.first_name = text("first_name").unwrap_or_default();
        identity.last_name = text("last_name").unwrap_or_default();
        identity.is_active = flag("is_active", true);
        identity.is_staff = flag("is_staff", false);
        identity.is_superuser = flag("is_superuser", false);
        identity.modules = modules;
        identity.token = text("token").unwrap_or_else(|| token.to_owned());
        identity.avatar_url = text("avatar_url");
        identity.department = text("department");
        identity.position = text("position");
        let display_name = text("display_name").unwrap_or_else(|| identity.full_name());
        identity.display_name = display_name;
        identity.profile = profile;
        Ok(identity)
    }

    /// First and last name, else whichever is set, else the username.
    pub fn full_name(&self) -> String {
        let first = self.first_name.trim();
        let last = self.last_name.trim();
        match (first.is_empty(), last.is_empty()) {
            (false, false) => format!("{first} {last}"),
            (false, true) => first.to_owned(),
            (true, false) => last.to_owned(),
            (true, true) => self.username.clone(),
        }
    }

    /// Superusers enter every module; everyone else needs the module listed.
    pub fn has_module_access(&self, module: &str) -> bool {
        self.is_superuser || self.modules.contains(module)
    }

    /// Permission set loaded for this request, if any.
    pub fn permission_set(&self) -> Option<&EffectivePermissions> {
        self.permission_set.get()
    }

    /// Record the permission set. Returns `false` when one was already set.
    pub fn set_permission_set(&self, permissions: EffectivePermissions) -> bool {
        self.permission_set.set(permissions).is_ok()
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            full_name: self.full_name(),
            display_name: if self.display_name.is_empty() {
                self.full_name()
            } else {
                self.display_name.clone()
            },
            is_active: self.is_active,
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
            avatar_url: self.avatar_url.clone(),
            department: self.department.clone(),
            position: self.position.clone(),
        }
    }
}

/// Presentation-ready view of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Option<UserId>,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub display_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub avatar_url: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
}

/// Application-local account that did not come from the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalPrincipal {
    pub id: Option<UserId>,
    pub username: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub token: Option<String>,
}

/// Who is making the request.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    Sso(Identity),
    External(ExternalPrincipal),
    Anonymous,
}

impl Principal {
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Principal::Anonymous)
    }

    pub fn is_superuser(&self) -> bool {
        match self {
            Principal::Sso(identity) => identity.is_superuser,
            Principal::External(external) => external.is_superuser,
            Principal::Anonymous => false,
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Principal::Sso(identity) => identity.id.as_ref(),
            Principal::External(external) => external.id.as_ref(),
            Principal::Anonymous => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Principal::Sso(identity) => Some(&identity.username),
            Principal::External(external) => Some(&external.username),
            Principal::Anonymous => None,
        }
    }

    /// Credential carried by the principal itself.
    pub fn token(&self) -> Option<&str> {
        let token = match self {
            Principal::Sso(identity) => Some(identity.token.as_str()),
            Principal::External(external) => external.token.as_deref(),
            Principal::Anonymous => None,
        };
        token.filter(|token| !token.is_empty())
    }
}

/// Turns bearer tokens into identities, consulting the cache first.
#[derive(Clone)]
pub struct IdentityResolver {
    service: Arc<dyn SsoService>,
    cache: CacheFacade,
    metrics: Option<SsoMetrics>,
}

impl fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl IdentityResolver {
    pub fn new(service: Arc<dyn SsoService>, cache: CacheFacade) -> Self {
        Self {
            service,
            cache,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SsoMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record(&self, status: AuthStatus) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_auth(status);
        }
    }

    /// Resolve a raw token to an identity.
    pub async fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        if let Some(identity) = self.cache.cached_identity(token) {
            self.record(AuthStatus::CacheHit);
            return Ok(identity);
        }

        let outcome = {
            let _timer = self.metrics.as_ref().map(SsoMetrics::start_auth_timer);
            self.service.verify_token(token).await
        };

        match outcome {
            Ok(VerifyOutcome::Verified(body)) => {
                let identity = match Identity::from_verify_response(&body, token) {
                    Ok(identity) => identity,
                    Err(err) => {
                        self.record(AuthStatus::Invalid);
                        return Err(err);
                    }
                };
                if identity.id.is_some() {
                    self.cache.store_identity(token, &identity);
                } else {
                    warn!(user = %identity.username, "verified identity has no id; not caching");
                }
                self.record(AuthStatus::Success);
                debug!(user = %identity.username, token = %mask_token(token), "token verified");
                Ok(identity)
            }
            Ok(VerifyOutcome::Rejected { status, body }) => {
                if status == 401 && is_expired_body(&body) {
                    self.record(AuthStatus::Expired);
                    debug!(token = %mask_token(token), "token expired");
                    return Err(AuthError::token_expired());
                }
                self.record(AuthStatus::Invalid);
                debug!(status, token = %mask_token(token), "token rejected");
                Err(AuthError::token_invalid(Some(status), Some(body)))
            }
            Err(err) => {
                self.record(AuthStatus::Error);
                error!(error = %err, "token verification failed");
                Err(AuthError::service_unavailable(err))
            }
        }
    }

    /// Authenticate the request. No token yields an anonymous principal.
    pub async fn authenticate(&self, ctx: &RequestContext) -> Result<Principal, AuthError> {
        let log = ctx.log_context();
        let Some(token) = ctx.token() else {
            self.record(AuthStatus::NoToken);
            sso_debug!(context = log, "no token in request");
            return Ok(Principal::Anonymous);
        };
        match self.resolve(token).await {
            Ok(identity) => {
                let log = log.with_user(&identity.username);
                log_auth_event(Some(&log), "token.verify", "authenticated", AuthEventOutcome::Allowed);
                Ok(Principal::Sso(identity))
            }
            Err(err @ AuthError::ServiceUnavailable { .. }) => {
                log_auth_event(Some(&log), "token.verify", &err.to_string(), AuthEventOutcome::Fault);
                Err(err)
            }
            Err(err) => {
                sso_warn!(context = log, "authentication failed: {}", err.code());
                Err(err)
            }
        }
    }
}

fn is_expired_body(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("code").and_then(Value::as_str).map(|code| code == "token_expired"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockService;
    use serde_json::json;

    fn resolver(service: Arc<MockService>) -> IdentityResolver {
        IdentityResolver::new(service, CacheFacade::new(
            Arc::new(crate::cache::MemoryCache::new()),
            crate::cache::CacheSettings::default(),
        ))
    }

    #[test]
    fn top_level_fields_win_over_profile() {
        let body = json!({
            "id": 42,
            "username": "alice",
            "first_name": "Alice",
            "profile": {"first_name": "Ignored", "last_name": "Liddell", "department": "R&D"},
            "modules": ["tc", {"code": "to"}, 7],
        });
        let identity = Identity::from_verify_response(&body, "tok").unwrap();
        assert_eq!(identity.id, Some(UserId::new("42")));
        assert_eq!(identity.first_name, "Alice");
        assert_eq!(identity.last_name, "Liddell");
        assert_eq!(identity.department.as_deref(), Some("R&D"));
        assert_eq!(identity.display_name, "Alice Liddell");
        assert_eq!(identity.token, "tok");
        assert!(identity.is_active);
        assert!(identity.has_module_access("to"));
        assert!(!identity.has_module_access("xx"));
    }

    #[test]
    fn non_object_response_is_invalid() {
        let err = Identity::from_verify_response(&json!([1, 2]), "tok").unwrap_err();
        assert_eq!(err.code(), "token_invalid");
    }

    #[test]
    fn permission_set_is_written_once() {
        let identity = Identity::new(Some(UserId::new("1")), "bob");
        assert!(identity.permission_set().is_none());
        assert!(identity.set_permission_set(EffectivePermissions::default()));
        assert!(!identity.set_permission_set(["x".to_string()].into_iter().collect()));
        assert!(identity.permission_set().unwrap().is_empty());
    }

    #[test]
    fn full_name_falls_back_to_username() {
        let mut identity = Identity::new(None, "carol");
        assert_eq!(identity.full_name(), "carol");
        identity.last_name = "Jones".into();
        assert_eq!(identity.full_name(), "Jones");
        assert_eq!(identity.profile().display_name, "Jones");
    }

    #[tokio::test]
    async fn verified_identity_is_cached() {
        let service = Arc::new(MockService::verifying(json!({"id": "7", "username": "alice"})));
        let resolver = resolver(service.clone());
        let first = resolver.resolve("tok").await.unwrap();
        let second = resolver.resolve("tok").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.verify_calls(), 1);
    }

    #[tokio::test]
    async fn identity_without_id_is_not_cached() {
        let service = Arc::new(MockService::verifying(json!({"username": "ghost"})));
        let resolver = resolver(service.clone());
        resolver.resolve("tok").await.unwrap();
        resolver.resolve("tok").await.unwrap();
        assert_eq!(service.verify_calls(), 2);
    }

    #[tokio::test]
    async fn expired_and_invalid_are_distinguished() {
        let service = Arc::new(MockService::rejecting(401, r#"{"code":"token_expired"}"#));
        let err = resolver(service).resolve("tok").await.unwrap_err();
        assert_eq!(err, AuthError::token_expired());

        let service = Arc::new(MockService::rejecting(401, r#"{"code":"bad_signature"}"#));
        let err = resolver(service).resolve("tok").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid { status: Some(401), .. }));

        let service = Arc::new(MockService::rejecting(500, "oops"));
        let err = resolver(service).resolve("tok").await.unwrap_err();
        assert!(err.is_token_error());
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let registry = Arc::new(prometheus::Registry::new());
        let metrics = SsoMetrics::new(registry).unwrap();
        let resolver = resolver(Arc::new(MockService::unreachable())).with_metrics(metrics.clone());
        let err = resolver.resolve("tok").await.unwrap_err();
        assert_eq!(err.code(), "service_unavailable");
        assert_eq!(metrics.auth_count(AuthStatus::Error), 1);
    }

    #[tokio::test]
    async fn authenticate_without_token_is_anonymous() {
        let service = Arc::new(MockService::verifying(json!({"id": 1, "username": "alice"})));
        let resolver = resolver(service.clone());
        let principal = resolver.authenticate(&RequestContext::new()).await.unwrap();
        assert_eq!(principal, Principal::Anonymous);
        assert_eq!(service.verify_calls(), 0);

        let ctx = RequestContext::new().with_authorization("Bearer tok");
        let principal = resolver.authenticate(&ctx).await.unwrap();
        assert_eq!(principal.username(), Some("alice"));
        assert_eq!(principal.token(), Some("tok"));
    }
}
