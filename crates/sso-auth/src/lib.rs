//! ---
//! sso_section: "02-identity-access"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Identity resolution, permission aggregation, and caching."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
//! Token verification, permission aggregation and authorization decisions
//! backed by a remote SSO identity service.

pub mod cache;
pub mod client;
pub mod context;
pub mod error;
pub mod gate;
pub mod identity;
pub mod metrics;
pub mod permissions;
pub mod services;

#[cfg(test)]
mod test_support;

pub use cache::{CacheBackend, CacheDomain, CacheError, CacheFacade, CacheSettings, MemoryCache, NullCache};
pub use client::{ClientError, HttpSsoClient, SsoService, VerifyOutcome};
pub use context::{RequestContext, ACCESS_TOKEN_COOKIE};
pub use error::{AuthError, ErrorBody};
pub use gate::AuthorizationGate;
pub use identity::{ExternalPrincipal, Identity, IdentityResolver, Principal, UserId, UserProfile};
pub use metrics::{AuthStatus, SsoMetrics};
pub use permissions::{EffectivePermissions, ModulePermissions, PermissionEntry, PermissionPayload, PermissionScheme};
pub use services::SsoServices;
