//! ---
//! sso_section: "01-core-functionality"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Shared primitives and utilities for the SSO gate runtime."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
//! Shared primitives for the SSO gate workspace: configuration loading and
//! tracing setup consumed by the auth crate and the control CLI.

pub mod config;
pub mod logging;

pub use config::{
    CacheConfig, LoadedSsoConfig, LoggingConfig, ModulesConfig, PermissionsConfig, ServiceConfig,
    SsoConfig, MAX_CACHE_TTL, VIEW_PERMISSION_TYPE,
};
pub use logging::{init_tracing, LogFormat};
