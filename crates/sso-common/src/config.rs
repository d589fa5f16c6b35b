//! ---
//! sso_section: "01-core-functionality"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Shared primitives and utilities for the SSO gate runtime."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

/// Key of the child permission type granted to every child module by the "view system" special.
pub const VIEW_PERMISSION_TYPE: &str = "VIEW";

fn default_service_url() -> String {
    "http://localhost:8000".to_owned()
}

fn default_verify_ssl() -> bool {
    true
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_pool_size() -> usize {
    20
}

fn default_token_verify_path() -> String {
    "/api/auth/verify/".to_owned()
}

fn default_user_permissions_path() -> String {
    "/api/core/permissions/user/".to_owned()
}

fn default_parent_module() -> String {
    "DEFAULT".to_owned()
}

fn default_manage_system() -> String {
    "manage_default_system".to_owned()
}

fn default_view_system() -> String {
    "view_default_system".to_owned()
}

fn default_child_types() -> IndexMap<String, String> {
    [
        ("VIEW", "view"),
        ("ADD", "add"),
        ("CHANGE", "change"),
        ("DELETE", "delete"),
    ]
    .into_iter()
    .map(|(name, action)| (name.to_owned(), action.to_owned()))
    .collect()
}

fn default_cache_enabled() -> bool {
    true
}

fn default_key_prefix() -> String {
    "sso_".to_owned()
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_cache_max_entries() -> u64 {
    10_000
}

/// Longest TTL accepted for any cache domain.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_file_enabled() -> bool {
    true
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the SSO gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SsoConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`SsoConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedSsoConfig {
    pub config: SsoConfig,
    pub source: PathBuf,
}

impl SsoConfig {
    pub const ENV_CONFIG_PATH: &str = "SSO_GATE_CONFIG";

    /// Load configuration from disk, respecting the `SSO_GATE_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedSsoConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedSsoConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedSsoConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Read and validate a configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<SsoConfig>()
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.service.validate()?;
        self.modules.validate()?;
        self.permissions.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for SsoConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: SsoConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Remote identity service connection settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_url")]
    pub url: String,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Extra attempts on transport failures. Zero means a single call.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_token_verify_path")]
    pub token_verify_path: String,
    #[serde(default = "default_user_permissions_path")]
    pub user_permissions_path: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            verify_ssl: default_verify_ssl(),
            request_timeout: default_request_timeout(),
            pool_size: default_pool_size(),
            max_retries: 0,
            token_verify_path: default_token_verify_path(),
            user_permissions_path: default_user_permissions_path(),
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)
            .with_context(|| format!("service url '{}' is not a valid url", self.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "service url '{}' must use http or https",
                self.url
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(anyhow!("service request_timeout must be greater than zero"));
        }
        if self.pool_size == 0 {
            return Err(anyhow!("service pool_size must be at least 1"));
        }
        Ok(())
    }

    /// Absolute URL of the token verification endpoint.
    pub fn token_verify_url(&self) -> String {
        join_endpoint(&self.url, &self.token_verify_path)
    }

    /// Absolute URL of the user permissions endpoint.
    pub fn user_permissions_url(&self) -> String {
        join_endpoint(&self.url, &self.user_permissions_path)
    }
}

fn join_endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Module hierarchy: one parent (system) module and its children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    #[serde(default = "default_parent_module")]
    pub parent: String,
    /// Child module display names mapped to their module codes.
    #[serde(default)]
    pub children: IndexMap<String, String>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            parent: default_parent_module(),
            children: IndexMap::new(),
        }
    }
}

impl ModulesConfig {
    pub fn validate(&self) -> Result<()> {
        if self.parent.trim().is_empty() {
            return Err(anyhow!("modules.parent must not be empty"));
        }
        for (name, code) in &self.children {
            if code.trim().is_empty() {
                return Err(anyhow!("child module '{}' has an empty code", name));
            }
            if code == &self.parent {
                return Err(anyhow!(
                    "child module '{}' reuses the parent module code '{}'",
                    name,
                    code
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default = "default_manage_system")]
    pub manage_system: String,
    #[serde(default = "default_view_system")]
    pub view_system: String,
    /// Child permission type names mapped to their action codes.
    #[serde(default = "default_child_types")]
    pub child_types: IndexMap<String, String>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            manage_system: default_manage_system(),
            view_system: default_view_system(),
            child_types: default_child_types(),
        }
    }
}

impl PermissionsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.manage_system.trim().is_empty() || self.view_system.trim().is_empty() {
            return Err(anyhow!(
                "permissions.manage_system and permissions.view_system must be set"
            ));
        }
        if !self.child_types.contains_key(VIEW_PERMISSION_TYPE) {
            return Err(anyhow!(
                "permissions.child_types must define a '{}' entry",
                VIEW_PERMISSION_TYPE
            ));
        }
        Ok(())
    }

    /// Action code of the view permission type.
    pub fn view_action(&self) -> &str {
        self.child_types
            .get(VIEW_PERMISSION_TYPE)
            .map(String::as_str)
            .unwrap_or("view")
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_cache_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub token_ttl: Duration,
    #[serde(default = "default_cache_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub permissions_ttl: Duration,
    #[serde(default = "default_cache_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub user_ttl: Duration,
    /// Capacity of the in-memory store.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            key_prefix: default_key_prefix(),
            token_ttl: default_cache_ttl(),
            permissions_ttl: default_cache_ttl(),
            user_ttl: default_cache_ttl(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, ttl) in [
            ("token_ttl", self.token_ttl),
            ("permissions_ttl", self.permissions_ttl),
            ("user_ttl", self.user_ttl),
        ] {
            if ttl > MAX_CACHE_TTL {
                return Err(anyhow!(
                    "cache.{} of {}s exceeds the maximum of {}s",
                    name,
                    ttl.as_secs(),
                    MAX_CACHE_TTL.as_secs()
                ));
            }
        }
        if self.max_entries == 0 {
            return Err(anyhow!("cache.max_entries must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Also write a daily rolling JSON file under `directory`.
    #[serde(default = "default_file_enabled")]
    pub file_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            file_enabled: default_file_enabled(),
        }
    }
}
