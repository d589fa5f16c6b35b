//! ---
//! sso_section: "02-identity-access"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Identity resolution, permission aggregation, and caching."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::sync::Cache;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sso_common::config::CacheConfig;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::identity::{Identity, UserId, UserProfile};
use crate::permissions::PermissionPayload;

/// Errors reported by a cache backing store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The store could not be reached.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    /// The value could not be encoded for storage.
    #[error("cache value could not be encoded: {0}")]
    Encode(String),
}

/// Key-value store with per-entry expiry.
pub trait CacheBackend: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;
    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;
    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Store used when caching is disabled: nothing is kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

impl CacheBackend for NullCache {
    fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Upper bound applied to every entry TTL by [`MemoryCache`].
pub const MAX_ENTRY_TTL: Duration = sso_common::config::MAX_CACHE_TTL;

/// Entry count used when no capacity is configured.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    ttl: Duration,
}

/// Per-entry expiry: every write carries its own TTL.
struct EntryTtl;

impl Expiry<String, MemoryEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &MemoryEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &MemoryEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Bounded process-local TTL store backed by moka.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, MemoryEntry>,
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.entries.entry_count())
            .finish()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding at most `max_entries` values.
    pub fn with_capacity(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryTtl)
            .build();
        Self { entries }
    }

    /// Approximate entry count; exact after [`run_pending_tasks`](Self::run_pending_tasks).
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply pending evictions and expirations now instead of on the next writes.
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.entries.get(key).map(|entry| entry.value))
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let ttl = ttl.min(MAX_ENTRY_TTL);
        self.entries.insert(key.to_owned(), MemoryEntry { value, ttl });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(key);
        Ok(())
    }
}

/// The three cache domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheDomain {
    Token,
    Permissions,
    User,
}

impl CacheDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheDomain::Token => "token",
            CacheDomain::Permissions => "permissions",
            CacheDomain::User => "user",
        }
    }
}

/// Prefix and TTLs applied by the facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub key_prefix: String,
    pub token_ttl: Duration,
    pub permissions_ttl: Duration,
    pub user_ttl: Duration,
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            key_prefix: config.key_prefix.clone(),
            token_ttl: config.token_ttl,
            permissions_ttl: config.permissions_ttl,
            user_ttl: config.user_ttl,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

/// Typed view over a [`CacheBackend`]. Backend failures never reach callers.
#[derive(Debug, Clone)]
pub struct CacheFacade {
    backend: Arc<dyn CacheBackend>,
    settings: CacheSettings,
}

impl CacheFacade {
    pub fn new(backend: Arc<dyn CacheBackend>, settings: CacheSettings) -> Self {
        Self { backend, settings }
    }

    /// Facade over a fresh in-memory store, or over [`NullCache`] when disabled.
    pub fn from_config(config: &CacheConfig) -> Self {
        let backend: Arc<dyn CacheBackend> = if config.enabled {
            Arc::new(MemoryCache::with_capacity(config.max_entries))
        } else {
            info!("cache disabled; all lookups will miss");
            Arc::new(NullCache)
        };
        Self::new(backend, CacheSettings::from(config))
    }

    /// Facade that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullCache), CacheSettings::default())
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// `{prefix}{domain}_{identifier}`.
    pub fn make_key(&self, domain: CacheDomain, identifier: &str) -> String {
        format!(
            "{}{}_{}",
            self.settings.key_prefix,
            domain.as_str(),
            identifier
        )
    }

    /// Raw lookup; backend errors are logged and reported as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.backend.get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "cache get failed; treating as miss");
                None
            }
        }
    }

    /// Raw store; returns whether the backend accepted the value.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) -> bool {
        match self.backend.set(key, value, ttl) {
            Ok(()) => true,
            Err(err) => {
                error!(key, error = %err, "cache set failed");
                false
            }
        }
    }

    pub fn delete(&self, key: &str) {
        if let Err(err) = self.backend.delete(key) {
            error!(key, error = %err, "cache delete failed");
        }
    }

    fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(key, error = %err, "cached value could not be decoded; treating as miss");
                None
            }
        }
    }

    fn set_typed<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        match serde_json::to_value(value) {
            Ok(encoded) => self.set(key, encoded, ttl),
            Err(err) => {
                let err = CacheError::Encode(err.to_string());
                error!(key, error = %err, "cache set failed");
                false
            }
        }
    }

    /// Identity previously verified for `token`.
    pub fn cached_identity(&self, token: &str) -> Option<Identity> {
        let identity = self.get_typed::<Identity>(&self.make_key(CacheDomain::Token, token));
        match &identity {
            Some(identity) => debug!(user = %identity.username, "token cache hit"),
            None => debug!("token cache miss"),
        }
        identity
    }

    pub fn store_identity(&self, token: &str, identity: &Identity) -> bool {
        let stored = self.set_typed(
            &self.make_key(CacheDomain::Token, token),
            identity,
            self.settings.token_ttl,
        );
        if stored {
            debug!(ttl_secs = self.settings.token_ttl.as_secs(), "identity cached");
        }
        stored
    }

    pub fn invalidate_token(&self, token: &str) {
        self.delete(&self.make_key(CacheDomain::Token, token));
        info!("token cache entry invalidated");
    }

    /// Raw permission payload cached for a user.
    pub fn cached_permissions(&self, user_id: &UserId) -> Option<PermissionPayload> {
        let payload: Option<PermissionPayload> =
            self.get_typed(&self.make_key(CacheDomain::Permissions, user_id.as_str()));
        debug!(user_id = %user_id, hit = payload.is_some(), "permissions cache lookup");
        payload
    }

    pub fn store_permissions(&self, user_id: &UserId, payload: &PermissionPayload) -> bool {
        self.set_typed(
            &self.make_key(CacheDomain::Permissions, user_id.as_str()),
            payload,
            self.settings.permissions_ttl,
        )
    }

    pub fn cached_profile(&self, user_id: &UserId) -> Option<UserProfile> {
        self.get_typed(&self.make_key(CacheDomain::User, user_id.as_str()))
    }

    pub fn store_profile(&self, user_id: &UserId, profile: &UserProfile) -> bool {
        self.set_typed(
            &self.make_key(CacheDomain::User, user_id.as_str()),
            profile,
            self.settings.user_ttl,
        )
    }

    /// Cached profile for the identity, built and stored on a miss.
    /// Identities without an id get a fresh, uncached profile.
    pub fn profile_for(&self, identity: &Identity) -> UserProfile {
        let Some(user_id) = identity.id.as_ref() else {
            return identity.profile();
        };
        if let Some(profile) = self.cached_profile(user_id) {
            return profile;
        }
        let profile = identity.profile();
        self.store_profile(user_id, &profile);
        profile
    }

    /// Drop the user and permission entries for a user. Token entries are
    /// keyed by token and expire on their own.
    pub fn invalidate_user(&self, user_id: &UserId) {
        self.delete(&self.make_key(CacheDomain::User, user_id.as_str()));
        self.delete(&self.make_key(CacheDomain::Permissions, user_id.as_str()));
        info!(user_id = %user_id, "user cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct FailingBackend;

    impl CacheBackend for FailingBackend {
        fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
            Err(CacheError::Unavailable("connection reset".into()))
        }

        fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection reset".into()))
        }

        fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection reset".into()))
        }
    }

    fn memory_facade() -> CacheFacade {
        CacheFacade::new(Arc::new(MemoryCache::new()), CacheSettings::default())
    }

    fn identity(id: &str) -> Identity {
        Identity::from_verify_response(
            &json!({"id": id, "username": "alice", "email": "alice@example.com"}),
            "token-abc",
        )
        .unwrap()
    }

    #[test]
    fn keys_follow_prefix_domain_identifier() {
        let facade = memory_facade();
        assert_eq!(facade.make_key(CacheDomain::Token, "abc"), "sso_token_abc");
        assert_eq!(
            facade.make_key(CacheDomain::Permissions, "42"),
            "sso_permissions_42"
        );
        assert_eq!(facade.make_key(CacheDomain::User, "42"), "sso_user_42");
    }

    #[test]
    fn set_get_delete_round_trip() {
        let facade = memory_facade();
        let value = json!({"answer": 42});
        assert!(facade.set("k", value.clone(), Duration::from_secs(60)));
        assert_eq!(facade.get("k"), Some(value));
        facade.delete("k");
        assert_eq!(facade.get("k"), None);
    }

    #[test]
    fn expired_entries_are_absent() {
        let cache = MemoryCache::new();
        cache.set("k", json!(1), Duration::ZERO).unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn expired_entries_are_evicted_without_being_read() {
        let cache = MemoryCache::new();
        for i in 0..100 {
            cache
                .set(&format!("short-{i}"), json!(i), Duration::from_millis(1))
                .unwrap();
        }
        cache.set("long", json!("kept"), Duration::from_secs(60)).unwrap();
        // Expiry is processed in timer wheel ticks of about one second.
        std::thread::sleep(Duration::from_millis(1500));
        cache.run_pending_tasks();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long").unwrap(), Some(json!("kept")));
    }

    #[test]
    fn capacity_bounds_the_store() {
        let cache = MemoryCache::with_capacity(10);
        for i in 0..50 {
            cache
                .set(&format!("k{i}"), json!(i), Duration::from_secs(60))
                .unwrap();
        }
        cache.run_pending_tasks();
        assert!(cache.len() <= 10);
    }

    #[test]
    fn oversized_ttl_is_clamped() {
        let facade = memory_facade();
        let ident = identity("9");
        let huge = Duration::from_secs(i64::MAX as u64);
        assert!(facade.set("k", json!(1), huge));
        assert_eq!(facade.get("k"), Some(json!(1)));

        let settings = CacheSettings {
            token_ttl: huge,
            ..CacheSettings::default()
        };
        let facade = CacheFacade::new(Arc::new(MemoryCache::new()), settings);
        assert!(facade.store_identity("tok", &ident));
        assert!(facade.cached_identity("tok").is_some());
    }

    #[test]
    fn disabled_facade_always_misses() {
        let facade = CacheFacade::disabled();
        assert!(facade.set("k", json!(1), Duration::from_secs(60)));
        assert_eq!(facade.get("k"), None);
        assert!(facade.store_identity("t", &identity("1")));
        assert!(facade.cached_identity("t").is_none());
    }

    #[test]
    fn backend_failures_are_swallowed() {
        let facade = CacheFacade::new(Arc::new(FailingBackend), CacheSettings::default());
        assert!(!facade.set("k", json!(1), Duration::from_secs(60)));
        assert_eq!(facade.get("k"), None);
        facade.delete("k");
    }

    #[test]
    fn undecodable_values_are_misses() {
        let facade = memory_facade();
        facade.set(
            &facade.make_key(CacheDomain::Token, "t"),
            json!("not an identity"),
            Duration::from_secs(60),
        );
        assert!(facade.cached_identity("t").is_none());
    }

    #[test]
    fn identity_round_trips_through_the_token_domain() {
        let facade = memory_facade();
        let original = identity("7");
        assert!(facade.store_identity("token-abc", &original));
        let cached = facade.cached_identity("token-abc").unwrap();
        assert_eq!(cached, original);
        facade.invalidate_token("token-abc");
        assert!(facade.cached_identity("token-abc").is_none());
    }

    #[test]
    fn invalidate_user_drops_profile_and_permissions() {
        let facade = memory_facade();
        let ident = identity("7");
        let user_id = ident.id.clone().unwrap();
        let payload = PermissionPayload::from_modules([("tc", vec!["view_tc"])]);
        assert!(facade.store_permissions(&user_id, &payload));
        let profile = facade.profile_for(&ident);
        assert_eq!(facade.cached_profile(&user_id), Some(profile));
        assert_eq!(facade.cached_permissions(&user_id), Some(payload));

        facade.invalidate_user(&user_id);
        assert!(facade.cached_permissions(&user_id).is_none());
        assert!(facade.cached_profile(&user_id).is_none());
    }
}
