//! Process-wide response cache with per-entry expiry.
//!
//! [`ResponseCache`] stores response bodies as text keyed by request URL.
//! Whether a request may use the cache is decided per HTTP method through an
//! explicit enablement table (only GET is enabled by default).
//!
//! An entry is never returned once its expiry has passed; expired entries are
//! evicted lazily on lookup or overwritten by the next store.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use request_engine::request::ResponseCache;
//! use reqwest::Method;
//!
//! let cache = ResponseCache::new();
//! assert!(cache.is_enabled(&Method::GET));
//! assert!(!cache.is_enabled(&Method::POST));
//!
//! cache.put_with_ttl("https://example.com/a", "body".to_string(), Duration::from_secs(60));
//! assert_eq!(cache.get("https://example.com/a").as_deref(), Some("body"));
//! ```

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use reqwest::Method;
use tracing::{debug, instrument};

use super::constants::DEFAULT_CACHE_EXPIRY;

/// Lifetime substituted for a ttl that overflows `SystemTime` (about 10,000 years).
const FAR_FUTURE: Duration = Duration::from_secs(10_000 * 365 * 24 * 60 * 60);

/// Absolute expiry `ttl` from now, clamped to [`FAR_FUTURE`] on overflow.
pub(crate) fn expiry_from_now(ttl: Duration) -> SystemTime {
    let now = SystemTime::now();
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// A cached body and the absolute time it stops being valid.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: SystemTime,
}

/// Shared response cache.
///
/// Designed to be wrapped in `Arc` and shared by every engine in the process.
/// `DashMap` shards guard each key, so a `get` never observes a value paired
/// with another store's expiry and concurrent `put`s to one key serialize.
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    enabled_methods: HashMap<Method, bool>,
    default_expiry: Duration,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    /// Creates a cache with GET enabled and a 60 second default expiry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_methods(HashMap::from([(Method::GET, true)]))
    }

    /// Creates a cache with an explicit `{method: enabled}` table.
    ///
    /// Methods missing from the table are treated as disabled.
    #[must_use]
    pub fn with_methods(enabled_methods: HashMap<Method, bool>) -> Self {
        Self {
            entries: DashMap::new(),
            enabled_methods,
            default_expiry: DEFAULT_CACHE_EXPIRY,
        }
    }

    /// Overrides the lifetime used by [`put_default`](Self::put_default).
    #[must_use]
    pub fn with_default_expiry(mut self, expiry: Duration) -> Self {
        self.default_expiry = expiry;
        self
    }

    /// Returns the default entry lifetime.
    #[must_use]
    pub fn default_expiry(&self) -> Duration {
        self.default_expiry
    }

    /// Returns whether requests with `method` may be served from and stored in the cache.
    #[must_use]
    pub fn is_enabled(&self, method: &Method) -> bool {
        self.enabled_methods.get(method).copied().unwrap_or(false)
    }

    /// Looks up `key`, treating expired entries as misses.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, SystemTime::now())
    }

    /// Looks up `key` as of `now`. Expired entries are removed.
    #[instrument(level = "debug", skip(self, now))]
    pub fn get_at(&self, key: &str, now: SystemTime) -> Option<String> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                if now < entry.get().expires_at {
                    Some(entry.get().value.clone())
                } else {
                    debug!("evicting expired cache entry");
                    entry.remove();
                    None
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Stores `value` under `key` until the absolute time `expires_at`.
    #[instrument(level = "debug", skip(self, value), fields(bytes = value.len()))]
    pub fn put(&self, key: &str, value: String, expires_at: SystemTime) {
        self.entries
            .insert(key.to_string(), CacheEntry { value, expires_at });
    }

    /// Stores `value` for `ttl` from now. A `ttl` too large to represent never expires.
    pub fn put_with_ttl(&self, key: &str, value: String, ttl: Duration) {
        self.put(key, value, expiry_from_now(ttl));
    }

    /// Stores `value` using the cache's default lifetime.
    pub fn put_default(&self, key: &str, value: String) {
        self.put_with_ttl(key, value, self.default_expiry);
    }

    /// Removes `key`, returning whether an entry existed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drops entries whose expiry has passed, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, expired ones included until evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
