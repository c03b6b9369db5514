//! Process-Local Cache
//!
//! In-memory map scoped to one running instance, holding hot objects with a
//! short TTL per object class.
//!
//! # Design
//!
//! - One `LocalCache` per class (tenant configuration, shared template)
//! - Entries carry an absolute deadline; an expired entry is dropped on read
//! - Bounded entry count: inserting a new key at the bound clears the whole map
//! - Never shared across instances; staleness is bounded by TTL alone
//! - Concurrent misses on the same key may both fetch; last write wins

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use super::entry::CacheEntry;
use crate::config::EdgeConfig;
use crate::domain::{Clock, TenantRecord};
use crate::error::Result;

/// Object class with its own TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalClass {
    TenantConfig,
    Template,
}

impl LocalClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocalClass::TenantConfig => "tenant_config",
            LocalClass::Template => "template",
        }
    }
}

impl std::fmt::Display for LocalClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a read-through lookup
#[derive(Debug, Clone)]
pub struct LocalFetch<T> {
    pub value: T,
    /// True if served from memory without touching the next tier
    pub hit: bool,
    /// True if storing the fetched value cleared the map
    pub cleared: bool,
}

/// Single-class TTL cache
pub struct LocalCache<T> {
    class: LocalClass,
    entries: DashMap<String, CacheEntry<T>>,
    max_entries: usize,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    overflow_clears: AtomicU64,
}

impl<T: Clone> LocalCache<T> {
    pub fn new(
        class: LocalClass,
        default_ttl: Duration,
        max_entries: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            class,
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            default_ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            overflow_clears: AtomicU64::new(0),
        }
    }

    /// Get a live entry. An expired entry counts as a miss and is removed.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();

        let value = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match value {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            None => {
                // Re-check under the write lock so a concurrent fresh put survives
                self.entries.remove_if(key, |_, entry| entry.is_expired(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert with an explicit TTL. Returns true if the map was cleared to
    /// make room.
    pub fn put(&self, key: impl Into<String>, value: T, ttl: Duration) -> bool {
        let key = key.into();
        let mut cleared = false;

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.entries.clear();
            self.overflow_clears.fetch_add(1, Ordering::Relaxed);
            cleared = true;
            debug!(class = %self.class, bound = self.max_entries, "Local cache full, cleared");
        }

        let entry = CacheEntry::new(value, self.clock.now(), ttl);
        self.entries.insert(key, entry);
        cleared
    }

    /// Insert with the class TTL.
    pub fn put_default(&self, key: impl Into<String>, value: T) -> bool {
        self.put(key, value, self.default_ttl)
    }

    /// Read through to `fetch` on a miss. A failed fetch populates nothing.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<LocalFetch<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(LocalFetch {
                value,
                hit: true,
                cleared: false,
            });
        }

        let value = fetch().await?;
        let cleared = self.put_default(key, value.clone());
        Ok(LocalFetch {
            value,
            hit: false,
            cleared,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn overflow_clears(&self) -> u64 {
        self.overflow_clears.load(Ordering::Relaxed)
    }
}

/// Both process-local classes, constructed per instance (and per test).
pub struct ProcessLocalCache {
    tenant_configs: LocalCache<Arc<TenantRecord>>,
    templates: LocalCache<Arc<str>>,
}

impl ProcessLocalCache {
    pub fn new(config: &EdgeConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            tenant_configs: LocalCache::new(
                LocalClass::TenantConfig,
                config.tenant_config_ttl(),
                config.local_max_entries,
                clock.clone(),
            ),
            templates: LocalCache::new(
                LocalClass::Template,
                config.template_ttl(),
                config.local_max_entries,
                clock,
            ),
        }
    }

    pub fn tenant_configs(&self) -> &LocalCache<Arc<TenantRecord>> {
        &self.tenant_configs
    }

    pub fn templates(&self) -> &LocalCache<Arc<str>> {
        &self.templates
    }

    pub fn clear(&self) {
        self.tenant_configs.clear();
        self.templates.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
