//! Shard Cache
//!
//! Backing-store-persisted cache of per-shard sitemap artifacts.
//!
//! # Read path
//!
//! ```text
//! get_shard(s) ──▶ shard-cache:{s} + shard-cache-ts:{s}
//!                      │ present and younger than lifetime ──▶ Hit
//!                      ▼
//!                  shard-index:{s} ──▶ render ──▶ put_batch(artifact, ts) ──▶ Miss
//! ```
//!
//! # Write path
//!
//! `invalidate(s)` deletes `shard-cache:{s}` and nothing else. No lock guards
//! either path; concurrent regenerations of one shard write identical bytes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::entry::add_ttl;
use super::metrics::{outcome, CacheMetrics};
use super::sitemap::SitemapGenerator;
use crate::domain::{Clock, ShardKey};
use crate::error::Result;
use crate::store::{BackingStore, ShardCacheRecord};

/// Whether a lookup was served from the persisted artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardOutcome {
    Hit,
    Miss,
}

/// Result of a shard lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardArtifact {
    pub shard: ShardKey,
    pub artifact: String,
    pub written_at: DateTime<Utc>,
    pub outcome: ShardOutcome,
    /// Tenants listed; only known when the artifact was regenerated
    pub regenerated_entries: Option<usize>,
}

/// Shard cache
pub struct ShardCache {
    store: BackingStore,
    generator: SitemapGenerator,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
    metrics: CacheMetrics,
}

impl ShardCache {
    pub fn new(
        store: BackingStore,
        generator: SitemapGenerator,
        clock: Arc<dyn Clock>,
        lifetime: Duration,
        metrics: CacheMetrics,
    ) -> Self {
        Self {
            store,
            generator,
            clock,
            lifetime,
            metrics,
        }
    }

    /// A record is fresh while `now - written_at < lifetime`.
    pub fn is_fresh(&self, written_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now < add_ttl(written_at, self.lifetime)
    }

    /// Serve a shard artifact, regenerating it when absent or stale.
    pub async fn get_shard(&self, shard: &ShardKey) -> Result<ShardArtifact> {
        let now = self.clock.now();

        match self.store.get_shard_record(shard).await {
            Ok(Some(stored)) => {
                if let Some(written_at) = stored.written_at.filter(|t| self.is_fresh(*t, now)) {
                    self.metrics.record_shard_lookup(outcome::HIT);
                    debug!(shard = %shard, "Shard cache hit");
                    return Ok(ShardArtifact {
                        shard: shard.clone(),
                        artifact: stored.artifact,
                        written_at,
                        outcome: ShardOutcome::Hit,
                        regenerated_entries: None,
                    });
                }
                debug!(shard = %shard, written_at = ?stored.written_at, "Shard cache stale");
            }
            Ok(None) => debug!(shard = %shard, "Shard cache miss"),
            Err(e) => {
                self.metrics.record_shard_lookup(outcome::ERROR);
                return Err(e);
            }
        }

        self.metrics.record_shard_lookup(outcome::MISS);
        self.regenerate(shard, now).await
    }

    /// Rebuild from raw data and persist artifact plus timestamp together.
    /// Unparseable raw data fails here and nothing is written.
    async fn regenerate(&self, shard: &ShardKey, now: DateTime<Utc>) -> Result<ShardArtifact> {
        let entries = self.store.get_shard_index(shard).await?;
        let artifact = self.generator.render_shard(&entries);

        let record = ShardCacheRecord {
            shard: shard.clone(),
            rendered_artifact: artifact,
            written_at: now,
        };
        self.store.put_shard_record(&record).await?;
        self.metrics.record_shard_regeneration();

        info!(shard = %shard, entries = entries.len(), "Shard artifact regenerated");

        Ok(ShardArtifact {
            shard: record.shard,
            artifact: record.rendered_artifact,
            written_at: now,
            outcome: ShardOutcome::Miss,
            regenerated_entries: Some(entries.len()),
        })
    }

    /// Delete one shard's artifact. Returns whether it existed.
    pub async fn invalidate(&self, shard: &ShardKey) -> Result<bool> {
        let existed = self.store.delete_shard_record(shard).await?;
        self.metrics.record_shard_invalidation();
        info!(shard = %shard, existed, "Shard invalidated");
        Ok(existed)
    }

    /// Validate a raw identifier, then invalidate. A malformed identifier
    /// fails before any store access.
    pub async fn invalidate_raw(&self, raw: &str) -> Result<(ShardKey, bool)> {
        let shard = ShardKey::parse(raw)?;
        let existed = self.invalidate(&shard).await?;
        Ok((shard, existed))
    }

    pub fn generator(&self) -> &SitemapGenerator {
        &self.generator
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryStore, ManualClock};
    use crate::domain::{TenantKey, TenantRecord};
    use crate::error::Error;
    use crate::store::keys;

    struct Fixture {
        cache: ShardCache,
        store: BackingStore,
        mem: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let mem = Arc::new(InMemoryStore::new());
        let store = BackingStore::new(mem.clone());
        let clock = Arc::new(ManualClock::default());
        let cache = ShardCache::new(
            store.clone(),
            SitemapGenerator::new("example.com"),
            clock.clone(),
            Duration::from_secs(24 * 60 * 60),
            CacheMetrics::new().unwrap(),
        );
        Fixture {
            cache,
            store,
            mem,
            clock,
        }
    }

    fn shard(raw: &str) -> ShardKey {
        ShardKey::parse(raw).unwrap()
    }

    async fn publish(f: &Fixture, tenant: &str) {
        f.store
            .publish_tenant(
                &TenantKey::parse(tenant).unwrap(),
                &TenantRecord::default(),
                f.clock.now(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_second_lookup_is_hit_with_identical_bytes() {
        let f = fixture();
        publish(&f, "aardvark-cafe").await;
        let index_reads = f.mem.reads_of(&keys::shard_index(&shard("aa")));

        let first = f.cache.get_shard(&shard("aa")).await.unwrap();
        let second = f.cache.get_shard(&shard("aa")).await.unwrap();

        assert_eq!(first.outcome, ShardOutcome::Miss);
        assert_eq!(second.outcome, ShardOutcome::Hit);
        assert_eq!(first.artifact, second.artifact);
        assert!(first.artifact.contains("aardvark-cafe.example.com"));
        assert_eq!(
            f.mem.reads_of(&keys::shard_index(&shard("aa"))),
            index_reads + 1
        );
        assert_eq!(f.cache.metrics.shard_regenerations(), 1);
    }

    #[tokio::test]
    async fn test_empty_shard_is_cached() {
        let f = fixture();
        let first = f.cache.get_shard(&shard("qx")).await.unwrap();
        assert_eq!(first.outcome, ShardOutcome::Miss);
        assert_eq!(first.regenerated_entries, Some(0));
        assert!(first.artifact.contains("<urlset"));

        let second = f.cache.get_shard(&shard("qx")).await.unwrap();
        assert_eq!(second.outcome, ShardOutcome::Hit);
    }

    #[tokio::test]
    async fn test_expires_after_lifetime() {
        let f = fixture();
        f.cache.get_shard(&shard("gr")).await.unwrap();

        f.clock.advance(Duration::from_secs(24 * 60 * 60 - 1));
        assert_eq!(
            f.cache.get_shard(&shard("gr")).await.unwrap().outcome,
            ShardOutcome::Hit
        );

        f.clock.advance(Duration::from_secs(1));
        assert_eq!(
            f.cache.get_shard(&shard("gr")).await.unwrap().outcome,
            ShardOutcome::Miss
        );
    }

    #[tokio::test]
    async fn test_missing_timestamp_is_stale() {
        let f = fixture();
        f.mem.insert_raw(keys::shard_artifact(&shard("gr")), "<urlset/>");

        let result = f.cache.get_shard(&shard("gr")).await.unwrap();
        assert_eq!(result.outcome, ShardOutcome::Miss);
        assert!(f.mem.peek(&keys::shard_timestamp(&shard("gr"))).is_some());
    }

    #[tokio::test]
    async fn test_regeneration_reflects_published_data_only_after_invalidation() {
        let f = fixture();
        let before = f.cache.get_shard(&shard("aw")).await.unwrap();
        assert!(!before.artifact.contains("aw-bakery"));

        publish(&f, "aw-bakery").await;
        let cached = f.cache.get_shard(&shard("aw")).await.unwrap();
        assert_eq!(cached.outcome, ShardOutcome::Hit);
        assert!(!cached.artifact.contains("aw-bakery"));

        assert!(f.cache.invalidate(&shard("aw")).await.unwrap());
        let fresh = f.cache.get_shard(&shard("aw")).await.unwrap();
        assert_eq!(fresh.outcome, ShardOutcome::Miss);
        assert!(fresh.artifact.contains("aw-bakery.example.com"));
    }

    #[tokio::test]
    async fn test_invalidation_is_surgical() {
        let f = fixture();
        f.cache.get_shard(&shard("aa")).await.unwrap();
        f.cache.get_shard(&shard("gr")).await.unwrap();

        let before = f.mem.stats();
        f.cache.invalidate(&shard("gr")).await.unwrap();
        let after = f.mem.stats();
        assert_eq!(after.deletes - before.deletes, 1);
        assert_eq!(after.reads, before.reads);
        assert_eq!(after.writes, before.writes);

        assert_eq!(
            f.cache.get_shard(&shard("gr")).await.unwrap().outcome,
            ShardOutcome::Miss
        );
        assert_eq!(
            f.cache.get_shard(&shard("aa")).await.unwrap().outcome,
            ShardOutcome::Hit
        );
    }

    #[tokio::test]
    async fn test_invalidate_raw_rejects_before_store_access() {
        let f = fixture();
        for raw in ["g", "gra", "GR", "g_", ""] {
            let err = f.cache.invalidate_raw(raw).await.unwrap_err();
            assert!(matches!(err, Error::InvalidShardKey(_)), "{:?}", raw);
        }
        assert_eq!(f.mem.stats().deletes, 0);
        assert_eq!(f.cache.metrics.shard_invalidations(), 0);

        let (key, existed) = f.cache.invalidate_raw("zz").await.unwrap();
        assert_eq!(key.as_str(), "zz");
        assert!(!existed);
    }

    #[tokio::test]
    async fn test_malformed_index_is_not_persisted() {
        let f = fixture();
        f.mem.insert_raw(keys::shard_index(&shard("gr")), "{oops");

        let err = f.cache.get_shard(&shard("gr")).await.unwrap_err();
        assert!(matches!(err, Error::MalformedData { .. }));
        assert!(f.mem.peek(&keys::shard_artifact(&shard("gr"))).is_none());
        assert!(f.mem.peek(&keys::shard_timestamp(&shard("gr"))).is_none());
    }

    #[tokio::test]
    async fn test_store_unavailable_propagates() {
        let f = fixture();
        f.mem.set_unavailable(true);
        let err = f.cache.get_shard(&shard("gr")).await.unwrap_err();
        assert!(err.is_transient());

        let err = f.cache.invalidate(&shard("gr")).await.unwrap_err();
        assert!(err.is_transient());
    }
}
