//! Backing Store Client
//!
//! Thin accessor over the authoritative key-value store. Owns the key
//! namespace, so derived cache records can never collide with tenant data:
//!
//! | key                      | contents                               |
//! |--------------------------|----------------------------------------|
//! | `tenant:{key}`           | tenant record (JSON)                   |
//! | `template:{name}`        | shared HTML template                   |
//! | `shard-index:{shard}`    | tenants in a partition (JSON)          |
//! | `shard-cache:{shard}`    | rendered shard artifact (derived)      |
//! | `shard-cache-ts:{shard}` | artifact write time, RFC 3339 (derived)|
//!
//! No operation here retries; a store failure propagates immediately.

mod seed;

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::shard::resolve_shard;
use crate::domain::{KvStore, ShardKey, TenantKey, TenantRecord};
use crate::error::{Error, Result};

pub use seed::SeedData;

/// Key derivation for every namespace
pub mod keys {
    use crate::domain::{ShardKey, TenantKey};

    pub fn tenant(tenant: &TenantKey) -> String {
        format!("tenant:{}", tenant)
    }

    pub fn template(name: &str) -> String {
        format!("template:{}", name)
    }

    pub fn shard_index(shard: &ShardKey) -> String {
        format!("shard-index:{}", shard)
    }

    pub fn shard_artifact(shard: &ShardKey) -> String {
        format!("shard-cache:{}", shard)
    }

    pub fn shard_timestamp(shard: &ShardKey) -> String {
        format!("shard-cache-ts:{}", shard)
    }
}

/// One tenant listed in a partition's raw data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardIndexEntry {
    pub tenant_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Persisted shard artifact with its write time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardCacheRecord {
    pub shard: ShardKey,
    pub rendered_artifact: String,
    pub written_at: DateTime<Utc>,
}

/// What the store holds for a shard artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredShard {
    pub artifact: String,
    /// `None` when the timestamp record is missing or unreadable
    pub written_at: Option<DateTime<Utc>>,
}

/// Backing store client
#[derive(Clone)]
pub struct BackingStore {
    kv: Arc<dyn KvStore>,
}

impl BackingStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    // =========================================================================
    // Tenant configuration
    // =========================================================================

    /// Read a tenant record; missing is `TenantNotFound`, unparseable is
    /// `MalformedData`.
    pub async fn get_tenant_record(&self, tenant: &TenantKey) -> Result<TenantRecord> {
        let key = keys::tenant(tenant);
        let raw = self
            .kv
            .get(&key)
            .await?
            .ok_or_else(|| Error::TenantNotFound(tenant.to_string()))?;
        TenantRecord::from_json(&key, &raw)
    }

    /// Read the shared template.
    pub async fn get_template(&self, name: &str) -> Result<String> {
        let key = keys::template(name);
        let raw = self
            .kv
            .get(&key)
            .await?
            .ok_or_else(|| Error::TemplateNotFound(name.to_string()))?;
        String::from_utf8(raw.to_vec()).map_err(|e| Error::malformed(&key, e))
    }

    pub async fn put_template(&self, name: &str, body: &str) -> Result<()> {
        self.kv
            .put(&keys::template(name), Bytes::from(body.to_string()))
            .await
    }

    /// Write a tenant record and list it in its partition.
    ///
    /// Used by the configuration-management side. Deliberately does not touch
    /// any cache tier: callers wanting the shard refreshed must invalidate it.
    pub async fn publish_tenant(
        &self,
        tenant: &TenantKey,
        record: &TenantRecord,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let shard = resolve_shard(tenant);
        let mut index = self.get_shard_index(&shard).await?;

        match index.iter_mut().find(|e| e.tenant_key == tenant.as_str()) {
            Some(entry) => entry.last_modified = Some(now),
            None => index.push(ShardIndexEntry {
                tenant_key: tenant.to_string(),
                last_modified: Some(now),
            }),
        }
        index.sort_by(|a, b| a.tenant_key.cmp(&b.tenant_key));

        self.kv
            .put_batch(vec![
                (keys::tenant(tenant), Bytes::from(record.to_json()?)),
                (keys::shard_index(&shard), Bytes::from(serde_json::to_vec(&index)?)),
            ])
            .await?;
        debug!(tenant = %tenant, shard = %shard, "Tenant published");
        Ok(())
    }

    /// Load a seed document through `publish_tenant` / `put_template`.
    pub async fn load_seed(&self, seed: &SeedData, now: DateTime<Utc>) -> Result<usize> {
        for (name, body) in &seed.templates {
            self.put_template(name, body).await?;
        }
        for (raw_key, record) in &seed.tenants {
            let tenant = TenantKey::parse(raw_key)?;
            self.publish_tenant(&tenant, record, now).await?;
        }
        Ok(seed.tenants.len())
    }

    // =========================================================================
    // Shard data
    // =========================================================================

    /// Raw partition data. A partition nobody has published to is empty.
    pub async fn get_shard_index(&self, shard: &ShardKey) -> Result<Vec<ShardIndexEntry>> {
        let key = keys::shard_index(shard);
        match self.kv.get(&key).await? {
            Some(raw) => serde_json::from_slice(&raw).map_err(|e| Error::malformed(&key, e)),
            None => Ok(Vec::new()),
        }
    }

    /// Read a derived shard artifact and its timestamp.
    ///
    /// The timestamp is only read when the artifact exists. Unreadable derived
    /// data is reported as absent so it gets regenerated from source.
    pub async fn get_shard_record(&self, shard: &ShardKey) -> Result<Option<StoredShard>> {
        let artifact_key = keys::shard_artifact(shard);
        let Some(raw) = self.kv.get(&artifact_key).await? else {
            return Ok(None);
        };
        let artifact = match String::from_utf8(raw.to_vec()) {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(shard = %shard, error = %e, "Shard artifact not UTF-8, discarding");
                return Ok(None);
            }
        };

        let ts_key = keys::shard_timestamp(shard);
        let written_at = match self.kv.get(&ts_key).await? {
            Some(raw) => {
                let parsed = std::str::from_utf8(&raw)
                    .ok()
                    .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                if parsed.is_none() {
                    warn!(shard = %shard, "Shard timestamp unreadable, treating as stale");
                }
                parsed
            }
            None => None,
        };

        Ok(Some(StoredShard {
            artifact,
            written_at,
        }))
    }

    /// Persist artifact and timestamp in one batch write.
    pub async fn put_shard_record(&self, record: &ShardCacheRecord) -> Result<()> {
        self.kv
            .put_batch(vec![
                (
                    keys::shard_artifact(&record.shard),
                    Bytes::from(record.rendered_artifact.clone()),
                ),
                (
                    keys::shard_timestamp(&record.shard),
                    Bytes::from(record.written_at.to_rfc3339()),
                ),
            ])
            .await
    }

    /// Exactly one delete, against the artifact key only.
    ///
    /// `shard-cache-ts:{shard}` is left behind without its artifact. Readers
    /// never see that state as a record: [`get_shard_record`] reads the
    /// artifact first and returns `None` when it is missing, and the next
    /// regeneration overwrites the timestamp in the same batch as the new
    /// artifact.
    ///
    /// [`get_shard_record`]: Self::get_shard_record
    pub async fn delete_shard_record(&self, shard: &ShardKey) -> Result<bool> {
        self.kv.delete(&keys::shard_artifact(shard)).await
    }
}
