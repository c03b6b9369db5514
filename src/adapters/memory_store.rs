//! In-Memory Backing Store
//!
//! `KvStore` implementation used by tests and by the binary when no external
//! store is configured. Counts every operation so tests can assert how many
//! round trips a cache path costs, and can be switched unavailable to inject
//! transient failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::domain::KvStore;
use crate::error::{Error, Result};

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub keys: usize,
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
}

/// In-memory key-value store
#[derive(Default)]
pub struct InMemoryStore {
    /// Single lock so batch writes become visible all at once
    data: RwLock<HashMap<String, Bytes>>,
    key_reads: DashMap<String, u64>,
    unavailable: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `StoreUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Write directly, bypassing counters and the availability switch
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.data.write().insert(key.into(), value.into());
    }

    /// Read directly, bypassing counters and the availability switch
    pub fn peek(&self, key: &str) -> Option<Bytes> {
        self.data.read().get(key).cloned()
    }

    /// Number of `get` calls made for one key
    pub fn reads_of(&self, key: &str) -> u64 {
        self.key_reads.get(key).map(|count| *count).unwrap_or(0)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.data.read().len(),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        *self.key_reads.entry(key.to_string()).or_insert(0) += 1;
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn put_batch(&self, entries: Vec<(String, Bytes)>) -> Result<()> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut data = self.data.write();
        for (key, value) in entries {
            data.insert(key, value);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(self.data.write().remove(key).is_some())
    }
}
