//! Cache Metrics Collection
//!
//! Prometheus counters for every tier, kept in a private registry so tests can
//! build independent managers side by side.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::Result;

/// Lookup outcome label values
pub mod outcome {
    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const STALE: &str = "stale";
    pub const BYPASS: &str = "bypass";
    pub const ERROR: &str = "error";
}

/// Cache metrics collector
#[derive(Clone)]
pub struct CacheMetrics {
    registry: Registry,
    local_lookups: IntCounterVec,
    local_overflow_clears: IntCounterVec,
    edge_lookups: IntCounterVec,
    edge_stores: IntCounter,
    edge_purged: IntCounter,
    shard_lookups: IntCounterVec,
    shard_regenerations: IntCounter,
    shard_invalidations: IntCounter,
    background_failures: IntCounterVec,
}

impl CacheMetrics {
    /// Create a collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let local_lookups = IntCounterVec::new(
            Opts::new(
                "edgetier_local_lookups_total",
                "Process-local cache lookups",
            ),
            &["class", "outcome"],
        )?;
        let local_overflow_clears = IntCounterVec::new(
            Opts::new(
                "edgetier_local_overflow_clears_total",
                "Process-local cache full clears on reaching the entry bound",
            ),
            &["class"],
        )?;
        let edge_lookups = IntCounterVec::new(
            Opts::new("edgetier_edge_lookups_total", "Edge response cache lookups"),
            &["outcome"],
        )?;
        let edge_stores = IntCounter::new(
            "edgetier_edge_stores_total",
            "Responses written into the edge response cache",
        )?;
        let edge_purged = IntCounter::new(
            "edgetier_edge_purged_total",
            "Edge entries dropped by the sweep after their stale window",
        )?;
        let shard_lookups = IntCounterVec::new(
            Opts::new("edgetier_shard_lookups_total", "Shard cache lookups"),
            &["outcome"],
        )?;
        let shard_regenerations = IntCounter::new(
            "edgetier_shard_regenerations_total",
            "Shard artifacts regenerated and persisted",
        )?;
        let shard_invalidations = IntCounter::new(
            "edgetier_shard_invalidations_total",
            "Surgical shard invalidations",
        )?;
        let background_failures = IntCounterVec::new(
            Opts::new(
                "edgetier_background_failures_total",
                "Fire-and-forget tasks that failed",
            ),
            &["task"],
        )?;

        registry.register(Box::new(local_lookups.clone()))?;
        registry.register(Box::new(local_overflow_clears.clone()))?;
        registry.register(Box::new(edge_lookups.clone()))?;
        registry.register(Box::new(edge_stores.clone()))?;
        registry.register(Box::new(edge_purged.clone()))?;
        registry.register(Box::new(shard_lookups.clone()))?;
        registry.register(Box::new(shard_regenerations.clone()))?;
        registry.register(Box::new(shard_invalidations.clone()))?;
        registry.register(Box::new(background_failures.clone()))?;

        Ok(Self {
            registry,
            local_lookups,
            local_overflow_clears,
            edge_lookups,
            edge_stores,
            edge_purged,
            shard_lookups,
            shard_regenerations,
            shard_invalidations,
            background_failures,
        })
    }

    // Process-local tier
    pub fn record_local_lookup(&self, class: &str, hit: bool) {
        let outcome = if hit { outcome::HIT } else { outcome::MISS };
        self.local_lookups.with_label_values(&[class, outcome]).inc();
    }

    pub fn record_local_overflow_clear(&self, class: &str) {
        self.local_overflow_clears.with_label_values(&[class]).inc();
    }

    pub fn local_lookups(&self, class: &str, outcome: &str) -> u64 {
        self.local_lookups.with_label_values(&[class, outcome]).get()
    }

    // Edge tier
    pub fn record_edge_lookup(&self, outcome: &str) {
        self.edge_lookups.with_label_values(&[outcome]).inc();
    }

    pub fn record_edge_store(&self) {
        self.edge_stores.inc();
    }

    pub fn edge_lookups(&self, outcome: &str) -> u64 {
        self.edge_lookups.with_label_values(&[outcome]).get()
    }

    pub fn edge_stores(&self) -> u64 {
        self.edge_stores.get()
    }

    pub fn record_edge_purged(&self, count: usize) {
        self.edge_purged.inc_by(count as u64);
    }

    pub fn edge_purged(&self) -> u64 {
        self.edge_purged.get()
    }

    // Shard tier
    pub fn record_shard_lookup(&self, outcome: &str) {
        self.shard_lookups.with_label_values(&[outcome]).inc();
    }

    pub fn record_shard_regeneration(&self) {
        self.shard_regenerations.inc();
    }

    pub fn record_shard_invalidation(&self) {
        self.shard_invalidations.inc();
    }

    pub fn shard_lookups(&self, outcome: &str) -> u64 {
        self.shard_lookups.with_label_values(&[outcome]).get()
    }

    pub fn shard_regenerations(&self) -> u64 {
        self.shard_regenerations.get()
    }

    pub fn shard_invalidations(&self) -> u64 {
        self.shard_invalidations.get()
    }

    // Background tasks
    pub fn record_background_failure(&self, task: &str) {
        self.background_failures.with_label_values(&[task]).inc();
    }

    pub fn background_failures(&self, task: &str) -> u64 {
        self.background_failures.with_label_values(&[task]).get()
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::error::Error::Internal(e.to_string()))
    }
}

impl std::fmt::Debug for CacheMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMetrics")
            .field("edge_stores", &self.edge_stores())
            .field("shard_regenerations", &self.shard_regenerations())
            .field("shard_invalidations", &self.shard_invalidations())
            .finish()
    }
}
