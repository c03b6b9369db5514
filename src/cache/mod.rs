//! Tiered Cache System
//!
//! Three tiers of different scope and lifetime in front of one shared
//! backing store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                           Cache Manager                                  │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  Edge Response Cache   │ Process-Local Cache   │ Shard Cache             │
//! │  ┌──────────────────┐  │ ┌──────────────────┐  │ ┌─────────────────────┐ │
//! │  │ URL-keyed pages  │  │ │ tenant config 60s│  │ │ sitemap per shard   │ │
//! │  │ ttl 60s          │  │ │ template 5min    │  │ │ persisted, 24h      │ │
//! │  │ stale window 24h │  │ │ 200 entries      │  │ │ surgical invalidate │ │
//! │  └──────────────────┘  │ └──────────────────┘  │ └─────────────────────┘ │
//! │           │            │          │            │            │            │
//! │           └────────────┴──────────┴────────────┴────────────┘            │
//! │                                   │                                      │
//! │                          Backing Store Client                            │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the shard tier is ever invalidated. The other two rely on TTL.

pub(crate) mod entry;
mod edge;
mod local;
mod manager;
mod metrics;
mod proptest;
mod shard_cache;
mod sitemap;
pub mod shard;
pub mod variant;

pub use edge::{CachedResponse, EdgeCacheKey, EdgeLookup, EdgeRequest, EdgeResponseCache};
pub use entry::CacheEntry;
pub use local::{LocalCache, LocalClass, LocalFetch, ProcessLocalCache};
pub use manager::{
    task, CacheManager, CacheManagerBuilder, CacheStatus, PageResponse, HEADER_EDGE_CACHE,
};
pub use metrics::{outcome, CacheMetrics};
pub use shard::resolve_shard;
pub use shard_cache::{ShardArtifact, ShardCache, ShardOutcome};
pub use sitemap::SitemapGenerator;
pub use variant::{assign, VariantSpace};
