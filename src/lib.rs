//! edgetier - Tiered Cache and Shard Coordination for Multi-Tenant Edge Serving
//!
//! Serves independently branded tenant sites from one shared backing store,
//! keeping store reads and writes within budget.
//!
//! # Architecture
//!
//! ```text
//! request ─▶ Edge Response Cache ─▶ Process-Local Cache ─▶ Backing Store
//!                 (60s + 24h stale)      (60s / 5min)          (source of truth)
//!
//! sitemap ─▶ Shard Cache (24h, persisted) ─▶ shard index ─▶ Backing Store
//!
//! publish ─▶ invalidate exactly one shard
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Infrastructure adapters implementing domain ports
//! - [`cache`] - The cache tiers, shard resolver, variant assigner and manager
//! - [`config`] - Runtime configuration
//! - [`domain`] - Domain layer with ports, tenant records and events
//! - [`error`] - Error types
//! - [`server`] - HTTP surface
//! - [`store`] - Backing store client and seed loading

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use cache::{CacheManager, CacheStatus, EdgeRequest, PageResponse};
pub use config::EdgeConfig;
pub use domain::{ShardKey, TenantKey};
pub use error::{Error, Result};
pub use store::{BackingStore, SeedData};
