//! Domain Events
//!
//! Immutable records of things the cache subsystem did. `PageViewed` is the
//! analytics signal; it must carry the same fields whether the page was
//! rendered or served from the edge tier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ports::ShardKey;
use super::tenant::ResponseMetadata;

/// Which path produced a page response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServedFrom {
    /// Full render through the local cache and backing store
    Render,
    /// Fresh edge response cache entry
    EdgeHit,
    /// Edge entry past its TTL but inside the stale window
    EdgeStale,
}

impl std::fmt::Display for ServedFrom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServedFrom::Render => write!(f, "render"),
            ServedFrom::EdgeHit => write!(f, "edge_hit"),
            ServedFrom::EdgeStale => write!(f, "edge_stale"),
        }
    }
}

/// Domain event representing a significant occurrence in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// One logical page view.
    PageViewed {
        tenant_key: String,
        path: String,
        design_profile: String,
        design_variant: String,
        experiment_id: Option<String>,
        experiment_variant: Option<String>,
        served_from: ServedFrom,
        timestamp: DateTime<Utc>,
    },

    /// A shard artifact was regenerated and persisted.
    ShardRegenerated {
        shard: String,
        entries: usize,
        timestamp: DateTime<Utc>,
    },

    /// A shard artifact was deleted by a publish.
    ShardInvalidated {
        shard: String,
        existed: bool,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::PageViewed { .. } => "PageViewed",
            DomainEvent::ShardRegenerated { .. } => "ShardRegenerated",
            DomainEvent::ShardInvalidated { .. } => "ShardInvalidated",
        }
    }

    pub fn page_viewed(
        metadata: &ResponseMetadata,
        path: impl Into<String>,
        served_from: ServedFrom,
        timestamp: DateTime<Utc>,
    ) -> Self {
        DomainEvent::PageViewed {
            tenant_key: metadata.tenant_key.clone(),
            path: path.into(),
            design_profile: metadata.design_profile.clone(),
            design_variant: metadata.design_variant.clone(),
            experiment_id: metadata.experiment_id.clone(),
            experiment_variant: metadata.experiment_variant.clone(),
            served_from,
            timestamp,
        }
    }

    pub fn shard_regenerated(shard: &ShardKey, entries: usize, timestamp: DateTime<Utc>) -> Self {
        DomainEvent::ShardRegenerated {
            shard: shard.to_string(),
            entries,
            timestamp,
        }
    }

    pub fn shard_invalidated(shard: &ShardKey, existed: bool, timestamp: DateTime<Utc>) -> Self {
        DomainEvent::ShardInvalidated {
            shard: shard.to_string(),
            existed,
            timestamp,
        }
    }

    /// The response metadata carried by a page view, for equivalence checks.
    pub fn view_metadata(&self) -> Option<ResponseMetadata> {
        match self {
            DomainEvent::PageViewed {
                tenant_key,
                design_profile,
                design_variant,
                experiment_id,
                experiment_variant,
                ..
            } => Some(ResponseMetadata {
                tenant_key: tenant_key.clone(),
                design_profile: design_profile.clone(),
                design_variant: design_variant.clone(),
                experiment_id: experiment_id.clone(),
                experiment_variant: experiment_variant.clone(),
            }),
            _ => None,
        }
    }
}
