//! Domain Ports (Port/Adapter Pattern)
//!
//! Value objects shared by every tier, and the traits the cache subsystem uses
//! to reach its collaborators: the backing key-value store, the analytics
//! sink, the page renderer and the clock.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Cache Subsystem                         │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  KvStore │ EventPublisher │ PageRenderer │ Clock     │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  InMemoryStore │ LoggingEventPublisher │ TokenRenderer │ ... │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::events::DomainEvent;
use super::tenant::{ResponseMetadata, TenantRecord};
use crate::error::{Error, Result};

// =============================================================================
// Value Objects
// =============================================================================

/// Minimum tenant key length
pub const TENANT_KEY_MIN_LEN: usize = 3;

/// Maximum tenant key length
pub const TENANT_KEY_MAX_LEN: usize = 30;

#[inline]
fn is_key_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
}

/// Tenant identifier: 3-30 characters of `[a-z0-9-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantKey(String);

impl TenantKey {
    /// Validate and wrap a tenant key.
    pub fn parse(raw: &str) -> Result<Self> {
        let len = raw.chars().count();
        if !(TENANT_KEY_MIN_LEN..=TENANT_KEY_MAX_LEN).contains(&len) || !raw.chars().all(is_key_char)
        {
            return Err(Error::InvalidTenantKey(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TenantKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Partition identifier: exactly two characters of `[a-z0-9-]`.
///
/// The nominal partition space is the 676 alphabetic pairs returned by
/// [`ShardKey::all`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardKey(String);

impl ShardKey {
    /// Validate an externally supplied partition identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() != 2 || !raw.chars().all(is_key_char) {
            return Err(Error::InvalidShardKey(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Build from two characters already known to be valid.
    pub(crate) fn from_pair(first: char, second: char) -> Self {
        let mut key = String::with_capacity(2);
        key.push(first);
        key.push(second);
        Self(key)
    }

    /// The 676 alphabetic partitions, `aa` to `zz`.
    pub fn all() -> impl Iterator<Item = ShardKey> {
        ('a'..='z').flat_map(|first| ('a'..='z').map(move |second| Self::from_pair(first, second)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShardKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ShardKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// =============================================================================
// Backing Store Port
// =============================================================================

/// Authoritative key-value store shared by all instances.
///
/// Implementations report an unreachable store as [`Error::StoreUnavailable`].
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value; `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Write a single value.
    async fn put(&self, key: &str, value: Bytes) -> Result<()>;

    /// Write several values as one operation: either all land or none do.
    async fn put_batch(&self, entries: Vec<(String, Bytes)>) -> Result<()>;

    /// Delete a key, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

// =============================================================================
// Analytics Port
// =============================================================================

/// Analytics collaborator.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;
}

// =============================================================================
// Rendering Port
// =============================================================================

/// Templating collaborator: turns the shared template and a tenant record into
/// a page body. The metadata passed in is the same metadata written to the
/// response headers.
pub trait PageRenderer: Send + Sync {
    fn render(
        &self,
        template: &str,
        record: &TenantRecord,
        metadata: &ResponseMetadata,
        path: &str,
    ) -> Result<String>;
}

// =============================================================================
// Clock Port
// =============================================================================

/// Source of wall-clock time for every freshness decision.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
