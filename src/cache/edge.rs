//! Edge Response Cache
//!
//! Response-level cache in front of page rendering, keyed by the request URL
//! with query string and fragment stripped.
//!
//! # Lifetimes
//!
//! ```text
//! stored_at ──── ttl ────▶ stale window ────▶ dropped
//!            Fresh          Stale (served, revalidated in background)
//! ```
//!
//! There is no invalidation path into this tier. Tenant updates become visible
//! once the TTL lapses.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hyper::header::{HeaderMap, CACHE_CONTROL, PRAGMA};
use parking_lot::Mutex;
use tracing::debug;

use super::entry::add_ttl;
use crate::domain::{Clock, ResponseMetadata, TenantKey};
use crate::error::{Error, Result};

// =============================================================================
// Cache Key
// =============================================================================

/// Normalized request identity.
///
/// Tracking parameters collapse into one entry per tenant and path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeCacheKey(String);

impl EdgeCacheKey {
    /// Strip fragment and query; lowercase scheme and host.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = url.trim();
        let without_fragment = url.split('#').next().unwrap_or("");
        let without_query = without_fragment.split('?').next().unwrap_or("");

        let (scheme, rest) = without_query
            .split_once("://")
            .ok_or_else(|| Error::InvalidUrl(url.to_string()))?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
            return Err(Error::InvalidUrl(url.to_string()));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err(Error::InvalidUrl(url.to_string()));
        }

        Ok(Self(format!(
            "{}://{}{}",
            scheme.to_ascii_lowercase(),
            authority.to_ascii_lowercase(),
            path
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path component of the normalized URL
    pub fn path(&self) -> &str {
        let after_scheme = self.0.split_once("://").map(|(_, r)| r).unwrap_or("");
        after_scheme
            .find('/')
            .map(|idx| &after_scheme[idx..])
            .unwrap_or("/")
    }
}

impl std::fmt::Display for EdgeCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Request
// =============================================================================

/// An inbound page request already routed to a tenant.
#[derive(Debug, Clone)]
pub struct EdgeRequest {
    pub tenant: TenantKey,
    pub url: String,
    pub headers: HeaderMap,
}

impl EdgeRequest {
    pub fn new(tenant: TenantKey, url: impl Into<String>) -> Self {
        Self {
            tenant,
            url: url.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Query string, without the leading `?` or any fragment
    pub fn query(&self) -> Option<&str> {
        let without_fragment = self.url.split('#').next().unwrap_or("");
        without_fragment.split_once('?').map(|(_, q)| q)
    }

    /// True if the request opts out of the edge tier: the reserved query
    /// parameter, `Cache-Control: no-cache|no-store`, or `Pragma: no-cache`.
    pub fn is_bypass(&self, bypass_param: &str) -> bool {
        let param_present = self.query().is_some_and(|query| {
            query.split('&').any(|pair| {
                let name = pair.split('=').next().unwrap_or("");
                urlencoding::decode(name)
                    .map(|decoded| decoded == bypass_param)
                    .unwrap_or(false)
            })
        });
        if param_present {
            return true;
        }

        let directive_present = |name, directives: &[&str]| {
            self.headers.get_all(name).iter().any(|value| {
                value.to_str().is_ok_and(|v| {
                    v.split(',').any(|d| {
                        let d = d.trim();
                        directives.iter().any(|want| d.eq_ignore_ascii_case(want))
                    })
                })
            })
        };

        directive_present(CACHE_CONTROL, &["no-cache", "no-store"])
            || directive_present(PRAGMA, &["no-cache"])
    }
}

// =============================================================================
// Cached Response
// =============================================================================

/// A complete rendered response as held by the edge tier.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    /// Metadata carried in the headers, if present
    pub fn metadata(&self) -> Option<ResponseMetadata> {
        ResponseMetadata::from_headers(&self.headers)
    }
}

#[derive(Debug, Clone)]
struct StoredResponse {
    response: CachedResponse,
    fresh_until: DateTime<Utc>,
    stale_until: DateTime<Utc>,
}

/// Lookup outcome
#[derive(Debug, Clone)]
pub enum EdgeLookup {
    Fresh(CachedResponse),
    /// Past TTL, inside the stale window
    Stale(CachedResponse),
    Miss,
}

// =============================================================================
// Edge Response Cache
// =============================================================================

/// Edge response cache
///
/// Entries past their stale window are dropped when read, and in bulk by
/// [`purge_if_due`](Self::purge_if_due), which sweeps at most once per TTL.
pub struct EdgeResponseCache {
    entries: DashMap<EdgeCacheKey, StoredResponse>,
    ttl: Duration,
    stale_window: Duration,
    clock: Arc<dyn Clock>,
    last_purge: Mutex<DateTime<Utc>>,
}

impl EdgeResponseCache {
    pub fn new(ttl: Duration, stale_window: Duration, clock: Arc<dyn Clock>) -> Self {
        let last_purge = Mutex::new(clock.now());
        Self {
            entries: DashMap::new(),
            ttl,
            stale_window,
            clock,
            last_purge,
        }
    }

    pub fn lookup(&self, key: &EdgeCacheKey) -> EdgeLookup {
        let now = self.clock.now();

        let found = self.entries.get(key).map(|stored| {
            if now < stored.fresh_until {
                EdgeLookup::Fresh(stored.response.clone())
            } else if now < stored.stale_until {
                EdgeLookup::Stale(stored.response.clone())
            } else {
                EdgeLookup::Miss
            }
        });

        match found {
            Some(EdgeLookup::Miss) => {
                self.entries
                    .remove_if(key, |_, stored| now >= stored.stale_until);
                debug!(key = %key, "Edge entry past stale window, dropped");
                EdgeLookup::Miss
            }
            Some(hit) => hit,
            None => EdgeLookup::Miss,
        }
    }

    /// Store with the configured TTL and stale window.
    pub fn store(&self, key: EdgeCacheKey, response: CachedResponse) {
        let now = self.clock.now();
        let fresh_until = add_ttl(now, self.ttl);
        let stale_until = add_ttl(fresh_until, self.stale_window);
        self.entries.insert(
            key,
            StoredResponse {
                response,
                fresh_until,
                stale_until,
            },
        );
    }

    /// Drop every entry past its stale window. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, stored| now < stored.stale_until);
        before.saturating_sub(self.entries.len())
    }

    /// Purge if at least one TTL has passed since the last sweep. Returns how
    /// many entries were dropped.
    pub fn purge_if_due(&self) -> usize {
        let now = self.clock.now();
        {
            let mut last = self.last_purge.lock();
            if now < add_ttl(*last, self.ttl) {
                return 0;
            }
            *last = now;
        }

        let purged = self.purge_expired();
        if purged > 0 {
            debug!(purged, remaining = self.entries.len(), "Edge cache swept");
        }
        purged
    }

    pub fn contains(&self, key: &EdgeCacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stale_window(&self) -> Duration {
        self.stale_window
    }

    /// `Cache-Control` value advertised on stored responses
    pub fn cache_control_value(&self) -> String {
        format!(
            "public, max-age=0, s-maxage={}, stale-while-revalidate={}",
            self.ttl.as_secs(),
            self.stale_window.as_secs()
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
