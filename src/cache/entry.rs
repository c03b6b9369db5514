//! Cache Entry Types

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Value with an absolute freshness deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Create an entry that expires `ttl` after `now`.
    pub fn new(value: T, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: add_ttl(now, ttl),
        }
    }

    /// The deadline is exclusive: at `expires_at` the entry is already expired.
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// `at + ttl`, saturating at the far future instead of overflowing.
pub(crate) fn add_ttl(at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
