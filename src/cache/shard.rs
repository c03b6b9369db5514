//! Shard Resolver
//!
//! A tenant's partition is the first two characters of its key. The resolver
//! is pure and total over validated tenant keys.

use crate::domain::{ShardKey, TenantKey};

/// Resolve a tenant to its partition.
#[inline]
pub fn resolve_shard(tenant: &TenantKey) -> ShardKey {
    // TenantKey guarantees at least three lowercase ASCII characters.
    let mut chars = tenant.as_str().chars();
    let first = chars.next().unwrap_or('a').to_ascii_lowercase();
    let second = chars.next().unwrap_or('a').to_ascii_lowercase();
    ShardKey::from_pair(first, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(key: &str) -> TenantKey {
        TenantKey::parse(key).unwrap()
    }

    #[test]
    fn test_first_two_characters() {
        assert_eq!(resolve_shard(&tenant("grand-royal")).as_str(), "gr");
        assert_eq!(resolve_shard(&tenant("aw-bakery")).as_str(), "aw");
        assert_eq!(resolve_shard(&tenant("zzz")).as_str(), "zz");
    }

    #[test]
    fn test_non_alphabetic_prefix_still_resolves() {
        let shard = resolve_shard(&tenant("9-lives"));
        assert_eq!(shard.as_str(), "9-");
        assert_eq!(ShardKey::parse(shard.as_str()).unwrap(), shard);
    }

    #[test]
    fn test_shared_prefix_shares_shard() {
        assert_eq!(
            resolve_shard(&tenant("grand-royal")),
            resolve_shard(&tenant("green-leaf"))
        );
        assert_ne!(
            resolve_shard(&tenant("grand-royal")),
            resolve_shard(&tenant("aw-bakery"))
        );
    }
}
