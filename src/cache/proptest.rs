//! Property-Based Tests for the Cache Tiers
//!
//! # Test Properties
//!
//! 1. **Shard Totality**: every valid tenant key resolves to one two-character shard
//! 2. **Variant Determinism**: assignment depends on the tenant key and override only
//! 3. **Key Normalization**: query strings and fragments never split an edge entry
//! 4. **Artifact Determinism**: shard artifacts ignore input order and duplicates

#![cfg(test)]

use proptest::prelude::*;

use super::edge::{EdgeCacheKey, EdgeRequest};
use super::shard::resolve_shard;
use super::sitemap::SitemapGenerator;
use super::variant::{assign, parity, VariantSpace, AUTO};
use crate::domain::{ShardKey, TenantKey};
use crate::store::ShardIndexEntry;

// =============================================================================
// Property Strategies
// =============================================================================

/// Any key the identifier format admits.
fn tenant_key_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9-]{3,30}"
}

/// Keys whose shard is one of the 676 nominal partitions.
fn alphabetic_tenant_key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{2}[a-z0-9-]{1,28}"
}

fn space_strategy() -> impl Strategy<Value = VariantSpace> {
    prop_oneof![Just(VariantSpace::Design), Just(VariantSpace::Experiment)]
}

/// Query strings made of tracking-style parameters.
fn query_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(("[a-z_]{1,12}", "[A-Za-z0-9]{0,16}"), 1..6).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    })
}

// =============================================================================
// Shard Resolver
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: resolution is total and yields the lowercase two-character prefix.
    #[test]
    fn prop_shard_totality(raw in tenant_key_strategy()) {
        let tenant = TenantKey::parse(&raw).unwrap();
        let shard = resolve_shard(&tenant);

        prop_assert_eq!(shard.as_str().chars().count(), 2);
        prop_assert_eq!(shard.as_str(), &raw[..2]);
        prop_assert_eq!(&resolve_shard(&tenant), &shard);
        prop_assert!(ShardKey::parse(shard.as_str()).is_ok());
    }

    /// Property: alphabetic prefixes land in the listed partition space.
    #[test]
    fn prop_alphabetic_shards_are_listed(raw in alphabetic_tenant_key_strategy()) {
        let shard = resolve_shard(&TenantKey::parse(&raw).unwrap());
        prop_assert!(ShardKey::all().any(|listed| listed == shard));
    }
}

// =============================================================================
// Variant Assigner
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: without an override the result is the parity label, every time.
    #[test]
    fn prop_variant_determinism(raw in tenant_key_strategy(), space in space_strategy()) {
        let first = assign(&raw, None, space);
        prop_assert_eq!(&first, &assign(&raw, None, space));
        prop_assert_eq!(first.as_str(), space.labels()[parity(&raw)]);

        // "auto" and an empty override mean computed
        prop_assert_eq!(&first, &assign(&raw, Some(AUTO), space));
        prop_assert_eq!(&first, &assign(&raw, Some(""), space));
    }

    /// Property: a concrete override always wins.
    #[test]
    fn prop_override_wins(
        raw in tenant_key_strategy(),
        forced in "[a-z]{1,8}",
        space in space_strategy(),
    ) {
        prop_assume!(forced != AUTO);
        prop_assert_eq!(assign(&raw, Some(forced.as_str()), space), forced);
    }

    /// Property: both vocabularies agree on parity.
    #[test]
    fn prop_spaces_share_hash(raw in tenant_key_strategy()) {
        let design = assign(&raw, None, VariantSpace::Design);
        let experiment = assign(&raw, None, VariantSpace::Experiment);
        prop_assert_eq!(design == "calm", experiment == "A");
    }
}

// =============================================================================
// Edge Key Normalization
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: any query string or fragment maps onto the bare URL's key.
    #[test]
    fn prop_query_collapses(
        raw in alphabetic_tenant_key_strategy(),
        path in "(/[a-z0-9-]{1,10}){0,3}",
        query in query_strategy(),
        fragment in "[a-z]{0,8}",
    ) {
        let bare = format!("https://{}.example.com{}", raw, path);
        let decorated = format!("{}?{}#{}", bare, query, fragment);
        prop_assert_eq!(
            EdgeCacheKey::from_url(&decorated).unwrap(),
            EdgeCacheKey::from_url(&bare).unwrap()
        );
    }

    /// Property: only the reserved parameter name triggers a bypass.
    #[test]
    fn prop_bypass_only_on_reserved_param(query in query_strategy()) {
        let tenant = TenantKey::parse("grand-royal").unwrap();
        let names_reserved = query
            .split('&')
            .any(|pair| pair.split('=').next() == Some("nocache"));

        let request = EdgeRequest::new(
            tenant.clone(),
            format!("https://grand-royal.example.com/?{}", query),
        );
        prop_assert_eq!(request.is_bypass("nocache"), names_reserved);

        let forced = EdgeRequest::new(
            tenant,
            format!("https://grand-royal.example.com/?{}&nocache=1", query),
        );
        prop_assert!(forced.is_bypass("nocache"));
    }
}

// =============================================================================
// Shard Artifacts
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: order and duplicates in the raw index never change the bytes.
    #[test]
    fn prop_artifact_order_independent(
        keys in prop::collection::vec("gr[a-z0-9-]{1,12}", 0..20)
            .prop_flat_map(|keys| (Just(keys.clone()), Just(keys).prop_shuffle())),
    ) {
        let (original, shuffled) = keys;
        let generator = SitemapGenerator::new("example.com");
        let entries = |keys: &[String]| -> Vec<ShardIndexEntry> {
            keys.iter()
                .map(|k| ShardIndexEntry { tenant_key: k.clone(), last_modified: None })
                .collect()
        };

        let mut doubled = shuffled.clone();
        doubled.extend(shuffled.iter().cloned());

        let expected = generator.render_shard(&entries(&original));
        prop_assert_eq!(&generator.render_shard(&entries(&shuffled)), &expected);
        prop_assert_eq!(&generator.render_shard(&entries(&doubled)), &expected);
    }
}
