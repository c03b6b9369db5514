//! Cache Manager
//!
//! Composes the tiers into the two read paths and the one write path:
//!
//! ```text
//! page:     edge (unless bypassed) ──▶ local (tenant config, template) ──▶ store
//!                 │ hit: replay analytics from headers
//!                 │ stale: replay, serve, revalidate in background
//!                 ▼ miss: render, emit analytics, store into edge in background
//!
//! sitemap:  shard cache ──▶ shard index ──▶ regenerate + persist
//!
//! publish:  invalidate exactly one shard
//! ```
//!
//! Everything after the response is built (analytics, edge write-back,
//! revalidation) runs on a [`TaskTracker`]. Failures there are logged and
//! counted, never returned.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashSet;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::edge::{CachedResponse, EdgeCacheKey, EdgeLookup, EdgeRequest, EdgeResponseCache};
use super::local::{LocalClass, LocalFetch, ProcessLocalCache};
use super::metrics::{outcome, CacheMetrics};
use super::shard_cache::{ShardArtifact, ShardCache};
use super::sitemap::SitemapGenerator;
use crate::adapters::{LoggingEventPublisher, SystemClock, TokenRenderer};
use crate::config::EdgeConfig;
use crate::domain::{
    Clock, DomainEvent, EventPublisher, KvStore, PageRenderer, ResponseMetadata, ServedFrom,
    ShardKey, TenantKey,
};
use crate::error::{Error, Result};
use crate::store::BackingStore;

/// Response header naming which path served a page
pub const HEADER_EDGE_CACHE: &str = "x-edge-cache";

/// Background task labels used in failure metrics
pub mod task {
    pub const ANALYTICS: &str = "analytics";
    pub const REVALIDATE: &str = "revalidate";
    pub const SHARD_EVENTS: &str = "shard_events";
}

/// Which path served a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Stale,
    Miss,
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Stale => "STALE",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page ready to send
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub cache_status: CacheStatus,
}

impl PageResponse {
    fn new(response: CachedResponse, cache_status: CacheStatus) -> Self {
        let mut headers = response.headers;
        headers.insert(
            HeaderName::from_static(HEADER_EDGE_CACHE),
            HeaderValue::from_static(cache_status.as_str()),
        );
        Self {
            status: response.status,
            headers,
            body: response.body,
            cache_status,
        }
    }

    pub fn metadata(&self) -> Option<ResponseMetadata> {
        ResponseMetadata::from_headers(&self.headers)
    }
}

struct Rendered {
    response: CachedResponse,
    metadata: ResponseMetadata,
}

struct Inner {
    config: EdgeConfig,
    store: BackingStore,
    local: ProcessLocalCache,
    edge: EdgeResponseCache,
    shards: ShardCache,
    publisher: Arc<dyn EventPublisher>,
    renderer: Arc<dyn PageRenderer>,
    clock: Arc<dyn Clock>,
    metrics: CacheMetrics,
    tasks: TaskTracker,
    revalidating: DashSet<EdgeCacheKey>,
}

/// Builder for [`CacheManager`]
pub struct CacheManagerBuilder {
    config: EdgeConfig,
    kv: Arc<dyn KvStore>,
    publisher: Arc<dyn EventPublisher>,
    renderer: Arc<dyn PageRenderer>,
    clock: Arc<dyn Clock>,
    metrics: Option<CacheMetrics>,
}

impl CacheManagerBuilder {
    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<CacheManager> {
        self.config.validate()?;

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => CacheMetrics::new()?,
        };
        let store = BackingStore::new(self.kv);
        let local = ProcessLocalCache::new(&self.config, self.clock.clone());
        let edge = EdgeResponseCache::new(
            self.config.edge_ttl(),
            self.config.edge_stale_window(),
            self.clock.clone(),
        );
        let shards = ShardCache::new(
            store.clone(),
            SitemapGenerator::new(self.config.base_domain.clone()),
            self.clock.clone(),
            self.config.shard_lifetime(),
            metrics.clone(),
        );

        Ok(CacheManager {
            inner: Arc::new(Inner {
                config: self.config,
                store,
                local,
                edge,
                shards,
                publisher: self.publisher,
                renderer: self.renderer,
                clock: self.clock,
                metrics,
                tasks: TaskTracker::new(),
                revalidating: DashSet::new(),
            }),
        })
    }
}

/// Tiered cache front for one compute instance. Cheap to clone.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

impl CacheManager {
    /// Start a builder with a logging publisher, the token renderer and the
    /// system clock.
    pub fn builder(config: EdgeConfig, kv: Arc<dyn KvStore>) -> CacheManagerBuilder {
        CacheManagerBuilder {
            config,
            kv,
            publisher: Arc::new(LoggingEventPublisher::info_level()),
            renderer: Arc::new(TokenRenderer),
            clock: Arc::new(SystemClock),
            metrics: None,
        }
    }

    // =========================================================================
    // Page path
    // =========================================================================

    /// Serve one page request through the edge and local tiers.
    pub async fn serve_page(&self, request: &EdgeRequest) -> Result<PageResponse> {
        let inner = &self.inner;
        let key = EdgeCacheKey::from_url(&request.url)?;
        let path = key.path().to_string();

        if request.is_bypass(&inner.config.bypass_param) {
            inner.metrics.record_edge_lookup(outcome::BYPASS);
            debug!(tenant = %request.tenant, key = %key, "Edge cache bypassed");

            let rendered = self.render(&request.tenant, &path).await?;
            self.emit_view(&rendered.metadata, path, ServedFrom::Render);

            let mut response = rendered.response;
            response
                .headers
                .insert(CACHE_CONTROL, HeaderValue::from_static("private, no-store"));
            return Ok(PageResponse::new(response, CacheStatus::Bypass));
        }

        match inner.edge.lookup(&key) {
            EdgeLookup::Fresh(cached) => {
                if let Some(metadata) = self.cached_metadata(&cached, &request.tenant, &key) {
                    inner.metrics.record_edge_lookup(outcome::HIT);
                    debug!(tenant = %request.tenant, key = %key, "Edge cache hit");
                    self.emit_view(&metadata, path, ServedFrom::EdgeHit);
                    return Ok(PageResponse::new(cached, CacheStatus::Hit));
                }
            }
            EdgeLookup::Stale(cached) => {
                if let Some(metadata) = self.cached_metadata(&cached, &request.tenant, &key) {
                    inner.metrics.record_edge_lookup(outcome::STALE);
                    debug!(tenant = %request.tenant, key = %key, "Edge cache stale, revalidating");
                    self.emit_view(&metadata, path.clone(), ServedFrom::EdgeStale);
                    self.spawn_revalidation(request.tenant.clone(), key, path);
                    return Ok(PageResponse::new(cached, CacheStatus::Stale));
                }
            }
            EdgeLookup::Miss => {}
        }

        inner.metrics.record_edge_lookup(outcome::MISS);
        debug!(tenant = %request.tenant, key = %key, "Edge cache miss");

        let rendered = self.render(&request.tenant, &path).await?;
        self.emit_view(&rendered.metadata, path, ServedFrom::Render);
        self.spawn_edge_store(key, rendered.response.clone());
        Ok(PageResponse::new(rendered.response, CacheStatus::Miss))
    }

    /// Metadata of a cached response, provided it belongs to `tenant`.
    fn cached_metadata(
        &self,
        cached: &CachedResponse,
        tenant: &TenantKey,
        key: &EdgeCacheKey,
    ) -> Option<ResponseMetadata> {
        match cached.metadata() {
            Some(metadata) if metadata.tenant_key == tenant.as_str() => Some(metadata),
            Some(metadata) => {
                warn!(
                    tenant = %tenant,
                    cached_tenant = %metadata.tenant_key,
                    key = %key,
                    "Edge entry belongs to another tenant, rendering"
                );
                None
            }
            None => {
                warn!(tenant = %tenant, key = %key, "Edge entry has no metadata, rendering");
                None
            }
        }
    }

    /// Full render through the local cache and backing store.
    async fn render(&self, tenant: &TenantKey, path: &str) -> Result<Rendered> {
        let inner = &self.inner;
        let store = &inner.store;

        let record = inner
            .local
            .tenant_configs()
            .get_or_fetch(tenant.as_str(), move || async move {
                store.get_tenant_record(tenant).await.map(Arc::new)
            })
            .await;
        self.observe_local(LocalClass::TenantConfig, &record);
        let record = record?.value;

        let template_name = inner.config.template_name.as_str();
        let template = inner
            .local
            .templates()
            .get_or_fetch(template_name, move || async move {
                store.get_template(template_name).await.map(Arc::from)
            })
            .await;
        self.observe_local(LocalClass::Template, &template);
        let template = template?.value;

        let metadata = ResponseMetadata::resolve(tenant, &record);
        let body = inner.renderer.render(&template, &record, &metadata, path)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        let cache_control = HeaderValue::from_str(&inner.edge.cache_control_value())
            .map_err(|e| Error::Internal(format!("cache-control not encodable: {}", e)))?;
        headers.insert(CACHE_CONTROL, cache_control);
        metadata.write_headers(&mut headers)?;

        Ok(Rendered {
            response: CachedResponse {
                status: 200,
                headers,
                body: Bytes::from(body),
            },
            metadata,
        })
    }

    fn observe_local<T>(&self, class: LocalClass, fetch: &Result<LocalFetch<T>>) {
        let (hit, cleared) = match fetch {
            Ok(fetch) => (fetch.hit, fetch.cleared),
            Err(_) => (false, false),
        };
        self.inner.metrics.record_local_lookup(class.as_str(), hit);
        if cleared {
            self.inner.metrics.record_local_overflow_clear(class.as_str());
        }
    }

    // =========================================================================
    // Background work
    // =========================================================================

    fn emit_view(&self, metadata: &ResponseMetadata, path: String, served_from: ServedFrom) {
        let event = DomainEvent::page_viewed(metadata, path, served_from, self.inner.clock.now());
        self.publish_background(event, task::ANALYTICS);
    }

    fn publish_background(&self, event: DomainEvent, task_name: &'static str) {
        let inner = self.inner.clone();
        self.inner.tasks.spawn(async move {
            let event_type = event.event_type();
            if let Err(e) = inner.publisher.publish(event).await {
                inner.metrics.record_background_failure(task_name);
                warn!(task = task_name, event_type, error = %e, "Event publish failed");
            }
        });
    }

    fn spawn_edge_store(&self, key: EdgeCacheKey, response: CachedResponse) {
        let manager = self.clone();
        self.inner.tasks.spawn(async move {
            debug!(key = %key, "Edge cache store");
            manager.store_edge(key, response);
        });
    }

    /// Write one entry, then sweep expired ones if a sweep is due.
    fn store_edge(&self, key: EdgeCacheKey, response: CachedResponse) {
        let inner = &self.inner;
        inner.edge.store(key, response);
        inner.metrics.record_edge_store();

        let purged = inner.edge.purge_if_due();
        if purged > 0 {
            inner.metrics.record_edge_purged(purged);
        }
    }

    /// At most one revalidation per key runs at a time on this instance.
    fn spawn_revalidation(&self, tenant: TenantKey, key: EdgeCacheKey, path: String) {
        if !self.inner.revalidating.insert(key.clone()) {
            debug!(key = %key, "Revalidation already in flight");
            return;
        }

        let manager = self.clone();
        self.inner.tasks.spawn(async move {
            match manager.render(&tenant, &path).await {
                Ok(rendered) => {
                    manager.store_edge(key.clone(), rendered.response);
                    debug!(tenant = %tenant, key = %key, "Edge entry revalidated");
                }
                Err(e) => {
                    manager.inner.metrics.record_background_failure(task::REVALIDATE);
                    warn!(tenant = %tenant, key = %key, error = %e, "Revalidation failed");
                }
            }
            manager.inner.revalidating.remove(&key);
        });
    }

    /// Wait for every background task spawned so far.
    pub async fn flush_background(&self) {
        let tasks = &self.inner.tasks;
        tasks.close();
        tasks.wait().await;
        tasks.reopen();
    }

    /// Wait for background work and stop accepting more.
    pub async fn shutdown(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        info!("Background tasks drained");
    }

    // =========================================================================
    // Sitemap path
    // =========================================================================

    /// Serve one shard's discovery document.
    pub async fn serve_sitemap(&self, shard: &ShardKey) -> Result<ShardArtifact> {
        let artifact = self.inner.shards.get_shard(shard).await?;
        if let Some(entries) = artifact.regenerated_entries {
            let event = DomainEvent::shard_regenerated(shard, entries, artifact.written_at);
            self.publish_background(event, task::SHARD_EVENTS);
        }
        Ok(artifact)
    }

    /// The discovery index over every alphabetic partition.
    ///
    /// Built without store access, so it cannot know which other partitions
    /// hold tenants. A tenant whose key starts with a digit or `-` (shard `9-`,
    /// `-a`, ...) is still served at `/sitemaps/{shard}.xml`, but crawlers
    /// only find it if they already know that URL.
    pub fn sitemap_index(&self) -> String {
        self.inner
            .shards
            .generator()
            .render_index(ShardKey::all())
    }

    /// Invalidate one shard by raw identifier. Returns the parsed shard and
    /// whether an artifact existed.
    pub async fn invalidate_shard(&self, raw: &str) -> Result<(ShardKey, bool)> {
        let (shard, existed) = self.inner.shards.invalidate_raw(raw).await?;
        let event = DomainEvent::shard_invalidated(&shard, existed, self.inner.clock.now());
        self.publish_background(event, task::SHARD_EVENTS);
        Ok((shard, existed))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &EdgeConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &BackingStore {
        &self.inner.store
    }

    pub fn local(&self) -> &ProcessLocalCache {
        &self.inner.local
    }

    pub fn edge(&self) -> &EdgeResponseCache {
        &self.inner.edge
    }

    pub fn shards(&self) -> &ShardCache {
        &self.inner.shards
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.inner.metrics
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("base_domain", &self.inner.config.base_domain)
            .field("edge_entries", &self.inner.edge.len())
            .field("tenant_configs", &self.inner.local.tenant_configs().len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryEventCollector, InMemoryStore, ManualClock};
    use crate::domain::{ExperimentConfig, TenantRecord};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::time::Duration;

    const TEMPLATE: &str = "<h1>{{name}}</h1><main data-variant=\"{{design_variant}}\">{{path}}</main>";

    struct Fixture {
        manager: CacheManager,
        mem: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        events: Arc<InMemoryEventCollector>,
    }

    fn tenant(key: &str) -> TenantKey {
        TenantKey::parse(key).unwrap()
    }

    fn named(name: &str) -> TenantRecord {
        let mut record = TenantRecord {
            design_profile: Some("bistro".into()),
            experiment: Some(ExperimentConfig {
                id: "hero-copy".into(),
                variant: None,
            }),
            ..Default::default()
        };
        record.extra.insert("name".into(), name.into());
        record
    }

    async fn fixture() -> Fixture {
        let mem = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let events = Arc::new(InMemoryEventCollector::new());
        let manager = CacheManager::builder(EdgeConfig::default(), mem.clone())
            .publisher(events.clone())
            .clock(clock.clone())
            .build()
            .unwrap();

        manager.store().put_template("site", TEMPLATE).await.unwrap();
        let f = Fixture {
            manager,
            mem,
            clock,
            events,
        };
        publish(&f, "grand-royal", "Grand Royal").await;
        f
    }

    async fn publish(f: &Fixture, key: &str, name: &str) {
        f.manager
            .store()
            .publish_tenant(&tenant(key), &named(name), f.clock.now())
            .await
            .unwrap();
    }

    fn page(key: &str, path_and_query: &str) -> EdgeRequest {
        EdgeRequest::new(
            tenant(key),
            format!("https://{}.example.com{}", key, path_and_query),
        )
    }

    fn body(response: &PageResponse) -> &str {
        std::str::from_utf8(&response.body).unwrap()
    }

    fn views(f: &Fixture) -> Vec<DomainEvent> {
        f.events.events_of_type("PageViewed")
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let f = fixture().await;
        let req = page("grand-royal", "/menu");

        let first = f.manager.serve_page(&req).await.unwrap();
        assert_eq!(first.cache_status, CacheStatus::Miss);
        assert_eq!(first.headers[HEADER_EDGE_CACHE], "MISS");
        assert!(body(&first).contains("<h1>Grand Royal</h1>"));
        assert_eq!(
            first.headers[CACHE_CONTROL],
            "public, max-age=0, s-maxage=60, stale-while-revalidate=86400"
        );
        f.manager.flush_background().await;

        let second = f.manager.serve_page(&req).await.unwrap();
        assert_eq!(second.cache_status, CacheStatus::Hit);
        assert_eq!(second.headers[HEADER_EDGE_CACHE], "HIT");
        assert_eq!(second.body, first.body);
        assert_eq!(f.manager.metrics().edge_lookups(outcome::HIT), 1);
        assert_eq!(f.manager.metrics().edge_stores(), 1);
    }

    #[tokio::test]
    async fn test_hit_replays_identical_analytics() {
        let f = fixture().await;
        let req = page("grand-royal", "/menu");

        let rendered = f.manager.serve_page(&req).await.unwrap();
        f.manager.flush_background().await;
        let cached = f.manager.serve_page(&req).await.unwrap();
        f.manager.flush_background().await;

        assert_eq!(rendered.metadata(), cached.metadata());

        let views = views(&f);
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].view_metadata(), views[1].view_metadata());
        assert_eq!(views[0].view_metadata(), rendered.metadata());
        assert_matches!(
            &views[0],
            DomainEvent::PageViewed { served_from: ServedFrom::Render, path, .. } if path == "/menu"
        );
        assert_matches!(
            &views[1],
            DomainEvent::PageViewed { served_from: ServedFrom::EdgeHit, path, .. } if path == "/menu"
        );
    }

    #[tokio::test]
    async fn test_tracking_parameters_share_one_entry() {
        let f = fixture().await;
        let first = f
            .manager
            .serve_page(&page("grand-royal", "/?utm_source=ig"))
            .await
            .unwrap();
        f.manager.flush_background().await;
        let second = f
            .manager
            .serve_page(&page("grand-royal", "/?gclid=xyz#top"))
            .await
            .unwrap();

        assert_eq!(first.cache_status, CacheStatus::Miss);
        assert_eq!(second.cache_status, CacheStatus::Hit);
        assert_eq!(f.manager.edge().len(), 1);
    }

    #[tokio::test]
    async fn test_bypass_never_reads_or_writes_edge() {
        let f = fixture().await;
        let req = page("grand-royal", "/");
        f.manager.serve_page(&req).await.unwrap();
        f.manager.flush_background().await;

        // Update the tenant and drop local state so a render shows the change
        publish(&f, "grand-royal", "Grand Royal Reopened").await;
        f.manager.local().clear();

        let bypass = f
            .manager
            .serve_page(&page("grand-royal", "/?nocache=1"))
            .await
            .unwrap();
        f.manager.flush_background().await;
        assert_eq!(bypass.cache_status, CacheStatus::Bypass);
        assert_eq!(bypass.headers[CACHE_CONTROL], "private, no-store");
        assert!(body(&bypass).contains("Grand Royal Reopened"));
        assert_eq!(f.manager.metrics().edge_lookups(outcome::BYPASS), 1);
        assert_eq!(f.manager.metrics().edge_stores(), 1);

        // The edge entry still holds the pre-update render
        let cached = f.manager.serve_page(&req).await.unwrap();
        assert_eq!(cached.cache_status, CacheStatus::Hit);
        assert!(!body(&cached).contains("Reopened"));
    }

    #[tokio::test]
    async fn test_bypass_via_pragma() {
        let f = fixture().await;
        let mut headers = HeaderMap::new();
        headers.insert("pragma", HeaderValue::from_static("no-cache"));
        let req = page("grand-royal", "/").with_headers(headers);

        f.manager.serve_page(&req).await.unwrap();
        f.manager.flush_background().await;
        assert!(f.manager.edge().is_empty());
    }

    #[tokio::test]
    async fn test_stale_served_then_revalidated() {
        let f = fixture().await;
        let req = page("grand-royal", "/");
        f.manager.serve_page(&req).await.unwrap();
        f.manager.flush_background().await;

        f.clock.advance(Duration::from_secs(61));
        publish(&f, "grand-royal", "Grand Royal Reopened").await;

        let stale = f.manager.serve_page(&req).await.unwrap();
        assert_eq!(stale.cache_status, CacheStatus::Stale);
        assert!(!body(&stale).contains("Reopened"));
        f.manager.flush_background().await;

        let fresh = f.manager.serve_page(&req).await.unwrap();
        assert_eq!(fresh.cache_status, CacheStatus::Hit);
        assert!(body(&fresh).contains("Grand Royal Reopened"));
        f.manager.flush_background().await;

        // Revalidation itself emits nothing
        let views = views(&f);
        assert_eq!(views.len(), 3);
        assert_matches!(
            views[1],
            DomainEvent::PageViewed { served_from: ServedFrom::EdgeStale, .. }
        );
    }

    #[tokio::test]
    async fn test_entry_dropped_after_stale_window() {
        let f = fixture().await;
        let req = page("grand-royal", "/");
        f.manager.serve_page(&req).await.unwrap();
        f.manager.flush_background().await;

        f.clock.advance(Duration::from_secs(60 + 86_400));
        let response = f.manager.serve_page(&req).await.unwrap();
        assert_eq!(response.cache_status, CacheStatus::Miss);
    }

    #[tokio::test]
    async fn test_local_cache_miss_then_hit() {
        let f = fixture().await;
        let bypass = page("grand-royal", "/?nocache");

        f.manager.serve_page(&bypass).await.unwrap();
        f.manager.serve_page(&bypass).await.unwrap();
        assert_eq!(f.mem.reads_of("tenant:grand-royal"), 1);
        assert_eq!(f.mem.reads_of("template:site"), 1);

        let metrics = f.manager.metrics();
        assert_eq!(metrics.local_lookups("tenant_config", outcome::MISS), 1);
        assert_eq!(metrics.local_lookups("tenant_config", outcome::HIT), 1);

        // Tenant config lives 60s, the template 5 minutes
        f.clock.advance(Duration::from_secs(61));
        f.manager.serve_page(&bypass).await.unwrap();
        assert_eq!(f.mem.reads_of("tenant:grand-royal"), 2);
        assert_eq!(f.mem.reads_of("template:site"), 1);
    }

    #[tokio::test]
    async fn test_tenant_not_found_is_not_cached() {
        let f = fixture().await;
        let err = f.manager.serve_page(&page("ghost-town", "/")).await.unwrap_err();
        assert_matches!(err, Error::TenantNotFound(ref t) if t == "ghost-town");

        f.manager.flush_background().await;
        assert!(f.manager.edge().is_empty());
        assert!(!f.manager.local().tenant_configs().contains("ghost-town"));
        assert!(views(&f).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_tenant_surfaces() {
        let f = fixture().await;
        f.mem.insert_raw("tenant:broken-one", "{\"design_profile\":");

        let err = f.manager.serve_page(&page("broken-one", "/")).await.unwrap_err();
        assert_matches!(err, Error::MalformedData { .. });
        assert!(!f.manager.local().tenant_configs().contains("broken-one"));
    }

    #[tokio::test]
    async fn test_edge_hit_survives_store_outage() {
        let f = fixture().await;
        let req = page("grand-royal", "/");
        f.manager.serve_page(&req).await.unwrap();
        f.manager.flush_background().await;

        f.mem.set_unavailable(true);
        let hit = f.manager.serve_page(&req).await.unwrap();
        assert_eq!(hit.cache_status, CacheStatus::Hit);

        // Tenant config and template are still local, so this renders
        let other = f
            .manager
            .serve_page(&page("grand-royal", "/about"))
            .await
            .unwrap();
        assert_eq!(other.cache_status, CacheStatus::Miss);

        f.manager.local().clear();
        let err = f
            .manager
            .serve_page(&page("grand-royal", "/contact"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_entry_for_other_tenant_is_not_served() {
        let f = fixture().await;
        publish(&f, "aw-bakery", "AW Bakery").await;

        let mut headers = HeaderMap::new();
        ResponseMetadata::resolve(&tenant("grand-royal"), &named("Grand Royal"))
            .write_headers(&mut headers)
            .unwrap();
        f.manager.edge().store(
            EdgeCacheKey::from_url("https://aw-bakery.example.com/").unwrap(),
            CachedResponse {
                status: 200,
                headers,
                body: Bytes::from_static(b"<h1>Grand Royal</h1>"),
            },
        );

        let response = f.manager.serve_page(&page("aw-bakery", "/")).await.unwrap();
        assert_eq!(response.cache_status, CacheStatus::Miss);
        assert!(body(&response).contains("AW Bakery"));
    }

    #[tokio::test]
    async fn test_non_ascii_metadata_still_hits() {
        let f = fixture().await;
        let mut record = named("Café Lune");
        record.design_profile = Some("café".into());
        record.experiment = Some(ExperimentConfig {
            id: "été".into(),
            variant: None,
        });
        f.manager
            .store()
            .publish_tenant(&tenant("cafe-lune"), &record, f.clock.now())
            .await
            .unwrap();
        let req = page("cafe-lune", "/");

        let first = f.manager.serve_page(&req).await.unwrap();
        f.manager.flush_background().await;
        let second = f.manager.serve_page(&req).await.unwrap();
        f.manager.flush_background().await;

        assert_eq!(first.cache_status, CacheStatus::Miss);
        assert_eq!(second.cache_status, CacheStatus::Hit);
        let meta = second.metadata().unwrap();
        assert_eq!(meta.design_profile, "café");
        assert_eq!(meta.experiment_id.as_deref(), Some("été"));
        assert_eq!(first.metadata(), Some(meta));

        let views = views(&f);
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].view_metadata(), views[1].view_metadata());
    }

    #[tokio::test]
    async fn test_unread_entries_are_swept() {
        let f = fixture().await;
        for i in 0..50 {
            let req = page("grand-royal", &format!("/item-{}", i));
            f.manager.serve_page(&req).await.unwrap();
        }
        f.manager.flush_background().await;
        assert_eq!(f.manager.edge().len(), 50);

        f.clock.advance(Duration::from_secs(3 * 86_400));
        f.manager
            .serve_page(&page("grand-royal", "/fresh"))
            .await
            .unwrap();
        f.manager.flush_background().await;

        assert_eq!(f.manager.edge().len(), 1);
        assert_eq!(f.manager.metrics().edge_purged(), 50);
    }

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _event: DomainEvent) -> Result<()> {
            Err(Error::Internal("analytics down".into()))
        }
    }

    #[tokio::test]
    async fn test_analytics_failure_does_not_fail_response() {
        let mem = Arc::new(InMemoryStore::new());
        let manager = CacheManager::builder(EdgeConfig::default(), mem)
            .publisher(Arc::new(FailingPublisher))
            .clock(Arc::new(ManualClock::default()))
            .build()
            .unwrap();
        manager.store().put_template("site", TEMPLATE).await.unwrap();
        manager
            .store()
            .publish_tenant(&tenant("grand-royal"), &named("Grand Royal"), manager.clock().now())
            .await
            .unwrap();

        let response = manager.serve_page(&page("grand-royal", "/")).await;
        assert!(response.is_ok());
        manager.flush_background().await;
        assert_eq!(manager.metrics().background_failures(task::ANALYTICS), 1);
        assert_eq!(manager.metrics().edge_stores(), 1);
    }

    #[tokio::test]
    async fn test_sitemap_events() {
        let f = fixture().await;
        let shard = ShardKey::parse("gr").unwrap();

        let first = f.manager.serve_sitemap(&shard).await.unwrap();
        assert!(first.artifact.contains("https://grand-royal.example.com/"));
        f.manager.serve_sitemap(&shard).await.unwrap();
        f.manager.flush_background().await;
        assert_eq!(f.events.events_of_type("ShardRegenerated").len(), 1);

        let (key, existed) = f.manager.invalidate_shard("gr").await.unwrap();
        assert_eq!(key, shard);
        assert!(existed);
        f.manager.flush_background().await;
        assert_matches!(
            f.events.events_of_type("ShardInvalidated").as_slice(),
            [DomainEvent::ShardInvalidated { existed: true, .. }]
        );

        assert!(f.manager.invalidate_shard("GR").await.is_err());
        f.manager.flush_background().await;
        assert_eq!(f.events.events_of_type("ShardInvalidated").len(), 1);
    }

    #[tokio::test]
    async fn test_sitemap_index() {
        let f = fixture().await;
        let reads = f.mem.stats().reads;
        let index = f.manager.sitemap_index();
        assert!(index.contains("https://example.com/sitemaps/gr.xml"));
        assert_eq!(f.mem.stats().reads, reads);
    }

    #[tokio::test]
    async fn test_non_alphabetic_shard_served_but_not_indexed() {
        let f = fixture().await;
        publish(&f, "9-lives", "Nine Lives").await;

        let shard = ShardKey::parse("9-").unwrap();
        let artifact = f.manager.serve_sitemap(&shard).await.unwrap();
        assert!(artifact.artifact.contains("https://9-lives.example.com/"));

        let index = f.manager.sitemap_index();
        assert!(!index.contains("/sitemaps/9-.xml"));
        assert!(index.contains("/sitemaps/gr.xml"));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = EdgeConfig {
            edge_ttl_secs: 0,
            ..Default::default()
        };
        let result = CacheManager::builder(config, Arc::new(InMemoryStore::new())).build();
        assert_matches!(result, Err(Error::Config(_)));
    }
}
