//! HTTP Surface
//!
//! Routes requests onto the [`CacheManager`]:
//!
//! | route                            | handler                      |
//! |----------------------------------|------------------------------|
//! | `GET /healthz`                   | liveness                     |
//! | `GET /metrics`                   | Prometheus text format       |
//! | `GET /sitemap.xml`               | discovery index              |
//! | `GET /sitemaps/{shard}.xml`      | one shard's artifact         |
//! | `POST /_cache/invalidate/{shard}`| surgical shard invalidation  |
//! | `GET` anything else              | tenant page                  |
//!
//! The tenant is the first host label under the configured base domain.

use std::convert::Infallible;
use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE, HOST};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheManager, EdgeRequest};
use crate::domain::{ShardKey, TenantKey};
use crate::error::{Error, Result};

const XML: &str = "application/xml; charset=utf-8";
const TEXT: &str = "text/plain; charset=utf-8";
const JSON: &str = "application/json";

/// Response header naming whether a shard artifact was regenerated
pub const HEADER_SHARD_CACHE: &str = "x-shard-cache";

// =============================================================================
// Server loop
// =============================================================================

/// Accept connections until the listener fails.
pub async fn run(addr: SocketAddr, manager: CacheManager) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind edge server: {}", e)))?;

    info!("Edge server listening on {}", addr);

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("Edge server accept error: {}", e)))?;

        let io = TokioIo::new(stream);
        let manager = manager.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let manager = manager.clone();
                async move { Ok::<_, Infallible>(handle(&manager, req).await) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(peer = %peer, error = %e, "Edge server connection closed");
            }
        });
    }
}

// =============================================================================
// Routing
// =============================================================================

/// Route one request. Never fails; errors become status codes.
pub async fn handle<B>(manager: &CacheManager, req: Request<B>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (&method, path.as_str()) {
        (&Method::GET, "/healthz") => text(StatusCode::OK, TEXT, "ok"),
        (&Method::GET, "/metrics") => match manager.metrics().gather_text() {
            Ok(body) => text(StatusCode::OK, "text/plain; version=0.0.4", body),
            Err(e) => error_response(&e),
        },
        (&Method::GET, "/sitemap.xml") => text(StatusCode::OK, XML, manager.sitemap_index()),
        (&Method::GET, p) if p.starts_with("/sitemaps/") => {
            let raw = p
                .trim_start_matches("/sitemaps/")
                .strip_suffix(".xml")
                .unwrap_or("");
            serve_sitemap(manager, raw).await
        }
        (&Method::POST, p) if p.starts_with("/_cache/invalidate/") => {
            invalidate(manager, p.trim_start_matches("/_cache/invalidate/")).await
        }
        (&Method::GET, _) => serve_page(manager, req).await,
        _ => text(StatusCode::METHOD_NOT_ALLOWED, TEXT, "method not allowed"),
    }
}

async fn serve_sitemap(manager: &CacheManager, raw: &str) -> Response<Full<Bytes>> {
    // An unknown partition is a missing document, not a bad request
    let Ok(shard) = ShardKey::parse(raw) else {
        return text(StatusCode::NOT_FOUND, TEXT, "not found");
    };

    match manager.serve_sitemap(&shard).await {
        Ok(artifact) => {
            let mut response = text(StatusCode::OK, XML, artifact.artifact);
            let status = if artifact.regenerated_entries.is_some() {
                "MISS"
            } else {
                "HIT"
            };
            response
                .headers_mut()
                .insert(HEADER_SHARD_CACHE, HeaderValue::from_static(status));
            response
        }
        Err(e) => error_response(&e),
    }
}

async fn invalidate(manager: &CacheManager, raw: &str) -> Response<Full<Bytes>> {
    match manager.invalidate_shard(raw).await {
        Ok((shard, existed)) => {
            let body = serde_json::json!({ "shard": shard.as_str(), "existed": existed });
            text(StatusCode::OK, JSON, body.to_string())
        }
        Err(e) => error_response(&e),
    }
}

async fn serve_page<B>(manager: &CacheManager, req: Request<B>) -> Response<Full<Bytes>> {
    let Some(host) = host_of(&req) else {
        return text(StatusCode::BAD_REQUEST, TEXT, "missing host");
    };
    let Some(label) = tenant_label(&host, &manager.config().base_domain) else {
        return text(StatusCode::NOT_FOUND, TEXT, "not found");
    };
    let tenant = match TenantKey::parse(label) {
        Ok(tenant) => tenant,
        Err(_) => return text(StatusCode::NOT_FOUND, TEXT, "not found"),
    };

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("https://{}{}", host, path_and_query);
    let request = EdgeRequest::new(tenant, url).with_headers(req.headers().clone());

    match manager.serve_page(&request).await {
        Ok(page) => {
            let mut response = Response::new(Full::new(page.body));
            *response.status_mut() = StatusCode::from_u16(page.status).unwrap_or(StatusCode::OK);
            *response.headers_mut() = page.headers;
            response
        }
        Err(e) => error_response(&e),
    }
}

/// Host without port, lowercased; `Host` header first, then the URI authority.
fn host_of<B>(req: &Request<B>) -> Option<String> {
    let raw = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())?;
    let host = raw.split(':').next().unwrap_or("").trim();
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

/// `grand-royal.example.com` under `example.com` is `grand-royal`.
fn tenant_label<'a>(host: &'a str, base_domain: &str) -> Option<&'a str> {
    let prefix = host.strip_suffix(base_domain)?.strip_suffix('.')?;
    prefix.rsplit('.').next().filter(|label| !label.is_empty())
}

// =============================================================================
// Responses
// =============================================================================

fn status_for(err: &Error) -> StatusCode {
    if err.is_invalid_request() {
        StatusCode::BAD_REQUEST
    } else if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_transient() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn error_response(err: &Error) -> Response<Full<Bytes>> {
    let status = status_for(err);
    if status.is_server_error() {
        error!(error = %err, status = status.as_u16(), "Request failed");
    } else {
        warn!(error = %err, status = status.as_u16(), "Request rejected");
    }
    let reason = status.canonical_reason().unwrap_or("error");
    text(status, TEXT, reason.to_ascii_lowercase())
}

fn text(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

// =============================================================================
// Tests
// =============================================================================
