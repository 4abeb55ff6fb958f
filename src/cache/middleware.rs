//! Response cache middleware.
//!
//! Caches GET responses on disk and replays them without reaching the handler.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::BodyExt;
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use super::{
    CacheConfig,
    keys::fingerprint,
    store::{CachedResponse, DiskCache, Lookup},
};

const METRIC_CACHE_HIT: &str = "docmirror_cache_hit_total";
const METRIC_CACHE_MISS: &str = "docmirror_cache_miss_total";
const METRIC_CACHE_STORE: &str = "docmirror_cache_store_total";
const METRIC_CACHE_BYPASS: &str = "docmirror_cache_bypass_total";

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: Arc<CacheConfig>,
    pub store: Arc<DiskCache>,
}

impl CacheState {
    pub fn new(config: CacheConfig) -> Self {
        let store = DiskCache::new(config.directory.clone(), config.file_ttl, config.api_ttl);
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
        }
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enabled || request.method() != Method::GET {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();

    if let Some(reason) = cache.config.bypass_reason(&path) {
        counter!(METRIC_CACHE_BYPASS, "reason" => reason.as_str()).increment(1);
        if cache.config.cache_log {
            info!(target = "docmirror::cache", path = %path, reason = reason.as_str(), "cache bypass");
        }
        return next.run(request).await;
    }

    let class = cache.config.classify(&path);
    let ttl = cache.config.ttl_for(class);
    let key = fingerprint(&path, request.uri().query());

    match cache.store.lookup(&key).await {
        Ok(Lookup::Hit(cached)) => {
            counter!(METRIC_CACHE_HIT).increment(1);
            if cache.config.hit_log {
                info!(target = "docmirror::cache", path = %path, "cache hit");
            }
            return build_response(cached, ttl.as_secs());
        }
        Ok(Lookup::Expired) => {
            counter!(METRIC_CACHE_MISS).increment(1);
            debug!(target = "docmirror::cache", path = %path, "cache entry expired");
            let store = cache.store.clone();
            let expired = key.clone();
            tokio::spawn(async move {
                if let Err(err) = store.remove_if_expired(&expired).await {
                    warn!(target = "docmirror::cache", error = %err, "failed to remove expired entry");
                }
            });
        }
        Ok(Lookup::Miss) => {
            counter!(METRIC_CACHE_MISS).increment(1);
        }
        Err(err) => {
            counter!(METRIC_CACHE_MISS).increment(1);
            warn!(target = "docmirror::cache", path = %path, error = %err, "cache lookup failed");
        }
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(target = "docmirror::cache", path = %path, error = %err, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match cache
        .store
        .store(&key, class, parts.status.as_u16(), &parts.headers, &bytes)
        .await
    {
        Ok(()) => {
            counter!(METRIC_CACHE_STORE).increment(1);
            if cache.config.cache_log {
                debug!(target = "docmirror::cache", path = %path, size = bytes.len(), "response cached");
            }
        }
        Err(err) => {
            warn!(target = "docmirror::cache", path = %path, error = %err, "failed to store response");
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn build_response(cached: CachedResponse, max_age_secs: u64) -> Response {
    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);

    let headers = response.headers_mut();
    for (name, value) in cached.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.insert(name, value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={max_age_secs}")) {
        headers.insert(header::CACHE_CONTROL, value);
    }

    response
}
