use axum::{
    body::{to_bytes, Body, HttpBody},
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;
use wayfare_core::cache::CacheNamespace;
use wayfare_shared::AppError;

pub const X_CACHE: &str = "X-Cache";
pub const MAX_CACHED_BODY: usize = 2 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    content_type: Option<String>,
    body: String,
}

/// Response cache for public GET endpoints, keyed by path and query.
/// Only 2xx responses whose body fits in [`MAX_CACHED_BODY`] are stored;
/// anything else passes through untouched.
pub async fn http_cache_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if req.method() != Method::GET {
        return next.run(req).await;
    }
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let key = CacheNamespace::HttpResponse.key(&target);

    if let Some(cached) = state.cache.get_json::<CachedResponse>(&key).await {
        let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
        let mut response = (status, cached.body).into_response();
        if let Some(value) = cached.content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        response.headers_mut().insert(X_CACHE, HeaderValue::from_static("HIT"));
        return response;
    }

    let response = next.run(req).await;
    if !response.status().is_success() {
        return response;
    }
    // Streamed or oversized bodies are served as they are.
    match response.body().size_hint().upper() {
        Some(size) if size <= MAX_CACHED_BODY as u64 => {}
        _ => return response,
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_CACHED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(key = %key, error = %e, "response body unreadable");
            return ApiError(AppError::internal("response body could not be buffered")).into_response();
        }
    };
    if let Ok(text) = std::str::from_utf8(&bytes) {
        let cached = CachedResponse {
            status: parts.status.as_u16(),
            content_type: parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
            body: text.to_string(),
        };
        state.cache.put_json(&key, &cached, CacheNamespace::HttpResponse.ttl()).await;
    }
    parts.headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}
