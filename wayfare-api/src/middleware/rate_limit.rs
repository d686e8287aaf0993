use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;
use wayfare_core::cache::{CacheNamespace, RateLimitDecision};
use wayfare_shared::AppError;

pub const LIMIT_HEADER: &str = "X-RateLimit-Limit";
pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";

fn client_key(req: &Request) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    req.headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn stamp(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
}

/// Fixed window per client IP. A cache outage lets traffic through.
pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let key = CacheNamespace::RateLimit.key(&client_key(&req));
    let settings = &state.settings;

    match state.cache.hit_rate_limit(&key, settings.rate_limit, settings.rate_window).await {
        Ok(decision) if !decision.allowed => {
            let err = AppError::rate_limited("Rate limit exceeded", Some(settings.rate_window.as_secs()))
                .with_detail("limit", decision.limit);
            let mut response = ApiError(err).into_response();
            stamp(&mut response, &decision);
            response
        }
        Ok(decision) => {
            let mut response = next.run(req).await;
            stamp(&mut response, &decision);
            response
        }
        Err(e) => {
            warn!(error = %e, "rate limiter unavailable, letting request through");
            next.run(req).await
        }
    }
}
