//! HTTP surface: routing, middleware, error rendering and background jobs.

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod airports;
pub mod alerts;
pub mod analytics;
pub mod destinations;
pub mod error;
pub mod extract;
pub mod flights;
pub mod health;
pub mod middleware;
pub mod prices;
pub mod routes;
pub mod scheduler;
pub mod seed;
pub mod state;
pub mod tracking;

pub use error::ApiError;
pub use state::{ApiSettings, AppState};

fn cors(settings: &ApiSettings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let allow_origin = if origins.is_empty() { AllowOrigin::from(Any) } else { AllowOrigin::list(origins) };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::USER_AGENT,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("x-user-id"),
        ])
}

pub fn app(state: AppState) -> Router {
    // Public reads, served from the response cache when warm.
    let cached = Router::new()
        .merge(flights::cached_routes())
        .merge(airports::cached_routes())
        .merge(routes::cached_routes())
        .merge(destinations::cached_routes())
        .layer(from_fn_with_state(state.clone(), middleware::http_cache_middleware));

    let api = Router::new()
        .merge(cached)
        .merge(flights::routes())
        .merge(routes::routes())
        .merge(prices::routes())
        .merge(alerts::routes())
        .merge(tracking::routes())
        .merge(destinations::routes())
        .merge(analytics::routes())
        .merge(admin::routes())
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware));

    Router::new()
        .merge(api)
        .merge(health::routes())
        .layer(cors(&state.settings))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(middleware::handle_panic))
        .layer(from_fn_with_state(state.clone(), middleware::request_id_middleware))
        .with_state(state)
}
