use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;
use wayfare_core::destination::{PriceRange, Theme, ThemeDefinition};
use wayfare_discovery::{
    ExploreRequest, ExploreResult, PriceEstimate, SimilarDestination, ThemeRecommendations, ThemeRequest,
    DEFAULT_SIMILAR_LIMIT,
};

pub fn cached_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/destinations/themes", get(themes))
        .route("/v1/destinations/themes/{theme}", get(by_theme))
        .route("/v1/destinations/{code}/similar", get(similar))
        .route("/v1/destinations/{code}/estimate", get(estimate))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/destinations/explore", post(explore))
}

/// Country lists arrive comma separated: `include_countries=ES,PT`.
#[derive(Debug, Default, Deserialize)]
struct ThemeParams {
    origin: Option<String>,
    min_score: Option<u8>,
    limit: Option<usize>,
    max_flight_time: Option<f64>,
    price_range: Option<PriceRange>,
    include_countries: Option<String>,
    exclude_countries: Option<String>,
}

fn country_list(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

impl ThemeParams {
    fn into_request(self, theme: Theme) -> ThemeRequest {
        let mut request = ThemeRequest::new(theme);
        request.origin = self.origin.map(|o| o.to_uppercase());
        if let Some(min_score) = self.min_score {
            request.min_score = min_score;
        }
        if let Some(limit) = self.limit {
            request.limit = limit;
        }
        request.max_flight_time = self.max_flight_time;
        request.price_range = self.price_range;
        request.include_countries = country_list(self.include_countries);
        request.exclude_countries = country_list(self.exclude_countries);
        request
    }
}

/// GET /v1/destinations/themes
async fn themes(State(state): State<AppState>) -> Result<Json<Vec<ThemeDefinition>>, ApiError> {
    Ok(Json(state.discovery.themes().await?))
}

/// GET /v1/destinations/themes/{theme}
async fn by_theme(
    State(state): State<AppState>,
    ApiPath(theme): ApiPath<Theme>,
    ApiQuery(params): ApiQuery<ThemeParams>,
) -> Result<Json<ThemeRecommendations>, ApiError> {
    let request = params.into_request(theme);
    Ok(Json(state.discovery.recommend_by_theme(&request, Utc::now()).await?))
}

/// POST /v1/destinations/explore
async fn explore(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ExploreRequest>,
) -> Result<Json<Vec<ExploreResult>>, ApiError> {
    Ok(Json(state.discovery.explore(&request).await?))
}

#[derive(Debug, Deserialize)]
struct SimilarParams {
    origin: String,
    limit: Option<usize>,
}

/// GET /v1/destinations/{code}/similar?origin=LHR
async fn similar(
    State(state): State<AppState>,
    ApiPath(code): ApiPath<String>,
    ApiQuery(params): ApiQuery<SimilarParams>,
) -> Result<Json<Vec<SimilarDestination>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);
    let found = state
        .discovery
        .similar(&code.to_uppercase(), &params.origin.to_uppercase(), limit)
        .await?;
    Ok(Json(found))
}

#[derive(Debug, Deserialize)]
struct EstimateParams {
    origin: Option<String>,
}

/// GET /v1/destinations/{code}/estimate
async fn estimate(
    State(state): State<AppState>,
    ApiPath(code): ApiPath<String>,
    ApiQuery(params): ApiQuery<EstimateParams>,
) -> Result<Json<PriceEstimate>, ApiError> {
    let origin = params.origin.map(|o| o.to_uppercase());
    Ok(Json(state.discovery.estimate(&code.to_uppercase(), origin.as_deref()).await?))
}
