use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::{ApiPath, ApiQuery};
use crate::state::AppState;
use wayfare_core::iata::route_id;
use wayfare_core::price::PriceTrend;
use wayfare_search::RouteInsights;

fn default_days() -> u32 {
    30
}

#[derive(Debug, Deserialize)]
struct DaysParam {
    #[serde(default = "default_days")]
    days: u32,
}

pub fn cached_routes() -> Router<AppState> {
    Router::new().route("/v1/routes/{origin}/{destination}/insights", get(insights))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/routes/{origin}/{destination}/trend", get(trend))
}

/// GET /v1/routes/{origin}/{destination}/insights?days=30
async fn insights(
    State(state): State<AppState>,
    ApiPath((origin, destination)): ApiPath<(String, String)>,
    ApiQuery(params): ApiQuery<DaysParam>,
) -> Result<Json<RouteInsights>, ApiError> {
    let origin = origin.to_uppercase();
    let destination = destination.to_uppercase();
    Ok(Json(state.search.route_insights(&origin, &destination, params.days).await?))
}

/// GET /v1/routes/{origin}/{destination}/trend?days=30
/// Daily history with a linear projection.
async fn trend(
    State(state): State<AppState>,
    ApiPath((origin, destination)): ApiPath<(String, String)>,
    ApiQuery(params): ApiQuery<DaysParam>,
) -> Result<Json<PriceTrend>, ApiError> {
    let route = route_id(&origin.to_uppercase(), &destination.to_uppercase());
    let trend = state
        .prices
        .trend(&route, i64::from(params.days), Utc::now().date_naive())
        .await?;
    Ok(Json(trend))
}
