use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;
use wayfare_core::price::{PriceComparison, PriceComparisonRequest, PriceSample};
use wayfare_pricing::IngestReport;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/prices/compare", post(compare))
        .route("/v1/prices/ingest", post(ingest))
}

/// POST /v1/prices/compare
async fn compare(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PriceComparisonRequest>,
) -> Result<Json<PriceComparison>, ApiError> {
    Ok(Json(state.prices.compare(&request, Utc::now()).await?))
}

/// POST /v1/prices/ingest
/// Samples from an external feed; the batch is rejected if any sample is invalid.
async fn ingest(
    State(state): State<AppState>,
    ApiJson(samples): ApiJson<Vec<PriceSample>>,
) -> Result<Json<IngestReport>, ApiError> {
    Ok(Json(state.prices.ingest(&samples, Utc::now()).await?))
}
