use axum::{extract::State, routing::get, Json, Router};
use serde::Deserialize;
use tracing::warn;

use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::state::AppState;
use wayfare_core::airport::{rank, AirportSuggestion};
use wayfare_shared::AppError;

pub const MAX_QUERY_LEN: usize = 64;

fn default_limit() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct AutocompleteParams {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub fn cached_routes() -> Router<AppState> {
    Router::new().route("/v1/airports/autocomplete", get(autocomplete))
}

/// GET /v1/airports/autocomplete?q=lon
/// Index first; the vendor directory only when the index has nothing.
async fn autocomplete(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<AutocompleteParams>,
) -> Result<Json<Vec<AirportSuggestion>>, ApiError> {
    let q = params.q.trim();
    if q.is_empty() || q.len() > MAX_QUERY_LEN {
        return Err(AppError::validation("q must be between 1 and 64 characters").with_detail("q", q).into());
    }
    if !(1..=20).contains(&params.limit) {
        return Err(AppError::validation("limit must be between 1 and 20").with_detail("limit", params.limit).into());
    }

    let indexed = match state.airports.suggest(q, params.limit).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(query = %q, error = %e, "airport index unavailable");
            Vec::new()
        }
    };
    if !indexed.is_empty() {
        return Ok(Json(indexed));
    }

    let Some(supplier) = &state.supplier else {
        return Ok(Json(indexed));
    };
    let airports = supplier.suggest_locations(q, params.limit).await?;
    Ok(Json(rank(q, &airports, params.limit)))
}
