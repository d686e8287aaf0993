use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery, MaybeUser};
use crate::state::AppState;
use wayfare_core::search::{CabinClass, FlightSearchRequest};
use wayfare_core::session::SearchSession;
use wayfare_pricing::SearchOutcome;
use wayfare_search::aggregations::Facets;
use wayfare_search::{FlightQuery, SearchPage};
use wayfare_shared::AppError;

/// Routes whose GET responses may be served from the HTTP cache.
pub fn cached_routes() -> Router<AppState> {
    Router::new().route("/v1/flights/facets", get(facets))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flights/search", post(search))
        .route("/v1/flights/live", post(live_search))
        .route("/v1/sessions/{id}", get(session))
}

/// POST /v1/flights/search
/// Indexed offers with facets computed over the same filters.
async fn search(State(state): State<AppState>, ApiJson(query): ApiJson<FlightQuery>) -> Result<Json<SearchPage>, ApiError> {
    Ok(Json(state.search.search_flights(&query, true).await?))
}

#[derive(Debug, Deserialize)]
struct FacetParams {
    origin: String,
    destination: String,
    departure_date: NaiveDate,
    #[serde(default)]
    flexible_days: u8,
    cabin_class: Option<CabinClass>,
    max_stops: Option<u32>,
    #[serde(default)]
    direct_only: bool,
}

impl From<FacetParams> for FlightQuery {
    fn from(p: FacetParams) -> Self {
        let mut query = FlightQuery::new(&p.origin, &p.destination, p.departure_date);
        query.flexible_days = p.flexible_days;
        query.cabin_class = p.cabin_class;
        query.max_stops = p.max_stops;
        query.direct_only = p.direct_only;
        query
    }
}

/// GET /v1/flights/facets
async fn facets(State(state): State<AppState>, ApiQuery(params): ApiQuery<FacetParams>) -> Result<Json<Facets>, ApiError> {
    Ok(Json(state.search.facets(&params.into()).await?))
}

/// POST /v1/flights/live
/// Vendor search; results are stored, indexed and priced before returning.
async fn live_search(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    ApiJson(request): ApiJson<FlightSearchRequest>,
) -> Result<Json<SearchOutcome>, ApiError> {
    let ingestion = state
        .ingestion
        .as_ref()
        .ok_or_else(|| AppError::unavailable("live vendor search is not configured"))?;
    Ok(Json(ingestion.search_and_store(&request, user, Utc::now()).await?))
}

/// GET /v1/sessions/{id}
async fn session(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<SearchSession>, ApiError> {
    let ingestion = state
        .ingestion
        .as_ref()
        .ok_or_else(|| AppError::not_found("search session", id))?;
    let session = ingestion
        .session(id, Utc::now())
        .await?
        .ok_or_else(|| AppError::not_found("search session", id))?;
    Ok(Json(session))
}
