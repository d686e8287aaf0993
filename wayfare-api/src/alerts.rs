use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, UserId};
use crate::state::AppState;
use wayfare_core::alert::{CreateAlertRequest, PriceAlert};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/alerts", get(list).post(create))
        .route("/v1/alerts/{id}", get(fetch).delete(deactivate))
}

/// POST /v1/alerts
async fn create(
    State(state): State<AppState>,
    UserId(user): UserId,
    ApiJson(request): ApiJson<CreateAlertRequest>,
) -> Result<(StatusCode, Json<PriceAlert>), ApiError> {
    let alert = state.alerts.create(&user, request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

/// GET /v1/alerts
async fn list(State(state): State<AppState>, UserId(user): UserId) -> Result<Json<Vec<PriceAlert>>, ApiError> {
    Ok(Json(state.alerts.list(&user).await?))
}

/// GET /v1/alerts/{id}
async fn fetch(
    State(state): State<AppState>,
    UserId(user): UserId,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<PriceAlert>, ApiError> {
    Ok(Json(state.alerts.get(id, &user).await?))
}

/// DELETE /v1/alerts/{id}
async fn deactivate(
    State(state): State<AppState>,
    UserId(user): UserId,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.alerts.deactivate(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
