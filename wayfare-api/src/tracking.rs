use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, UserId};
use crate::state::AppState;
use wayfare_core::tracking::{CreateTrackingRequest, PriceTracking};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tracking", get(list).post(create))
        .route("/v1/tracking/{id}/stop", post(stop))
        .route("/v1/tracking/{id}", delete(remove))
}

/// POST /v1/tracking
async fn create(
    State(state): State<AppState>,
    UserId(user): UserId,
    ApiJson(request): ApiJson<CreateTrackingRequest>,
) -> Result<(StatusCode, Json<PriceTracking>), ApiError> {
    let tracking = state.tracking.create(&user, request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(tracking)))
}

/// GET /v1/tracking
async fn list(State(state): State<AppState>, UserId(user): UserId) -> Result<Json<Vec<PriceTracking>>, ApiError> {
    Ok(Json(state.tracking.list(&user).await?))
}

/// POST /v1/tracking/{id}/stop
async fn stop(
    State(state): State<AppState>,
    UserId(user): UserId,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.tracking.stop(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /v1/tracking/{id}
async fn remove(
    State(state): State<AppState>,
    UserId(user): UserId,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.tracking.delete(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
