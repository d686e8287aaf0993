use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::state::AppState;
use wayfare_resilience::BreakerStats;
use wayfare_shared::AppError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/circuit-breakers", get(list_breakers))
        .route("/v1/admin/circuit-breakers/reset", post(reset_breakers))
}

#[derive(Debug, Serialize)]
pub struct BreakerList {
    pub breakers: Vec<BreakerStats>,
}

#[derive(Debug, Deserialize)]
struct ResetParams {
    name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetOutcome {
    pub reset: Vec<String>,
}

/// GET /v1/admin/circuit-breakers
async fn list_breakers(State(state): State<AppState>) -> Json<BreakerList> {
    Json(BreakerList { breakers: state.breakers.all_stats() })
}

/// POST /v1/admin/circuit-breakers/reset[?name=vendor]
/// Without a name every breaker goes back to closed.
async fn reset_breakers(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ResetParams>,
) -> Result<Json<ResetOutcome>, ApiError> {
    match params.name {
        Some(name) => {
            if !state.breakers.reset(&name) {
                return Err(AppError::not_found("circuit breaker", &name).into());
            }
            tracing::info!(breaker = %name, "circuit breaker reset");
            Ok(Json(ResetOutcome { reset: vec![name] }))
        }
        None => {
            state.breakers.reset_all();
            tracing::info!("all circuit breakers reset");
            let reset = state.breakers.all_stats().into_iter().map(|s| s.name).collect();
            Ok(Json(ResetOutcome { reset }))
        }
    }
}
