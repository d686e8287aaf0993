use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health { status: "ok", service: state.settings.service_name.clone(), timestamp: Utc::now() })
}
