use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;
use wayfare_analytics::{CohortReport, FunnelReport, FunnelRequest, RetentionRequest, TrendMetric, TrendPoint};
use wayfare_core::analytics::{Cohort, CohortPeriod, Event, EventContext, Funnel, FunnelStep};
use wayfare_shared::AppError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/analytics/events", post(track))
        .route("/v1/analytics/cohorts", post(create_cohort))
        .route("/v1/analytics/cohorts/{id}/retention", get(retention))
        .route("/v1/analytics/cohorts/{id}/trend", get(trend))
        .route("/v1/analytics/funnels", post(create_funnel))
        .route("/v1/analytics/funnels/{id}", get(funnel_report))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Inbound event; the server assigns the id and, when absent, the timestamp.
#[derive(Debug, Deserialize)]
pub struct TrackEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub context: EventContext,
}

#[derive(Debug, Serialize)]
pub struct Tracked {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateCohortRequest {
    pub name: String,
    pub period: CohortPeriod,
    pub start_date: chrono::NaiveDate,
    #[serde(default)]
    pub end_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub criteria: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFunnelRequest {
    pub name: String,
    pub steps: Vec<FunnelStep>,
    #[serde(default)]
    pub window_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TrendParams {
    metric: String,
    #[serde(default = "default_months")]
    months: u32,
    retention_event: String,
    #[serde(default)]
    periods: Option<u32>,
}

fn default_months() -> u32 {
    6
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/analytics/events
async fn track(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<TrackEventRequest>,
) -> Result<(StatusCode, Json<Tracked>), ApiError> {
    if payload.event_type.trim().is_empty() {
        return Err(AppError::validation("event type is required").into());
    }
    if payload.session_id.trim().is_empty() {
        return Err(AppError::validation("session_id is required").into());
    }
    let event = Event {
        id: Uuid::new_v4(),
        event_type: payload.event_type,
        user_id: payload.user_id,
        session_id: payload.session_id,
        timestamp: payload.timestamp.unwrap_or_else(Utc::now),
        properties: payload.properties,
        context: payload.context,
    };
    state.events.append(&event).await?;
    Ok((StatusCode::ACCEPTED, Json(Tracked { id: event.id })))
}

/// POST /v1/analytics/cohorts
async fn create_cohort(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateCohortRequest>,
) -> Result<(StatusCode, Json<Cohort>), ApiError> {
    let cohort = Cohort {
        id: Uuid::new_v4(),
        name: payload.name,
        period: payload.period,
        start_date: payload.start_date,
        end_date: payload.end_date,
        criteria: payload.criteria,
        first_analyzed_at: None,
    };
    cohort.validate().map_err(AppError::from)?;
    state.events.create_cohort(&cohort).await?;
    Ok((StatusCode::CREATED, Json(cohort)))
}

/// GET /v1/analytics/cohorts/{id}/retention?retention_event=search&periods=8
async fn retention(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(request): ApiQuery<RetentionRequest>,
) -> Result<Json<CohortReport>, ApiError> {
    Ok(Json(state.cohorts.analyze(id, &request, Utc::now()).await?))
}

/// GET /v1/analytics/cohorts/{id}/trend?metric=retention_day_7&months=6&retention_event=search
async fn trend(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<TrendParams>,
) -> Result<Json<Vec<TrendPoint>>, ApiError> {
    let metric: TrendMetric = params.metric.parse()?;
    let mut request = RetentionRequest::new(&params.retention_event);
    if let Some(periods) = params.periods {
        request.periods = periods;
    }
    let points = state.cohorts.trend(id, &request, metric, params.months, Utc::now()).await?;
    Ok(Json(points))
}

/// POST /v1/analytics/funnels
async fn create_funnel(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateFunnelRequest>,
) -> Result<(StatusCode, Json<Funnel>), ApiError> {
    let funnel = Funnel {
        id: Uuid::new_v4(),
        name: payload.name,
        steps: payload.steps,
        window_hours: payload.window_hours,
    };
    funnel.validate().map_err(AppError::from)?;
    state.events.create_funnel(&funnel).await?;
    Ok((StatusCode::CREATED, Json(funnel)))
}

/// GET /v1/analytics/funnels/{id}
async fn funnel_report(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(request): ApiQuery<FunnelRequest>,
) -> Result<Json<FunnelReport>, ApiError> {
    Ok(Json(state.funnels.analyze(id, &request).await?))
}
