use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::database::DbClient;
use crate::error::{StoreError, StoreResult};
use wayfare_core::analytics::{Cohort, CohortPeriod, Event, EventContext, EventOrder, EventQuery, Funnel, FunnelStep};
use wayfare_core::repository::EventStore;
use wayfare_shared::AppResult;

#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    event_type: String,
    user_id: Option<String>,
    session_id: String,
    occurred_at: DateTime<Utc>,
    properties: Json<BTreeMap<String, serde_json::Value>>,
    context: Json<EventContext>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            event_type: row.event_type,
            user_id: row.user_id,
            session_id: row.session_id,
            timestamp: row.occurred_at,
            properties: row.properties.0,
            context: row.context.0,
        }
    }
}

#[derive(Debug, FromRow)]
struct CohortRow {
    id: Uuid,
    name: String,
    period: String,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    criteria: Json<BTreeMap<String, serde_json::Value>>,
    first_analyzed_at: Option<DateTime<Utc>>,
}

impl TryFrom<CohortRow> for Cohort {
    type Error = StoreError;

    fn try_from(row: CohortRow) -> StoreResult<Self> {
        let period: CohortPeriod = serde_json::from_value(serde_json::Value::String(row.period.clone()))
            .map_err(|_| StoreError::Corrupt(format!("period: '{}'", row.period)))?;
        Ok(Cohort {
            id: row.id,
            name: row.name,
            period,
            start_date: row.start_date,
            end_date: row.end_date,
            criteria: row.criteria.0,
            first_analyzed_at: row.first_analyzed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct FunnelRow {
    id: Uuid,
    name: String,
    steps: Json<Vec<FunnelStep>>,
    window_hours: Option<i64>,
}

impl From<FunnelRow> for Funnel {
    fn from(row: FunnelRow) -> Self {
        Funnel { id: row.id, name: row.name, steps: row.steps.0, window_hours: row.window_hours }
    }
}

fn period_label(period: CohortPeriod) -> &'static str {
    match period {
        CohortPeriod::Daily => "daily",
        CohortPeriod::Weekly => "weekly",
        CohortPeriod::Monthly => "monthly",
    }
}

/// Column filters go to SQL; property/context conditions are evaluated on
/// the decoded events, so `limit` is applied after them.
fn build_event_query(query: &EventQuery) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT id, event_type, user_id, session_id, occurred_at, properties, context FROM analytics_events WHERE TRUE",
    );
    if !query.event_types.is_empty() {
        qb.push(" AND event_type = ANY(").push_bind(&query.event_types).push(")");
    }
    if let Some(start) = query.start_time {
        qb.push(" AND occurred_at >= ").push_bind(start);
    }
    if let Some(end) = query.end_time {
        qb.push(" AND occurred_at < ").push_bind(end);
    }
    if let Some(user_ids) = &query.user_ids {
        qb.push(" AND user_id = ANY(").push_bind(user_ids).push(")");
    }
    match query.order_by {
        EventOrder::TimestampAsc => qb.push(" ORDER BY occurred_at ASC, id"),
        EventOrder::TimestampDesc => qb.push(" ORDER BY occurred_at DESC, id"),
    };
    if query.filters.is_empty() {
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
    }
    qb
}

/// Postgres-backed analytics event store.
pub struct PgEventStore {
    db: DbClient,
}

impl PgEventStore {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, event: &Event) -> AppResult<()> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                sqlx::query(
                    r#"
                    INSERT INTO analytics_events (id, event_type, user_id, session_id, occurred_at, properties, context)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (id) DO NOTHING
                    "#,
                )
                .bind(event.id)
                .bind(&event.event_type)
                .bind(event.user_id.as_deref())
                .bind(&event.session_id)
                .bind(event.timestamp)
                .bind(Json(&event.properties))
                .bind(Json(&event.context))
                .execute(pool)
                .await?;
                Ok::<_, StoreError>(())
            })
            .await
    }

    async fn query_events(&self, query: &EventQuery) -> AppResult<Vec<Event>> {
        let pool = &self.db.pool;
        let rows = self
            .db
            .run(|| async move {
                let rows: Vec<EventRow> = build_event_query(query).build_query_as().fetch_all(pool).await?;
                Ok::<_, StoreError>(rows)
            })
            .await?;

        let mut events: Vec<Event> = rows
            .into_iter()
            .map(Event::from)
            .filter(|e| query.filters.iter().all(|c| c.matches(e)))
            .collect();
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn get_cohort(&self, id: Uuid) -> AppResult<Option<Cohort>> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let row: Option<CohortRow> = sqlx::query_as(
                    "SELECT id, name, period, start_date, end_date, criteria, first_analyzed_at \
                     FROM analytics_cohorts WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(pool)
                .await?;
                row.map(Cohort::try_from).transpose()
            })
            .await
    }

    async fn create_cohort(&self, cohort: &Cohort) -> AppResult<()> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                sqlx::query(
                    r#"
                    INSERT INTO analytics_cohorts (id, name, period, start_date, end_date, criteria, first_analyzed_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(cohort.id)
                .bind(&cohort.name)
                .bind(period_label(cohort.period))
                .bind(cohort.start_date)
                .bind(cohort.end_date)
                .bind(Json(&cohort.criteria))
                .bind(cohort.first_analyzed_at)
                .execute(pool)
                .await?;
                Ok::<_, StoreError>(())
            })
            .await
    }

    async fn mark_cohort_analyzed(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                sqlx::query(
                    "UPDATE analytics_cohorts SET first_analyzed_at = $2 WHERE id = $1 AND first_analyzed_at IS NULL",
                )
                .bind(id)
                .bind(at)
                .execute(pool)
                .await?;
                Ok::<_, StoreError>(())
            })
            .await
    }

    async fn get_funnel(&self, id: Uuid) -> AppResult<Option<Funnel>> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let row: Option<FunnelRow> =
                    sqlx::query_as("SELECT id, name, steps, window_hours FROM analytics_funnels WHERE id = $1")
                        .bind(id)
                        .fetch_optional(pool)
                        .await?;
                Ok::<_, StoreError>(row.map(Funnel::from))
            })
            .await
    }

    async fn create_funnel(&self, funnel: &Funnel) -> AppResult<()> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                sqlx::query("INSERT INTO analytics_funnels (id, name, steps, window_hours) VALUES ($1, $2, $3, $4)")
                    .bind(funnel.id)
                    .bind(&funnel.name)
                    .bind(Json(&funnel.steps))
                    .bind(funnel.window_hours)
                    .execute(pool)
                    .await?;
                Ok::<_, StoreError>(())
            })
            .await
    }
}
