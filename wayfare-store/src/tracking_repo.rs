use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::{parse_column, small_to_u8, DbClient};
use crate::error::{StoreError, StoreResult};
use wayfare_core::repository::TrackingRepository;
use wayfare_core::tracking::PriceTracking;
use wayfare_shared::{codes, AppResult};

/// Advisory-lock namespace serializing tracking creation per user.
const USER_TRACKING_LOCK: i32 = 2;

const TRACKING_COLUMNS: &str = "id, user_id, route_id, origin, destination, departure_date, return_date, \
     trip_type, passenger_count, cabin_class, is_active, created_at";

#[derive(Debug, FromRow)]
struct PriceTrackingRow {
    id: Uuid,
    user_id: String,
    route_id: String,
    origin: String,
    destination: String,
    departure_date: NaiveDate,
    return_date: Option<NaiveDate>,
    trip_type: String,
    passenger_count: i16,
    cabin_class: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<PriceTrackingRow> for PriceTracking {
    type Error = StoreError;

    fn try_from(row: PriceTrackingRow) -> StoreResult<Self> {
        Ok(PriceTracking {
            id: row.id,
            user_id: row.user_id,
            route_id: row.route_id,
            origin: row.origin.trim().to_string(),
            destination: row.destination.trim().to_string(),
            departure_date: row.departure_date,
            return_date: row.return_date,
            trip_type: parse_column("trip_type", &row.trip_type)?,
            passenger_count: small_to_u8("passenger_count", row.passenger_count)?,
            cabin_class: parse_column("cabin_class", &row.cabin_class)?,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

fn into_trackings(rows: Vec<PriceTrackingRow>) -> StoreResult<Vec<PriceTracking>> {
    rows.into_iter().map(PriceTracking::try_from).collect()
}

pub struct PgTrackingRepository {
    db: DbClient,
}

impl PgTrackingRepository {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }

    async fn fetch_all(&self, sql: &str, user_id: Option<&str>) -> AppResult<Vec<PriceTracking>> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let mut query = sqlx::query_as::<_, PriceTrackingRow>(sql);
                if let Some(user_id) = user_id {
                    query = query.bind(user_id);
                }
                into_trackings(query.fetch_all(pool).await?)
            })
            .await
    }

    async fn execute(&self, sql: &str, id: Uuid, user_id: &str) -> AppResult<bool> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let result = sqlx::query(sql).bind(id).bind(user_id).execute(pool).await?;
                Ok::<_, StoreError>(result.rows_affected() > 0)
            })
            .await
    }
}

#[async_trait]
impl TrackingRepository for PgTrackingRepository {
    async fn create(&self, tracking: &PriceTracking, limit: usize) -> AppResult<bool> {
        let pool = &self.db.pool;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db
            .run(|| async move {
                let mut tx = pool.begin().await?;
                sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
                    .bind(USER_TRACKING_LOCK)
                    .bind(&tracking.user_id)
                    .execute(&mut *tx)
                    .await?;
                let active: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM price_tracking WHERE user_id = $1 AND is_active")
                        .bind(&tracking.user_id)
                        .fetch_one(&mut *tx)
                        .await?;
                if active >= limit {
                    return Ok::<_, StoreError>(false);
                }
                sqlx::query(
                    r#"
                    INSERT INTO price_tracking (id, user_id, route_id, origin, destination, departure_date,
                        return_date, trip_type, passenger_count, cabin_class, is_active, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    "#,
                )
                .bind(tracking.id)
                .bind(&tracking.user_id)
                .bind(&tracking.route_id)
                .bind(&tracking.origin)
                .bind(&tracking.destination)
                .bind(tracking.departure_date)
                .bind(tracking.return_date)
                .bind(tracking.trip_type.as_str())
                .bind(i16::from(tracking.passenger_count))
                .bind(tracking.cabin_class.as_str())
                .bind(tracking.is_active)
                .bind(tracking.created_at)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(true)
            })
            .await
            .map_err(|e| {
                // uq_price_tracking_active
                if e.is(codes::CONFLICT) {
                    e.with_code(codes::DUPLICATE_TRACKING)
                        .with_detail("route_id", tracking.route_id.clone())
                } else {
                    e
                }
            })
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<PriceTracking>> {
        let sql = format!("SELECT {TRACKING_COLUMNS} FROM price_tracking WHERE id = $1");
        let pool = &self.db.pool;
        let sql = sql.as_str();
        self.db
            .run(|| async move {
                let row: Option<PriceTrackingRow> = sqlx::query_as(sql).bind(id).fetch_optional(pool).await?;
                row.map(PriceTracking::try_from).transpose()
            })
            .await
    }

    async fn find_active(&self, user_id: &str, route_id: &str) -> AppResult<Option<PriceTracking>> {
        let sql = format!(
            "SELECT {TRACKING_COLUMNS} FROM price_tracking WHERE user_id = $1 AND route_id = $2 AND is_active"
        );
        let pool = &self.db.pool;
        let sql = sql.as_str();
        self.db
            .run(|| async move {
                let row: Option<PriceTrackingRow> = sqlx::query_as(sql)
                    .bind(user_id)
                    .bind(route_id)
                    .fetch_optional(pool)
                    .await?;
                row.map(PriceTracking::try_from).transpose()
            })
            .await
    }

    async fn count_active_for_user(&self, user_id: &str) -> AppResult<usize> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let (count,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM price_tracking WHERE user_id = $1 AND is_active")
                        .bind(user_id)
                        .fetch_one(pool)
                        .await?;
                Ok::<_, StoreError>(count as usize)
            })
            .await
    }

    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<PriceTracking>> {
        let sql = format!("SELECT {TRACKING_COLUMNS} FROM price_tracking WHERE user_id = $1 ORDER BY created_at DESC");
        self.fetch_all(&sql, Some(user_id)).await
    }

    async fn active(&self) -> AppResult<Vec<PriceTracking>> {
        let sql = format!("SELECT {TRACKING_COLUMNS} FROM price_tracking WHERE is_active ORDER BY created_at");
        self.fetch_all(&sql, None).await
    }

    async fn stop(&self, id: Uuid, user_id: &str) -> AppResult<bool> {
        self.execute(
            "UPDATE price_tracking SET is_active = FALSE WHERE id = $1 AND user_id = $2 AND is_active",
            id,
            user_id,
        )
        .await
    }

    async fn delete(&self, id: Uuid, user_id: &str) -> AppResult<bool> {
        self.execute("DELETE FROM price_tracking WHERE id = $1 AND user_id = $2", id, user_id)
            .await
    }
}
