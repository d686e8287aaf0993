use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::{parse_column, small_to_u8, DbClient};
use crate::error::{StoreError, StoreResult};
use wayfare_core::alert::{suppression_window, PriceAlert};
use wayfare_core::repository::AlertRepository;
use wayfare_shared::{AppResult, Masked};

/// Advisory-lock namespace serializing alert creation per user.
const USER_ALERTS_LOCK: i32 = 1;

const ALERT_COLUMNS: &str = "id, user_id, origin, destination, departure_date, return_date, max_price, currency, \
     trip_type, passenger_count, cabin_class, notification_email, is_active, trigger_count, last_triggered, \
     created_at, expires_at";

#[derive(Debug, FromRow)]
struct PriceAlertRow {
    id: Uuid,
    user_id: String,
    origin: String,
    destination: String,
    departure_date: NaiveDate,
    return_date: Option<NaiveDate>,
    max_price: Decimal,
    currency: String,
    trip_type: String,
    passenger_count: i16,
    cabin_class: String,
    notification_email: String,
    is_active: bool,
    trigger_count: i32,
    last_triggered: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<PriceAlertRow> for PriceAlert {
    type Error = StoreError;

    fn try_from(row: PriceAlertRow) -> StoreResult<Self> {
        Ok(PriceAlert {
            id: row.id,
            user_id: row.user_id,
            origin: row.origin.trim().to_string(),
            destination: row.destination.trim().to_string(),
            departure_date: row.departure_date,
            return_date: row.return_date,
            max_price: row.max_price,
            currency: row.currency.trim().to_string(),
            trip_type: parse_column("trip_type", &row.trip_type)?,
            passenger_count: small_to_u8("passenger_count", row.passenger_count)?,
            cabin_class: parse_column("cabin_class", &row.cabin_class)?,
            notification_email: Masked::new(row.notification_email),
            is_active: row.is_active,
            trigger_count: row.trigger_count,
            last_triggered: row.last_triggered,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

fn into_alerts(rows: Vec<PriceAlertRow>) -> StoreResult<Vec<PriceAlert>> {
    rows.into_iter().map(PriceAlert::try_from).collect()
}

pub struct PgAlertRepository {
    db: DbClient,
}

impl PgAlertRepository {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }

    async fn fetch(&self, sql: &str, user_id: Option<&str>) -> AppResult<Vec<PriceAlert>> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let mut query = sqlx::query_as::<_, PriceAlertRow>(sql);
                if let Some(user_id) = user_id {
                    query = query.bind(user_id);
                }
                into_alerts(query.fetch_all(pool).await?)
            })
            .await
    }
}

#[async_trait]
impl AlertRepository for PgAlertRepository {
    /// Runs under a per-user advisory lock so two racing creates cannot both
    /// see room under the limit.
    async fn create(&self, alert: &PriceAlert, limit: usize) -> AppResult<bool> {
        let pool = &self.db.pool;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db
            .run(|| async move {
                let mut tx = pool.begin().await?;
                sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
                    .bind(USER_ALERTS_LOCK)
                    .bind(&alert.user_id)
                    .execute(&mut *tx)
                    .await?;
                let active: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM price_alerts WHERE user_id = $1 AND is_active")
                        .bind(&alert.user_id)
                        .fetch_one(&mut *tx)
                        .await?;
                if active >= limit {
                    return Ok::<_, StoreError>(false);
                }
                sqlx::query(
                    r#"
                    INSERT INTO price_alerts (id, user_id, origin, destination, departure_date, return_date,
                        max_price, currency, trip_type, passenger_count, cabin_class, notification_email,
                        is_active, trigger_count, last_triggered, created_at, expires_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                    "#,
                )
                .bind(alert.id)
                .bind(&alert.user_id)
                .bind(&alert.origin)
                .bind(&alert.destination)
                .bind(alert.departure_date)
                .bind(alert.return_date)
                .bind(alert.max_price)
                .bind(&alert.currency)
                .bind(alert.trip_type.as_str())
                .bind(i16::from(alert.passenger_count))
                .bind(alert.cabin_class.as_str())
                .bind(alert.notification_email.expose())
                .bind(alert.is_active)
                .bind(alert.trigger_count)
                .bind(alert.last_triggered)
                .bind(alert.created_at)
                .bind(alert.expires_at)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(true)
            })
            .await
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<PriceAlert>> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM price_alerts WHERE id = $1");
        let pool = &self.db.pool;
        let sql = sql.as_str();
        self.db
            .run(|| async move {
                let row: Option<PriceAlertRow> = sqlx::query_as(sql).bind(id).fetch_optional(pool).await?;
                row.map(PriceAlert::try_from).transpose()
            })
            .await
    }

    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<PriceAlert>> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM price_alerts WHERE user_id = $1 ORDER BY created_at DESC");
        self.fetch(&sql, Some(user_id)).await
    }

    async fn count_active_for_user(&self, user_id: &str) -> AppResult<usize> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let (count,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM price_alerts WHERE user_id = $1 AND is_active")
                        .bind(user_id)
                        .fetch_one(pool)
                        .await?;
                Ok::<_, StoreError>(count as usize)
            })
            .await
    }

    async fn active(&self, now: DateTime<Utc>) -> AppResult<Vec<PriceAlert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM price_alerts WHERE is_active AND expires_at > $1 ORDER BY created_at"
        );
        let pool = &self.db.pool;
        let sql = sql.as_str();
        self.db
            .run(|| async move {
                let rows: Vec<PriceAlertRow> = sqlx::query_as(sql).bind(now).fetch_all(pool).await?;
                into_alerts(rows)
            })
            .await
    }

    async fn for_route(
        &self,
        origin: &str,
        destination: &str,
        departure_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PriceAlert>> {
        let sql = format!(
            r#"
            SELECT {ALERT_COLUMNS} FROM price_alerts
            WHERE origin = $1 AND destination = $2 AND departure_date = $3
              AND is_active AND expires_at > $4
            ORDER BY created_at
            "#
        );
        let pool = &self.db.pool;
        let sql = sql.as_str();
        self.db
            .run(|| async move {
                let rows: Vec<PriceAlertRow> = sqlx::query_as(sql)
                    .bind(origin)
                    .bind(destination)
                    .bind(departure_date)
                    .bind(now)
                    .fetch_all(pool)
                    .await?;
                into_alerts(rows)
            })
            .await
    }

    async fn record_trigger(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Option<PriceAlert>> {
        // The eligibility test and the increment share one statement, so two
        // concurrent evaluations cannot both fire inside the window.
        let sql = format!(
            r#"
            UPDATE price_alerts
            SET trigger_count = trigger_count + 1, last_triggered = $2
            WHERE id = $1 AND is_active AND expires_at > $2
              AND (last_triggered IS NULL OR last_triggered < $3)
            RETURNING {ALERT_COLUMNS}
            "#
        );
        let cutoff = at - suppression_window();
        let pool = &self.db.pool;
        let sql = sql.as_str();
        self.db
            .run(|| async move {
                let row: Option<PriceAlertRow> = sqlx::query_as(sql)
                    .bind(id)
                    .bind(at)
                    .bind(cutoff)
                    .fetch_optional(pool)
                    .await?;
                row.map(PriceAlert::try_from).transpose()
            })
            .await
    }

    async fn deactivate(&self, id: Uuid, user_id: &str) -> AppResult<bool> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let result =
                    sqlx::query("UPDATE price_alerts SET is_active = FALSE WHERE id = $1 AND user_id = $2 AND is_active")
                        .bind(id)
                        .bind(user_id)
                        .execute(pool)
                        .await?;
                Ok::<_, StoreError>(result.rows_affected() > 0)
            })
            .await
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let result = sqlx::query("UPDATE price_alerts SET is_active = FALSE WHERE is_active AND expires_at < $1")
                    .bind(now)
                    .execute(pool)
                    .await?;
                Ok::<_, StoreError>(result.rows_affected())
            })
            .await
    }
}
