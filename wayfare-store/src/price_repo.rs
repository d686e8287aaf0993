use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::{int_to_u32, parse_column, small_to_u8, DbClient};
use crate::error::{StoreError, StoreResult};
use wayfare_core::price::{PriceComparisonRequest, PriceHistory, PriceSample};
use wayfare_core::repository::PriceRepository;
use wayfare_shared::AppResult;

const SAMPLE_COLUMNS: &str = "id, provider, origin, destination, departure_date, return_date, trip_type, \
     passenger_count, cabin_class, price, currency, is_refundable, baggage_included, direct_flight, \
     duration_minutes, booking_url, valid_until, created_at";

#[derive(Debug, FromRow)]
struct PriceSampleRow {
    id: Uuid,
    provider: String,
    origin: String,
    destination: String,
    departure_date: NaiveDate,
    return_date: Option<NaiveDate>,
    trip_type: String,
    passenger_count: i16,
    cabin_class: String,
    price: Decimal,
    currency: String,
    is_refundable: bool,
    baggage_included: bool,
    direct_flight: bool,
    duration_minutes: Option<i32>,
    booking_url: Option<String>,
    valid_until: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PriceSampleRow> for PriceSample {
    type Error = StoreError;

    fn try_from(row: PriceSampleRow) -> StoreResult<Self> {
        Ok(PriceSample {
            id: row.id,
            provider: row.provider,
            origin: row.origin.trim().to_string(),
            destination: row.destination.trim().to_string(),
            departure_date: row.departure_date,
            return_date: row.return_date,
            trip_type: parse_column("trip_type", &row.trip_type)?,
            passenger_count: small_to_u8("passenger_count", row.passenger_count)?,
            cabin_class: parse_column("cabin_class", &row.cabin_class)?,
            price: row.price,
            currency: row.currency.trim().to_string(),
            is_refundable: row.is_refundable,
            baggage_included: row.baggage_included,
            direct_flight: row.direct_flight,
            duration_minutes: row
                .duration_minutes
                .map(|m| int_to_u32("duration_minutes", m))
                .transpose()?,
            booking_url: row.booking_url,
            valid_until: row.valid_until,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PriceHistoryRow {
    route_id: String,
    date: NaiveDate,
    average_price: Decimal,
    min_price: Decimal,
    max_price: Decimal,
    sample_count: i32,
    currency: String,
}

impl From<PriceHistoryRow> for PriceHistory {
    fn from(row: PriceHistoryRow) -> Self {
        PriceHistory {
            route_id: row.route_id,
            date: row.date,
            average_price: row.average_price,
            min_price: row.min_price,
            max_price: row.max_price,
            sample_count: row.sample_count,
            currency: row.currency.trim().to_string(),
        }
    }
}

fn into_samples(rows: Vec<PriceSampleRow>) -> StoreResult<Vec<PriceSample>> {
    rows.into_iter().map(PriceSample::try_from).collect()
}

pub struct PgPriceRepository {
    db: DbClient,
}

impl PgPriceRepository {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PriceRepository for PgPriceRepository {
    async fn insert_samples(&self, samples: &[PriceSample]) -> AppResult<usize> {
        if samples.is_empty() {
            return Ok(0);
        }
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let mut tx = pool.begin().await?;
                for s in samples {
                    sqlx::query(
                        r#"
                        INSERT INTO flight_prices (id, provider, origin, destination, departure_date, return_date,
                            trip_type, passenger_count, cabin_class, price, currency, is_refundable,
                            baggage_included, direct_flight, duration_minutes, booking_url, valid_until, created_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
                        ON CONFLICT (id) DO NOTHING
                        "#,
                    )
                    .bind(s.id)
                    .bind(&s.provider)
                    .bind(&s.origin)
                    .bind(&s.destination)
                    .bind(s.departure_date)
                    .bind(s.return_date)
                    .bind(s.trip_type.as_str())
                    .bind(i16::from(s.passenger_count))
                    .bind(s.cabin_class.as_str())
                    .bind(s.price)
                    .bind(&s.currency)
                    .bind(s.is_refundable)
                    .bind(s.baggage_included)
                    .bind(s.direct_flight)
                    .bind(s.duration_minutes.map(|m| m as i32))
                    .bind(s.booking_url.as_deref())
                    .bind(s.valid_until)
                    .bind(s.created_at)
                    .execute(&mut *tx)
                    .await?;
                }
                tx.commit().await?;
                Ok::<_, StoreError>(samples.len())
            })
            .await
    }

    async fn current_prices(
        &self,
        request: &PriceComparisonRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PriceSample>> {
        let sql = format!(
            r#"
            SELECT {SAMPLE_COLUMNS}
            FROM flight_prices
            WHERE origin = $1 AND destination = $2 AND departure_date = $3
              AND trip_type = $4 AND passenger_count = $5
              AND valid_until > $6
              AND ($7::TEXT IS NULL OR cabin_class = $7)
              AND ($8::TEXT IS NULL OR currency = $8)
              AND ($4 = 'oneway' OR return_date IS NOT DISTINCT FROM $9)
            ORDER BY price ASC, created_at DESC
            "#
        );
        let pool = &self.db.pool;
        let sql = sql.as_str();
        self.db
            .run(|| async move {
                let rows: Vec<PriceSampleRow> = sqlx::query_as(sql)
                    .bind(&request.origin)
                    .bind(&request.destination)
                    .bind(request.departure_date)
                    .bind(request.trip_type.as_str())
                    .bind(i16::from(request.passenger_count))
                    .bind(now)
                    .bind(request.cabin_class.map(|c| c.as_str()))
                    .bind(request.currency.as_deref())
                    .bind(request.return_date)
                    .fetch_all(pool)
                    .await?;
                into_samples(rows)
            })
            .await
    }

    async fn samples_since(&self, since: DateTime<Utc>) -> AppResult<Vec<PriceSample>> {
        let sql = format!("SELECT {SAMPLE_COLUMNS} FROM flight_prices WHERE created_at >= $1 ORDER BY created_at");
        let pool = &self.db.pool;
        let sql = sql.as_str();
        self.db
            .run(|| async move {
                let rows: Vec<PriceSampleRow> = sqlx::query_as(sql).bind(since).fetch_all(pool).await?;
                into_samples(rows)
            })
            .await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let result = sqlx::query("DELETE FROM flight_prices WHERE valid_until <= $1")
                    .bind(now)
                    .execute(pool)
                    .await?;
                Ok::<_, StoreError>(result.rows_affected())
            })
            .await
    }

    async fn upsert_history(&self, row: &PriceHistory) -> AppResult<()> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                sqlx::query(
                    r#"
                    INSERT INTO price_history (route_id, date, average_price, min_price, max_price, sample_count, currency)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (route_id, date) DO UPDATE SET
                        average_price = EXCLUDED.average_price,
                        min_price = EXCLUDED.min_price,
                        max_price = EXCLUDED.max_price,
                        sample_count = EXCLUDED.sample_count,
                        currency = EXCLUDED.currency,
                        updated_at = NOW()
                    "#,
                )
                .bind(&row.route_id)
                .bind(row.date)
                .bind(row.average_price)
                .bind(row.min_price)
                .bind(row.max_price)
                .bind(row.sample_count)
                .bind(&row.currency)
                .execute(pool)
                .await?;
                Ok::<_, StoreError>(())
            })
            .await
    }

    async fn history(&self, route_id: &str, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<PriceHistory>> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let rows: Vec<PriceHistoryRow> = sqlx::query_as(
                    r#"
                    SELECT route_id, date, average_price, min_price, max_price, sample_count, currency
                    FROM price_history
                    WHERE route_id = $1 AND date BETWEEN $2 AND $3
                    ORDER BY date
                    "#,
                )
                .bind(route_id)
                .bind(from)
                .bind(to)
                .fetch_all(pool)
                .await?;
                Ok::<_, StoreError>(rows.into_iter().map(PriceHistory::from).collect())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wayfare_core::price::TripType;
    use wayfare_core::search::CabinClass;

    fn row() -> PriceSampleRow {
        let now = Utc::now();
        PriceSampleRow {
            id: Uuid::new_v4(),
            provider: "amadeus".into(),
            origin: "LHR".into(),
            destination: "CDG".into(),
            departure_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            return_date: None,
            trip_type: "oneway".into(),
            passenger_count: 1,
            cabin_class: "ECONOMY".into(),
            price: dec!(85.10),
            currency: "EUR".into(),
            is_refundable: false,
            baggage_included: true,
            direct_flight: true,
            duration_minutes: Some(75),
            booking_url: None,
            valid_until: now + chrono::Duration::hours(1),
            created_at: now,
        }
    }

    #[test]
    fn test_sample_row_decodes() {
        let sample = PriceSample::try_from(row()).unwrap();
        assert_eq!(sample.trip_type, TripType::Oneway);
        assert_eq!(sample.cabin_class, CabinClass::Economy);
        assert_eq!(sample.price, dec!(85.10));
        assert_eq!(sample.duration_minutes, Some(75));
        assert_eq!(sample.route_id(), "LHR-CDG");
    }

    #[test]
    fn test_corrupt_sample_row_is_rejected() {
        let mut bad = row();
        bad.trip_type = "multicity".into();
        assert!(matches!(PriceSample::try_from(bad), Err(StoreError::Corrupt(_))));

        let mut bad = row();
        bad.duration_minutes = Some(-1);
        assert!(PriceSample::try_from(bad).is_err());
    }
}
