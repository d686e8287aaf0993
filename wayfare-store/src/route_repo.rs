use async_trait::async_trait;
use sqlx::FromRow;

use crate::database::{int_to_u32, DbClient};
use crate::error::{StoreError, StoreResult};
use wayfare_core::destination::RouteDuration;
use wayfare_core::repository::RouteStore;
use wayfare_shared::AppResult;

#[derive(Debug, FromRow)]
struct RouteDurationRow {
    origin: String,
    destination: String,
    duration_minutes: i32,
    distance_km: f64,
    is_direct: bool,
    typical_stops: i16,
}

impl TryFrom<RouteDurationRow> for RouteDuration {
    type Error = StoreError;

    fn try_from(row: RouteDurationRow) -> StoreResult<Self> {
        Ok(RouteDuration {
            origin: row.origin.trim().to_string(),
            destination: row.destination.trim().to_string(),
            duration_minutes: int_to_u32("duration_minutes", row.duration_minutes)?,
            distance_km: row.distance_km,
            is_direct: row.is_direct,
            typical_stops: int_to_u32("typical_stops", i32::from(row.typical_stops))?,
        })
    }
}

/// `flight_route_durations`, fed by the duration seeder.
pub struct PgRouteRepository {
    db: DbClient,
}

impl PgRouteRepository {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }

    pub async fn routes_by_duration(
        &self,
        origin: &str,
        min_minutes: u32,
        max_minutes: u32,
    ) -> AppResult<Vec<RouteDuration>> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let rows: Vec<RouteDurationRow> = sqlx::query_as(
                    r#"
                    SELECT origin, destination, duration_minutes, distance_km, is_direct, typical_stops
                    FROM flight_route_durations
                    WHERE origin = $1 AND duration_minutes BETWEEN $2 AND $3
                    ORDER BY duration_minutes, destination
                    "#,
                )
                .bind(origin)
                .bind(min_minutes as i32)
                .bind(max_minutes as i32)
                .fetch_all(pool)
                .await?;
                rows.into_iter().map(RouteDuration::try_from).collect::<StoreResult<Vec<_>>>()
            })
            .await
    }
}

#[async_trait]
impl RouteStore for PgRouteRepository {
    async fn upsert_routes(&self, routes: &[RouteDuration]) -> AppResult<usize> {
        if routes.is_empty() {
            return Ok(0);
        }
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let mut tx = pool.begin().await?;
                for route in routes {
                    sqlx::query(
                        r#"
                        INSERT INTO flight_route_durations (origin, destination, duration_minutes, distance_km,
                            is_direct, typical_stops)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        ON CONFLICT (origin, destination) DO UPDATE SET
                            duration_minutes = EXCLUDED.duration_minutes,
                            distance_km = EXCLUDED.distance_km,
                            is_direct = EXCLUDED.is_direct,
                            typical_stops = EXCLUDED.typical_stops,
                            updated_at = NOW()
                        "#,
                    )
                    .bind(&route.origin)
                    .bind(&route.destination)
                    .bind(route.duration_minutes as i32)
                    .bind(route.distance_km)
                    .bind(route.is_direct)
                    .bind(route.typical_stops as i16)
                    .execute(&mut *tx)
                    .await?;
                }
                tx.commit().await?;
                Ok::<_, StoreError>(routes.len())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_row_trims_char_columns() {
        let row = RouteDurationRow {
            origin: "LHR".into(),
            destination: "CDG".into(),
            duration_minutes: 85,
            distance_km: 344.0,
            is_direct: true,
            typical_stops: 0,
        };
        let route = RouteDuration::try_from(row).unwrap();
        assert_eq!(route.destination, "CDG");
        assert_eq!(route.duration_minutes, 85);
        assert!(route.validate().is_ok());
    }
}
