use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::app_config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::gate::{QueryGate, DEFAULT_MAX_CONCURRENT_QUERIES};
use wayfare_resilience::{presets, Executor};
use wayfare_shared::{AppError, AppResult};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
    executor: Executor,
    gate: QueryGate,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;

        Ok(Self::from_pool(pool).with_max_concurrency(config.max_concurrent_queries))
    }

    /// Wrap an existing pool; every query runs through the `postgres` executor.
    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            executor: Executor::global(presets::database("postgres")),
            gate: QueryGate::new("postgres", DEFAULT_MAX_CONCURRENT_QUERIES),
        }
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.gate = QueryGate::new("postgres", limit);
        self
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    pub async fn ping(&self) -> AppResult<()> {
        let pool = &self.pool;
        self.run(|| async move {
            sqlx::query("SELECT 1").execute(pool).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    /// Run `op` under the database deadline, breaker and retry policy.
    /// `op` is invoked once per attempt, so it must rebuild its query.
    /// Each attempt holds a query permit; backoff sleeps do not.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let gate = &self.gate;
        self.executor
            .execute(|| {
                let attempt = op();
                async move {
                    let _permit = gate.acquire().await?;
                    attempt.await.map_err(AppError::from)
                }
            })
            .await
    }
}

// ============================================================================
// Row decoding helpers
// ============================================================================

pub(crate) fn parse_column<T>(column: &str, raw: &str) -> StoreResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", column, e)))
}

pub(crate) fn small_to_u8(column: &str, value: i16) -> StoreResult<u8> {
    u8::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} out of range: {}", column, value)))
}

pub(crate) fn int_to_u32(column: &str, value: i32) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} out of range: {}", column, value)))
}
