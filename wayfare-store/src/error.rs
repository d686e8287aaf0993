use wayfare_shared::AppError;

/// Postgres unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("Wide-column store error: {0}")]
    WideColumn(String),
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn wide_column(err: impl std::fmt::Display) -> Self {
        StoreError::WideColumn(err.to_string())
    }

    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => db.code().as_deref() == Some(UNIQUE_VIOLATION),
            _ => false,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        let app = match &err {
            _ if err.is_unique_violation() => AppError::conflict(message),
            StoreError::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_),
            ) => AppError::unavailable(message),
            StoreError::Database(_) | StoreError::Migration(_) => AppError::internal(message).retryable(false),
            StoreError::Cache(_) | StoreError::WideColumn(_) => AppError::unavailable(message),
            StoreError::Kafka(_) => AppError::external(message),
            StoreError::Corrupt(_) | StoreError::Serialization(_) | StoreError::Config(_) => {
                AppError::internal(message)
            }
        };
        app.with_service("store")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfare_shared::codes;

    #[test]
    fn test_pool_exhaustion_is_retryable() {
        let err: AppError = StoreError::Database(sqlx::Error::PoolTimedOut).into();
        assert!(err.is(codes::SERVICE_UNAVAILABLE));
        assert!(err.retryable);
        assert_eq!(err.service.as_deref(), Some("store"));
    }

    #[test]
    fn test_row_errors_are_internal() {
        let err: AppError = StoreError::Database(sqlx::Error::RowNotFound).into();
        assert!(err.is(codes::INTERNAL_ERROR));
        assert!(!err.retryable);

        let err: AppError = StoreError::Corrupt("bad cabin".into()).into();
        assert_eq!(err.http_status, 500);
    }

    #[test]
    fn test_wide_column_failures_are_unavailable() {
        let err: AppError = StoreError::wide_column("no hosts available").into();
        assert!(err.is(codes::SERVICE_UNAVAILABLE));
    }
}
