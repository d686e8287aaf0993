use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::DbClient;
use crate::error::StoreError;
use wayfare_core::repository::SessionRepository;
use wayfare_core::session::{SearchHistoryEntry, SearchSession};
use wayfare_shared::AppResult;

#[derive(Debug, FromRow)]
struct SearchSessionRow {
    id: Uuid,
    user_id: Option<String>,
    search_params: serde_json::Value,
    results_count: i32,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<SearchSessionRow> for SearchSession {
    fn from(row: SearchSessionRow) -> Self {
        SearchSession {
            id: row.id,
            user_id: row.user_id,
            search_params: row.search_params,
            results_count: row.results_count,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

/// Search sessions and the per-user search log.
pub struct PgSessionRepository {
    db: DbClient,
}

impl PgSessionRepository {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create_session(&self, session: &SearchSession) -> AppResult<()> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                sqlx::query(
                    r#"
                    INSERT INTO search_sessions (id, user_id, search_params, results_count, created_at, expires_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(session.id)
                .bind(session.user_id.as_deref())
                .bind(&session.search_params)
                .bind(session.results_count)
                .bind(session.created_at)
                .bind(session.expires_at)
                .execute(pool)
                .await?;
                Ok::<_, StoreError>(())
            })
            .await
    }

    async fn get_session(&self, id: Uuid) -> AppResult<Option<SearchSession>> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let row: Option<SearchSessionRow> = sqlx::query_as(
                    "SELECT id, user_id, search_params, results_count, created_at, expires_at \
                     FROM search_sessions WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(pool)
                .await?;
                Ok::<_, StoreError>(row.map(SearchSession::from))
            })
            .await
    }

    async fn record_history(&self, entry: &SearchHistoryEntry) -> AppResult<()> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                sqlx::query(
                    r#"
                    INSERT INTO search_history (id, user_id, origin, destination, departure_date, return_date,
                        passengers, cabin_class, results_count, searched_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(entry.id)
                .bind(entry.user_id.as_deref())
                .bind(&entry.origin)
                .bind(&entry.destination)
                .bind(entry.departure_date)
                .bind(entry.return_date)
                .bind(entry.passengers)
                .bind(entry.cabin_class.as_str())
                .bind(entry.results_count)
                .bind(entry.searched_at)
                .execute(pool)
                .await?;
                Ok::<_, StoreError>(())
            })
            .await
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let pool = &self.db.pool;
        self.db
            .run(|| async move {
                let result = sqlx::query("DELETE FROM search_sessions WHERE expires_at <= $1")
                    .bind(now)
                    .execute(pool)
                    .await?;
                Ok::<_, StoreError>(result.rows_affected())
            })
            .await
    }
}
