use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tracing::info;

use crate::app_config::RedisConfig;
use crate::error::{StoreError, StoreResult};
use crate::gate::QueryGate;
use wayfare_core::repository::CacheStore;
use wayfare_resilience::{presets, Executor};
use wayfare_shared::{AppError, AppResult};

/// Redis-backed [`CacheStore`]. One multiplexed connection is shared by all
/// clones; every command runs through the `redis` cache executor and the
/// client's query gate.
#[derive(Clone)]
pub struct RedisClient {
    conn: MultiplexedConnection,
    executor: Executor,
    gate: QueryGate,
}

/// Redis rejects zero-second expiries; round anything shorter up to one second.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl RedisClient {
    pub async fn new(config: &RedisConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis");
        Ok(Self {
            conn,
            executor: Executor::global(presets::cache("redis")),
            gate: QueryGate::new("redis", config.max_concurrent_queries),
        })
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub async fn ping(&self) -> AppResult<()> {
        self.run(|mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn run<T, F, Fut>(&self, mut op: F) -> AppResult<T>
    where
        F: FnMut(MultiplexedConnection) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let gate = &self.gate;
        self.executor
            .execute(|| {
                let attempt = op(self.conn.clone());
                async move {
                    let _permit = gate.acquire().await?;
                    attempt.await.map_err(AppError::from)
                }
            })
            .await
    }
}

#[async_trait]
impl CacheStore for RedisClient {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.run(|mut conn| async move {
            let value: Option<String> = conn.get(key).await?;
            Ok::<_, StoreError>(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let seconds = ttl_seconds(ttl);
        self.run(|mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, seconds).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.run(|mut conn| async move {
            conn.del::<_, ()>(key).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn increment(&self, key: &str) -> AppResult<i64> {
        self.run(|mut conn| async move {
            let count: i64 = conn.incr(key, 1).await?;
            Ok::<_, StoreError>(count)
        })
        .await
    }

    async fn set_expiration(&self, key: &str, ttl: Duration) -> AppResult<()> {
        let seconds = ttl_seconds(ttl) as i64;
        self.run(|mut conn| async move {
            conn.expire::<_, ()>(key, seconds).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_rounds_up_to_one_second() {
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(900)), 900);
    }
}
