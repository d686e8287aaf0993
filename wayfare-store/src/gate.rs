use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

use wayfare_shared::{AppError, AppResult};

/// In-flight queries allowed per store when no limit is configured.
pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 32;

/// Bounds the queries one store client has in flight. Clones share permits.
#[derive(Clone, Debug)]
pub struct QueryGate {
    store: &'static str,
    permits: Arc<Semaphore>,
    limit: usize,
}

impl QueryGate {
    pub fn new(store: &'static str, limit: usize) -> Self {
        let limit = limit.max(1);
        Self { store, permits: Arc::new(Semaphore::new(limit)), limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot. The permit is released when dropped.
    pub async fn acquire(&self) -> AppResult<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| AppError::unavailable(format!("{} query gate closed", self.store)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_caps_in_flight_queries() {
        let gate = QueryGate::new("postgres", 3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let queries = (0..10).map(|_| {
            let gate = gate.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let _permit = gate.acquire().await.unwrap();
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        });
        join_all(queries).await;

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(gate.available(), 3);
    }

    #[tokio::test]
    async fn test_zero_limit_still_admits_one() {
        let gate = QueryGate::new("redis", 0);
        assert_eq!(gate.limit(), 1);
        let permit = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);
        drop(permit);
        assert_eq!(gate.available(), 1);
    }
}
