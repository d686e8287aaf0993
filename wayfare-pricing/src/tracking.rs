use chrono::{DateTime, Duration, Utc};
use futures_util::future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use wayfare_core::cache::{CacheNamespace, TypedCache};
use wayfare_core::repository::{PriceRepository, TrackingRepository};
use wayfare_core::tracking::{CreateTrackingRequest, PriceTracking, TrackingSnapshot, MAX_ACTIVE_TRACKINGS};
use wayfare_shared::{codes, AppError, AppResult};

/// Prices gathered per tracking by the sweep.
pub const SNAPSHOT_PRICES: u16 = 10;
pub const SNAPSHOT_HISTORY_DAYS: i64 = 30;

#[derive(Clone)]
pub struct TrackingService {
    trackings: Arc<dyn TrackingRepository>,
    prices: Arc<dyn PriceRepository>,
    cache: TypedCache,
}

impl TrackingService {
    pub fn new(trackings: Arc<dyn TrackingRepository>, prices: Arc<dyn PriceRepository>, cache: TypedCache) -> Self {
        Self { trackings, prices, cache }
    }

    fn user_key(user_id: &str) -> String {
        CacheNamespace::UserTracking.key(user_id)
    }

    pub async fn create(
        &self,
        user_id: &str,
        request: CreateTrackingRequest,
        now: DateTime<Utc>,
    ) -> AppResult<PriceTracking> {
        request.validate()?;
        let route_id = request.route_id();
        if self.trackings.find_active(user_id, &route_id).await?.is_some() {
            return Err(AppError::conflict(format!("route {} is already tracked", route_id))
                .with_code(codes::DUPLICATE_TRACKING)
                .with_detail("route_id", route_id));
        }
        let tracking = request.into_tracking(user_id, now);
        // The store re-checks both rules for requests racing past the lookup above.
        let stored = self
            .trackings
            .create(&tracking, MAX_ACTIVE_TRACKINGS)
            .await
            .map_err(|e| e.with_operation("create_tracking"))?;
        if !stored {
            return Err(AppError::limit_exceeded(
                format!("at most {} tracked routes per user", MAX_ACTIVE_TRACKINGS),
                MAX_ACTIVE_TRACKINGS,
            ));
        }
        self.cache.invalidate(&Self::user_key(user_id)).await;
        info!(tracking_id = %tracking.id, route = %tracking.route_id, "price tracking started");
        Ok(tracking)
    }

    pub async fn list(&self, user_id: &str) -> AppResult<Vec<PriceTracking>> {
        let key = Self::user_key(user_id);
        if let Some(trackings) = self.cache.get_json::<Vec<PriceTracking>>(&key).await {
            return Ok(trackings);
        }
        let trackings = self.trackings.list_for_user(user_id).await?;
        self.cache.put_json(&key, &trackings, CacheNamespace::UserTracking.ttl()).await;
        Ok(trackings)
    }

    pub async fn stop(&self, id: Uuid, user_id: &str) -> AppResult<()> {
        if !self.trackings.stop(id, user_id).await? {
            return Err(AppError::not_found("price tracking", id));
        }
        self.cache.invalidate(&Self::user_key(user_id)).await;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid, user_id: &str) -> AppResult<()> {
        if !self.trackings.delete(id, user_id).await? {
            return Err(AppError::not_found("price tracking", id));
        }
        self.cache.invalidate(&Self::user_key(user_id)).await;
        Ok(())
    }

    /// Current prices and recent history for one tracking, fetched together.
    pub async fn snapshot(&self, tracking: &PriceTracking, now: DateTime<Utc>) -> AppResult<TrackingSnapshot> {
        let today = now.date_naive();
        let request = tracking.comparison_request(SNAPSHOT_PRICES);
        let (prices, history) = future::try_join(
            self.prices.current_prices(&request, now),
            self.prices
                .history(&tracking.route_id, today - Duration::days(SNAPSHOT_HISTORY_DAYS), today),
        )
        .await?;
        let mut current_prices = prices;
        current_prices.truncate(usize::from(SNAPSHOT_PRICES));
        Ok(TrackingSnapshot {
            tracking_id: tracking.id,
            route_id: tracking.route_id.clone(),
            current_prices,
            history,
        })
    }

    /// Snapshot every active tracking. A failing tracking is logged and skipped.
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<Vec<TrackingSnapshot>> {
        let active = self.trackings.active().await.map_err(|e| e.with_operation("tracking_sweep"))?;
        let mut snapshots = Vec::with_capacity(active.len());
        for tracking in &active {
            match self.snapshot(tracking, now).await {
                Ok(snapshot) => {
                    debug!(
                        tracking_id = %tracking.id,
                        prices = snapshot.current_prices.len(),
                        history_days = snapshot.history.len(),
                        "tracking snapshot taken"
                    );
                    snapshots.push(snapshot);
                }
                Err(e) => warn!(tracking_id = %tracking.id, error = %e, "tracking snapshot failed"),
            }
        }
        info!(active = active.len(), snapshots = snapshots.len(), "tracking sweep finished");
        Ok(snapshots)
    }
}
