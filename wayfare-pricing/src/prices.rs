use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::alerts::AlertService;
use wayfare_core::cache::{CacheNamespace, TypedCache};
use wayfare_core::iata::split_route_id;
use wayfare_core::price::{rollup, PriceComparison, PriceComparisonRequest, PriceSample, PriceTrend};
use wayfare_core::repository::PriceRepository;
use wayfare_shared::{AppError, AppResult};

pub const MAX_TREND_DAYS: i64 = 365;

/// The window a daily history row is computed over.
pub fn rollup_window() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub stored: usize,
    pub history_rows: usize,
    pub alerts_triggered: usize,
}

/// Price comparison, ingestion, history and trends.
#[derive(Clone)]
pub struct PriceService {
    prices: Arc<dyn PriceRepository>,
    cache: TypedCache,
    alerts: Option<AlertService>,
}

impl PriceService {
    pub fn new(prices: Arc<dyn PriceRepository>, cache: TypedCache) -> Self {
        Self { prices, cache, alerts: None }
    }

    /// Route-scoped alert checks run after every ingest.
    pub fn with_alerts(mut self, alerts: AlertService) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Cheapest-first comparison. The cache holds every unexpired sample for
    /// the price fingerprint; cabin, currency and result-count filters are
    /// applied on top so one entry serves all of them.
    pub async fn compare(
        &self,
        request: &PriceComparisonRequest,
        now: DateTime<Utc>,
    ) -> AppResult<PriceComparison> {
        request.validate()?;
        let fingerprint = request.fingerprint();
        let key = CacheNamespace::PriceComparison.key(&fingerprint.cache_suffix());

        let samples = match self.cache.get_json::<Vec<PriceSample>>(&key).await {
            Some(samples) => {
                debug!(key = %key, "price comparison cache hit");
                samples
            }
            None => {
                let broad = PriceComparisonRequest {
                    cabin_class: None,
                    currency: None,
                    ..request.clone()
                };
                let samples = self
                    .prices
                    .current_prices(&broad, now)
                    .await
                    .map_err(|e| e.with_operation("compare_prices"))?;
                self.cache
                    .put_json(&key, &samples, CacheNamespace::PriceComparison.ttl())
                    .await;
                samples
            }
        };

        let mut matching: Vec<PriceSample> = samples
            .into_iter()
            .filter(|s| !s.is_expired(now) && request.matches(s))
            .collect();
        matching.sort_by(|a, b| a.price.cmp(&b.price));
        Ok(PriceComparison::from_sorted(matching).truncated(usize::from(request.max_results)))
    }

    /// Persist samples, refresh the history rows they touch, drop the
    /// comparison cache for their fingerprints and check alerts on their routes.
    pub async fn ingest(&self, samples: &[PriceSample], now: DateTime<Utc>) -> AppResult<IngestReport> {
        if samples.is_empty() {
            return Ok(IngestReport::default());
        }
        for sample in samples {
            sample.validate()?;
        }

        let stored = self
            .prices
            .insert_samples(samples)
            .await
            .map_err(|e| e.with_operation("ingest_prices"))?;

        let touched: BTreeSet<(String, NaiveDate)> =
            samples.iter().map(|s| (s.route_id(), s.departure_date)).collect();
        let history_rows = self.rollup_keys(now, Some(&touched)).await?;

        let fingerprints: BTreeSet<String> = samples.iter().map(|s| s.fingerprint().cache_suffix()).collect();
        for suffix in fingerprints {
            self.cache.invalidate(&CacheNamespace::PriceComparison.key(&suffix)).await;
        }

        let mut alerts_triggered = 0;
        if let Some(alerts) = &self.alerts {
            for group in by_route_day(samples).values() {
                alerts_triggered += alerts.check_route(group, now).await?;
            }
        }

        info!(stored, history_rows, alerts_triggered, "price samples ingested");
        Ok(IngestReport { stored, history_rows, alerts_triggered })
    }

    /// Recompute the daily rows for every (route, day) seen in the last 24 hours.
    pub async fn rollup_history(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let rows = self.rollup_keys(now, None).await?;
        info!(rows, "price history rolled up");
        Ok(rows)
    }

    async fn rollup_keys(
        &self,
        now: DateTime<Utc>,
        only: Option<&BTreeSet<(String, NaiveDate)>>,
    ) -> AppResult<usize> {
        let recent = self
            .prices
            .samples_since(now - rollup_window())
            .await
            .map_err(|e| e.with_operation("rollup_history"))?;
        let mut written = 0;
        for row in rollup(&recent) {
            if only.is_some_and(|keys| !keys.contains(&(row.route_id.clone(), row.date))) {
                continue;
            }
            if !row.is_consistent() {
                continue;
            }
            self.prices
                .upsert_history(&row)
                .await
                .map_err(|e| e.with_operation("upsert_history"))?;
            written += 1;
        }
        Ok(written)
    }

    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let deleted = self
            .prices
            .delete_expired(now)
            .await
            .map_err(|e| e.with_operation("cleanup_prices"))?;
        if deleted > 0 {
            info!(deleted, "expired price samples removed");
        }
        Ok(deleted)
    }

    /// Daily history over the last `days` days with a linear extrapolation.
    pub async fn trend(&self, route_id: &str, days: i64, today: NaiveDate) -> AppResult<PriceTrend> {
        if split_route_id(route_id).is_none() {
            return Err(AppError::validation(format!("'{}' is not a route id", route_id))
                .with_detail("route_id", route_id));
        }
        if !(1..=MAX_TREND_DAYS).contains(&days) {
            return Err(AppError::validation("days must be between 1 and 365").with_detail("days", days));
        }
        let series = self
            .prices
            .history(route_id, today - Duration::days(days), today)
            .await
            .map_err(|e| e.with_operation("price_trend"))?;
        Ok(PriceTrend::fit(route_id, series))
    }
}

/// Samples grouped by (route, departure day), the granularity alerts are
/// looked up at.
fn by_route_day(samples: &[PriceSample]) -> BTreeMap<(String, NaiveDate), Vec<&PriceSample>> {
    let mut groups: BTreeMap<(String, NaiveDate), Vec<&PriceSample>> = BTreeMap::new();
    for sample in samples {
        groups.entry((sample.route_id(), sample.departure_date)).or_default().push(sample);
    }
    groups
}
