use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use wayfare_core::alert::{CreateAlertRequest, PriceAlert, MAX_ACTIVE_ALERTS};
use wayfare_core::cache::{CacheNamespace, TypedCache};
use wayfare_core::price::PriceSample;
use wayfare_core::repository::{AlertRepository, Notifier, PriceRepository};
use wayfare_shared::{AppError, AppResult};

/// Alerts evaluated concurrently by the periodic check.
const CHECK_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub evaluated: usize,
    pub triggered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct AlertService {
    alerts: Arc<dyn AlertRepository>,
    prices: Arc<dyn PriceRepository>,
    notifier: Arc<dyn Notifier>,
    cache: TypedCache,
}

impl AlertService {
    pub fn new(
        alerts: Arc<dyn AlertRepository>,
        prices: Arc<dyn PriceRepository>,
        notifier: Arc<dyn Notifier>,
        cache: TypedCache,
    ) -> Self {
        Self { alerts, prices, notifier, cache }
    }

    fn user_key(user_id: &str) -> String {
        CacheNamespace::UserAlerts.key(user_id)
    }

    pub async fn create(
        &self,
        user_id: &str,
        request: CreateAlertRequest,
        now: DateTime<Utc>,
    ) -> AppResult<PriceAlert> {
        request.validate(now.date_naive())?;
        let alert = request.into_alert(user_id, now);
        let stored = self
            .alerts
            .create(&alert, MAX_ACTIVE_ALERTS)
            .await
            .map_err(|e| e.with_operation("create_alert"))?;
        if !stored {
            return Err(AppError::limit_exceeded(
                format!("at most {} active price alerts per user", MAX_ACTIVE_ALERTS),
                MAX_ACTIVE_ALERTS,
            ));
        }
        self.cache.invalidate(&Self::user_key(user_id)).await;
        info!(alert_id = %alert.id, route = %alert.route_id(), "price alert created");
        Ok(alert)
    }

    pub async fn list(&self, user_id: &str) -> AppResult<Vec<PriceAlert>> {
        let key = Self::user_key(user_id);
        if let Some(alerts) = self.cache.get_json::<Vec<PriceAlert>>(&key).await {
            return Ok(alerts);
        }
        let alerts = self.alerts.list_for_user(user_id).await?;
        self.cache.put_json(&key, &alerts, CacheNamespace::UserAlerts.ttl()).await;
        Ok(alerts)
    }

    pub async fn get(&self, id: Uuid, user_id: &str) -> AppResult<PriceAlert> {
        match self.alerts.get(id).await? {
            Some(alert) if alert.user_id == user_id => Ok(alert),
            _ => Err(AppError::not_found("price alert", id)),
        }
    }

    /// Alerts are never hard-deleted; removal flips them inactive.
    pub async fn deactivate(&self, id: Uuid, user_id: &str) -> AppResult<()> {
        if !self.alerts.deactivate(id, user_id).await? {
            return Err(AppError::not_found("price alert", id));
        }
        self.cache.invalidate(&Self::user_key(user_id)).await;
        info!(alert_id = %id, "price alert deactivated");
        Ok(())
    }

    /// Evaluate every eligible alert against its best current price.
    pub async fn check_all(&self, now: DateTime<Utc>) -> AppResult<CheckReport> {
        let eligible: Vec<PriceAlert> = self
            .alerts
            .active(now)
            .await
            .map_err(|e| e.with_operation("check_alerts"))?
            .into_iter()
            .filter(|a| a.is_eligible(now))
            .collect();

        let evaluations: Vec<_> = eligible.iter().map(|alert| self.evaluate(alert, now)).collect();
        let outcomes: Vec<AppResult<bool>> = stream::iter(evaluations)
            .buffer_unordered(CHECK_CONCURRENCY)
            .collect()
            .await;

        let mut report = CheckReport { evaluated: eligible.len(), ..Default::default() };
        for outcome in outcomes {
            match outcome {
                Ok(true) => report.triggered += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "alert evaluation failed");
                    report.failed += 1;
                }
            }
        }
        info!(evaluated = report.evaluated, triggered = report.triggered, failed = report.failed, "alert check finished");
        Ok(report)
    }

    async fn evaluate(&self, alert: &PriceAlert, now: DateTime<Utc>) -> AppResult<bool> {
        let best = self
            .prices
            .current_prices(&alert.comparison_request(), now)
            .await?
            .into_iter()
            .next();
        match best {
            Some(sample) if alert.is_satisfied_by(sample.price) => self.trigger(alert.id, sample.price, now).await,
            _ => Ok(false),
        }
    }

    /// Check the alerts watching one route and departure day against a batch
    /// of new samples for it. Each alert is compared with the cheapest sample
    /// it matches, so a cheaper fare in another cabin or party size cannot
    /// hide one that satisfies it. Returns how many fired.
    pub async fn check_route(&self, samples: &[&PriceSample], now: DateTime<Utc>) -> AppResult<usize> {
        let Some(first) = samples.first() else {
            return Ok(0);
        };
        let candidates = self
            .alerts
            .for_route(&first.origin, &first.destination, first.departure_date, now)
            .await
            .map_err(|e| e.with_operation("check_route_alerts"))?;
        let mut fired = 0;
        for alert in candidates {
            if !alert.is_eligible(now) {
                continue;
            }
            let request = alert.comparison_request();
            let best = samples
                .iter()
                .filter(|s| request.matches(s))
                .min_by(|a, b| a.price.cmp(&b.price));
            let Some(sample) = best else {
                continue;
            };
            if !alert.is_satisfied_by(sample.price) {
                continue;
            }
            if self.trigger(alert.id, sample.price, now).await? {
                fired += 1;
            }
        }
        Ok(fired)
    }

    /// Record the trigger, then notify. The store re-checks eligibility so a
    /// concurrent evaluation cannot fire the same alert twice.
    async fn trigger(&self, id: Uuid, price: Decimal, now: DateTime<Utc>) -> AppResult<bool> {
        let Some(alert) = self.alerts.record_trigger(id, now).await? else {
            return Ok(false);
        };
        let event = alert.triggered_event(price, now);
        info!(
            alert_id = %alert.id,
            route = %alert.route_id(),
            price = %price,
            max_price = %alert.max_price,
            trigger_count = alert.trigger_count,
            "price alert triggered"
        );
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(alert_id = %alert.id, error = %e, "alert notification failed");
        }
        self.cache.invalidate(&Self::user_key(&alert.user_id)).await;
        Ok(true)
    }

    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let flipped = self.alerts.deactivate_expired(now).await?;
        if flipped > 0 {
            info!(deactivated = flipped, "expired price alerts deactivated");
        }
        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::tests::{at, departure, sample};
    use crate::prices::PriceService;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use wayfare_core::memory::{MemoryAlertRepository, MemoryCache, MemoryPriceRepository, RecordingNotifier};
    use wayfare_core::price::TripType;
    use wayfare_core::search::CabinClass;
    use wayfare_shared::codes;

    struct Harness {
        alerts: AlertService,
        prices: PriceService,
        repo: Arc<MemoryAlertRepository>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness_with(notifier: RecordingNotifier) -> Harness {
        let repo = Arc::new(MemoryAlertRepository::new());
        let price_repo = Arc::new(MemoryPriceRepository::new());
        let notifier = Arc::new(notifier);
        let cache = TypedCache::new(Arc::new(MemoryCache::new()));
        let alerts = AlertService::new(repo.clone(), price_repo.clone(), notifier.clone(), cache.clone());
        let prices = PriceService::new(price_repo, cache).with_alerts(alerts.clone());
        Harness { alerts, prices, repo, notifier }
    }

    fn harness() -> Harness {
        harness_with(RecordingNotifier::new())
    }

    fn request(max_price: Decimal) -> CreateAlertRequest {
        CreateAlertRequest {
            origin: "LHR".into(),
            destination: "CDG".into(),
            departure_date: departure(),
            return_date: None,
            max_price,
            currency: "EUR".into(),
            trip_type: TripType::Oneway,
            passenger_count: 1,
            cabin_class: CabinClass::Economy,
            notification_email: "traveller@example.com".into(),
            expiry_days: 30,
        }
    }

    #[tokio::test]
    async fn test_suppression_window_between_triggers() {
        let h = harness();
        let alert = h.alerts.create("u1", request(dec!(90)), at(9, 0, 0)).await.unwrap();

        let first = h.prices.ingest(&[sample("a", dec!(85), at(10, 0, 0))], at(10, 0, 0)).await.unwrap();
        assert_eq!(first.alerts_triggered, 1);

        let second = h.prices.ingest(&[sample("a", dec!(80), at(11, 0, 0))], at(11, 0, 0)).await.unwrap();
        assert_eq!(second.alerts_triggered, 0);

        let third = h.prices.ingest(&[sample("b", dec!(80), at(14, 0, 1))], at(14, 0, 1)).await.unwrap();
        assert_eq!(third.alerts_triggered, 1);

        let stored = h.repo.get(alert.id).await.unwrap().unwrap();
        assert_eq!(stored.trigger_count, 2);
        assert_eq!(stored.last_triggered, Some(at(14, 0, 1)));
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].price, dec!(85));
        assert_eq!(sent[1].trigger_count, 2);
    }

    #[tokio::test]
    async fn test_price_above_threshold_does_not_fire() {
        let h = harness();
        h.alerts.create("u1", request(dec!(50)), at(9, 0, 0)).await.unwrap();
        let report = h.prices.ingest(&[sample("a", dec!(85), at(10, 0, 0))], at(10, 0, 0)).await.unwrap();
        assert_eq!(report.alerts_triggered, 0);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_other_currency_is_ignored() {
        let h = harness();
        h.alerts.create("u1", request(dec!(90)), at(9, 0, 0)).await.unwrap();
        let mut usd = sample("a", dec!(10), at(10, 0, 0));
        usd.currency = "USD".into();
        let report = h.prices.ingest(&[usd], at(10, 0, 0)).await.unwrap();
        assert_eq!(report.alerts_triggered, 0);
    }

    #[tokio::test]
    async fn test_cheaper_fare_in_other_cabin_does_not_mask_match() {
        let h = harness();
        let mut business = request(dec!(500));
        business.cabin_class = CabinClass::Business;
        let alert = h.alerts.create("u1", business, at(9, 0, 0)).await.unwrap();

        let now = at(10, 0, 0);
        let mut fare = sample("b", dec!(450), now);
        fare.cabin_class = CabinClass::Business;
        let report = h.prices.ingest(&[sample("a", dec!(85), now), fare], now).await.unwrap();

        assert_eq!(report.alerts_triggered, 1);
        assert_eq!(h.notifier.sent()[0].price, dec!(450));
        assert_eq!(h.repo.get(alert.id).await.unwrap().unwrap().trigger_count, 1);
    }

    #[tokio::test]
    async fn test_each_party_size_checked_against_its_own_fares() {
        let h = harness();
        let mut couple = request(dec!(200));
        couple.passenger_count = 2;
        h.alerts.create("u1", couple, at(9, 0, 0)).await.unwrap();
        h.alerts.create("u2", request(dec!(60)), at(9, 0, 0)).await.unwrap();

        let now = at(10, 0, 0);
        let mut pair = sample("a", dec!(180), now);
        pair.passenger_count = 2;
        let batch = [sample("a", dec!(55), now), sample("b", dec!(70), now), pair];
        let report = h.prices.ingest(&batch, now).await.unwrap();

        assert_eq!(report.alerts_triggered, 2);
        let mut prices: Vec<Decimal> = h.notifier.sent().iter().map(|e| e.price).collect();
        prices.sort();
        assert_eq!(prices, vec![dec!(55), dec!(180)]);
    }

    #[tokio::test]
    async fn test_check_all_uses_best_current_price() {
        let h = harness();
        h.alerts.create("u1", request(dec!(90)), at(9, 0, 0)).await.unwrap();
        h.alerts.create("u2", request(dec!(60)), at(9, 0, 0)).await.unwrap();
        // Straight into the store: no ingest-time check.
        let price_repo = MemoryPriceRepository::new();
        price_repo.insert_samples(&[sample("a", dec!(70), at(10, 0, 0))]).await.unwrap();
        let alerts = AlertService::new(
            h.repo.clone(),
            Arc::new(price_repo),
            h.notifier.clone(),
            TypedCache::new(Arc::new(MemoryCache::new())),
        );

        let report = alerts.check_all(at(10, 5, 0)).await.unwrap();
        assert_eq!(report, CheckReport { evaluated: 2, triggered: 1, failed: 0 });
        assert_eq!(h.notifier.sent()[0].user_id, "u1");

        let again = alerts.check_all(at(10, 10, 0)).await.unwrap();
        assert_eq!(again.evaluated, 1);
        assert_eq!(again.triggered, 0);
    }

    #[tokio::test]
    async fn test_notification_failure_still_records_trigger() {
        let h = harness_with(RecordingNotifier::failing());
        let alert = h.alerts.create("u1", request(dec!(90)), at(9, 0, 0)).await.unwrap();
        let report = h.prices.ingest(&[sample("a", dec!(85), at(10, 0, 0))], at(10, 0, 0)).await.unwrap();
        assert_eq!(report.alerts_triggered, 1);
        assert_eq!(h.repo.get(alert.id).await.unwrap().unwrap().trigger_count, 1);
    }

    #[tokio::test]
    async fn test_active_alert_limit() {
        let h = harness();
        for _ in 0..MAX_ACTIVE_ALERTS {
            h.alerts.create("u1", request(dec!(90)), at(9, 0, 0)).await.unwrap();
        }
        let err = h.alerts.create("u1", request(dec!(90)), at(9, 0, 0)).await.unwrap_err();
        assert!(err.is(codes::LIMIT_EXCEEDED));
        assert_eq!(err.http_status, 409);
        assert!(h.alerts.create("u2", request(dec!(90)), at(9, 0, 0)).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_stop_at_limit() {
        let h = harness();
        let creates: Vec<_> = (0..20)
            .map(|_| {
                let alerts = h.alerts.clone();
                tokio::spawn(async move { alerts.create("u1", request(dec!(90)), at(9, 0, 0)).await })
            })
            .collect();
        let mut stored = 0;
        for create in creates {
            match create.await.unwrap() {
                Ok(_) => stored += 1,
                Err(e) => assert!(e.is(codes::LIMIT_EXCEEDED)),
            }
        }
        assert_eq!(stored, MAX_ACTIVE_ALERTS);
        assert_eq!(h.repo.count_active_for_user("u1").await.unwrap(), MAX_ACTIVE_ALERTS);
    }

    #[tokio::test]
    async fn test_deactivate_frees_a_slot_and_refreshes_list() {
        let h = harness();
        let mut ids = Vec::new();
        for _ in 0..MAX_ACTIVE_ALERTS {
            ids.push(h.alerts.create("u1", request(dec!(90)), at(9, 0, 0)).await.unwrap().id);
        }
        assert_eq!(h.alerts.list("u1").await.unwrap().len(), MAX_ACTIVE_ALERTS);

        h.alerts.deactivate(ids[0], "u1").await.unwrap();
        let listed = h.alerts.list("u1").await.unwrap();
        assert!(listed.iter().any(|a| a.id == ids[0] && !a.is_active));
        assert!(h.alerts.create("u1", request(dec!(90)), at(9, 0, 0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_foreign_alert_is_not_found() {
        let h = harness();
        let alert = h.alerts.create("u1", request(dec!(90)), at(9, 0, 0)).await.unwrap();
        let err = h.alerts.deactivate(alert.id, "u2").await.unwrap_err();
        assert!(err.is(codes::NOT_FOUND));
        assert!(h.alerts.get(alert.id, "u2").await.is_err());
        assert_eq!(h.alerts.get(alert.id, "u1").await.unwrap().id, alert.id);
    }

    #[tokio::test]
    async fn test_invalid_request_rejected() {
        let h = harness();
        let mut bad = request(dec!(90));
        bad.departure_date = departure() - Duration::days(60);
        let err = h.alerts.create("u1", bad, at(9, 0, 0)).await.unwrap_err();
        assert!(err.is(codes::VALIDATION_ERROR));
    }

    #[tokio::test]
    async fn test_cleanup_deactivates_expired() {
        let h = harness();
        let mut short = request(dec!(90));
        short.expiry_days = 1;
        h.alerts.create("u1", short, at(9, 0, 0)).await.unwrap();
        h.alerts.create("u1", request(dec!(90)), at(9, 0, 0)).await.unwrap();
        let later = at(9, 0, 0) + Duration::days(2);
        assert_eq!(h.alerts.cleanup_expired(later).await.unwrap(), 1);
        assert_eq!(h.repo.count_active_for_user("u1").await.unwrap(), 1);
    }
}
