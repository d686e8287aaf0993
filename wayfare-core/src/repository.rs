use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::airport::{Airport, AirportSuggestion};
use crate::alert::PriceAlert;
use crate::analytics::{Cohort, Event, EventQuery, Funnel};
use crate::destination::{Destination, RouteDuration, Theme, ThemeDefinition, ThemeEntry};
use crate::inventory::{InventoryRecord, PriceObservation, SearchResultRecord};
use crate::offer::FlightOffer;
use crate::price::{PriceComparisonRequest, PriceHistory, PriceSample};
use crate::session::{SearchHistoryEntry, SearchSession};
use crate::tracking::PriceTracking;
use wayfare_shared::models::events::AlertTriggeredEvent;
use wayfare_shared::AppResult;

/// Key/value cache with per-entry expiry. A missing key is `Ok(None)`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Atomically add one and return the new count.
    async fn increment(&self, key: &str) -> AppResult<i64>;

    async fn set_expiration(&self, key: &str, ttl: Duration) -> AppResult<()>;
}

/// Price samples and their daily rollups.
#[async_trait]
pub trait PriceRepository: Send + Sync {
    async fn insert_samples(&self, samples: &[PriceSample]) -> AppResult<usize>;

    /// Unexpired samples answering `request`, cheapest first. Not truncated.
    async fn current_prices(
        &self,
        request: &PriceComparisonRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PriceSample>>;

    async fn samples_since(&self, since: DateTime<Utc>) -> AppResult<Vec<PriceSample>>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;

    /// Insert or replace the row for (route_id, date).
    async fn upsert_history(&self, row: &PriceHistory) -> AppResult<()>;

    async fn history(&self, route_id: &str, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<PriceHistory>>;
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Store the alert unless its owner already has `limit` active ones.
    /// Counting and inserting happen atomically. Returns whether it was stored.
    async fn create(&self, alert: &PriceAlert, limit: usize) -> AppResult<bool>;

    async fn get(&self, id: Uuid) -> AppResult<Option<PriceAlert>>;

    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<PriceAlert>>;

    async fn count_active_for_user(&self, user_id: &str) -> AppResult<usize>;

    /// Active and unexpired alerts.
    async fn active(&self, now: DateTime<Utc>) -> AppResult<Vec<PriceAlert>>;

    /// Active, unexpired alerts on a route and departure day.
    async fn for_route(
        &self,
        origin: &str,
        destination: &str,
        departure_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PriceAlert>>;

    /// Increment `trigger_count` and stamp `last_triggered = at` in one step,
    /// only when the alert is outside the suppression window at `at`.
    /// Returns the updated alert, or `None` when suppressed.
    async fn record_trigger(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Option<PriceAlert>>;

    async fn deactivate(&self, id: Uuid, user_id: &str) -> AppResult<bool>;

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

#[async_trait]
pub trait TrackingRepository: Send + Sync {
    /// Store the tracking unless its owner already has `limit` active ones;
    /// returns whether it was stored. Fails with a conflict when the user
    /// already has an active tracking on the route.
    async fn create(&self, tracking: &PriceTracking, limit: usize) -> AppResult<bool>;

    async fn get(&self, id: Uuid) -> AppResult<Option<PriceTracking>>;

    async fn find_active(&self, user_id: &str, route_id: &str) -> AppResult<Option<PriceTracking>>;

    async fn count_active_for_user(&self, user_id: &str) -> AppResult<usize>;

    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<PriceTracking>>;

    async fn active(&self) -> AppResult<Vec<PriceTracking>>;

    async fn stop(&self, id: Uuid, user_id: &str) -> AppResult<bool>;

    async fn delete(&self, id: Uuid, user_id: &str) -> AppResult<bool>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, session: &SearchSession) -> AppResult<()>;

    async fn get_session(&self, id: Uuid) -> AppResult<Option<SearchSession>>;

    async fn record_history(&self, entry: &SearchHistoryEntry) -> AppResult<()>;

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// Destinations, their theme/country projections, and route durations.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Writes the record and every projection together.
    async fn upsert_destination(&self, destination: &Destination) -> AppResult<()>;

    async fn get_destination(&self, id: Uuid) -> AppResult<Option<Destination>>;

    async fn get_destination_by_code(&self, iata_code: &str) -> AppResult<Option<Destination>>;

    /// Entries with `theme_score >= min_score`, highest score first.
    async fn destinations_by_theme(&self, theme: Theme, min_score: u8, limit: usize) -> AppResult<Vec<ThemeEntry>>;

    async fn destinations_by_country(&self, country_code: &str) -> AppResult<Vec<Uuid>>;

    async fn theme_definitions(&self) -> AppResult<Vec<ThemeDefinition>>;

    async fn upsert_theme_definition(&self, definition: &ThemeDefinition) -> AppResult<()>;

    /// Every route from `origin`, ordered by destination code.
    async fn routes_from_origin(&self, origin: &str) -> AppResult<Vec<RouteDuration>>;

    /// Routes whose duration lies within `[min_minutes, max_minutes]`, shortest first.
    async fn routes_by_duration(
        &self,
        origin: &str,
        min_minutes: u32,
        max_minutes: u32,
    ) -> AppResult<Vec<RouteDuration>>;

    async fn get_cached_recommendation(&self, cache_key: &str) -> AppResult<Option<String>>;

    async fn put_cached_recommendation(&self, cache_key: &str, payload: &str, ttl: Duration) -> AppResult<()>;
}

/// Writers of route durations (the seeder feeds every store that holds them).
#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn upsert_routes(&self, routes: &[RouteDuration]) -> AppResult<usize>;
}

/// High-volume inventory tables fed by vendor ingestion.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn write_inventory(&self, rows: &[InventoryRecord]) -> AppResult<usize>;

    async fn write_observations(&self, rows: &[PriceObservation]) -> AppResult<usize>;

    async fn write_search_results(&self, rows: &[SearchResultRecord]) -> AppResult<usize>;

    async fn inventory(&self, origin: &str, destination: &str, departure_date: NaiveDate) -> AppResult<Vec<InventoryRecord>>;

    async fn observations(&self, route: &str, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<PriceObservation>>;

    async fn search_results(&self, search_request_id: &str) -> AppResult<Vec<SearchResultRecord>>;
}

/// Per-item failure inside a bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemError {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub indexed: usize,
    pub failed: usize,
    pub errors: Vec<BulkItemError>,
}

impl BulkSummary {
    pub fn merge(&mut self, other: BulkSummary) {
        self.indexed += other.indexed;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Document index for flight offers.
#[async_trait]
pub trait FlightIndexer: Send + Sync {
    async fn index_offers(&self, offers: &[FlightOffer]) -> AppResult<BulkSummary>;
}

/// Airport index with autocomplete.
#[async_trait]
pub trait AirportDirectory: Send + Sync {
    async fn index_airports(&self, airports: &[Airport]) -> AppResult<BulkSummary>;

    /// At most `limit` suggestions, best first.
    async fn suggest(&self, query: &str, limit: usize) -> AppResult<Vec<AirportSuggestion>>;
}

/// Delivery of alert notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &AlertTriggeredEvent) -> AppResult<()>;
}

/// Query interface over the analytics event store.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: &Event) -> AppResult<()>;

    async fn query_events(&self, query: &EventQuery) -> AppResult<Vec<Event>>;

    async fn get_cohort(&self, id: Uuid) -> AppResult<Option<Cohort>>;

    async fn create_cohort(&self, cohort: &Cohort) -> AppResult<()>;

    /// Stamp the first analysis time once; later calls keep the original stamp.
    async fn mark_cohort_analyzed(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()>;

    async fn get_funnel(&self, id: Uuid) -> AppResult<Option<Funnel>>;

    async fn create_funnel(&self, funnel: &Funnel) -> AppResult<()>;
}
