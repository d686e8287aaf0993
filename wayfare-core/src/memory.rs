//! In-process implementations of the storage traits. Used by tests and by
//! local runs without backing services.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::airport::{rank, Airport, AirportSuggestion};
use crate::alert::PriceAlert;
use crate::analytics::{Cohort, Event, EventOrder, EventQuery, Funnel};
use crate::destination::{Destination, RouteDuration, Theme, ThemeDefinition, ThemeEntry};
use crate::inventory::{InventoryRecord, PriceObservation, SearchResultRecord};
use crate::offer::FlightOffer;
use crate::price::{PriceComparisonRequest, PriceHistory, PriceSample};
use crate::repository::*;
use crate::search::FlightSearchRequest;
use crate::session::{SearchHistoryEntry, SearchSession};
use crate::supplier::FlightSupplier;
use crate::tracking::PriceTracking;
use wayfare_shared::models::events::AlertTriggeredEvent;
use wayfare_shared::{codes, AppError, AppResult};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
    fail: std::sync::atomic::AtomicBool,
    fail_expiry: std::sync::atomic::AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, to exercise fallbacks.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Make only `set_expiration` fail.
    pub fn set_expiry_failing(&self, failing: bool) {
        self.fail_expiry.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        lock(&self.entries)
            .values()
            .filter(|(_, exp)| exp.map_or(true, |e| e > now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::unavailable("cache unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.check()?;
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some((_, Some(exp))) if *exp <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.check()?;
        lock(&self.entries).insert(key.to_string(), (value.to_string(), Some(Instant::now() + ttl)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.check()?;
        lock(&self.entries).remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str) -> AppResult<i64> {
        self.check()?;
        let mut entries = lock(&self.entries);
        let now = Instant::now();
        let entry = entries.entry(key.to_string()).or_insert_with(|| ("0".to_string(), None));
        if entry.1.map_or(false, |e| e <= now) {
            *entry = ("0".to_string(), None);
        }
        let next = entry.0.parse::<i64>().unwrap_or(0) + 1;
        entry.0 = next.to_string();
        Ok(next)
    }

    async fn set_expiration(&self, key: &str, ttl: Duration) -> AppResult<()> {
        self.check()?;
        if self.fail_expiry.load(Ordering::SeqCst) {
            return Err(AppError::unavailable("cache expiry failed"));
        }
        if let Some(entry) = lock(&self.entries).get_mut(key) {
            entry.1 = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

// ============================================================================
// Prices
// ============================================================================

#[derive(Default)]
pub struct MemoryPriceRepository {
    samples: Mutex<Vec<PriceSample>>,
    history: Mutex<BTreeMap<(String, NaiveDate), PriceHistory>>,
    queries: AtomicUsize,
}

impl MemoryPriceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `current_prices` calls served.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn sample_count(&self) -> usize {
        lock(&self.samples).len()
    }
}

#[async_trait]
impl PriceRepository for MemoryPriceRepository {
    async fn insert_samples(&self, samples: &[PriceSample]) -> AppResult<usize> {
        lock(&self.samples).extend_from_slice(samples);
        Ok(samples.len())
    }

    async fn current_prices(&self, request: &PriceComparisonRequest, now: DateTime<Utc>) -> AppResult<Vec<PriceSample>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut matching: Vec<PriceSample> = lock(&self.samples)
            .iter()
            .filter(|s| !s.is_expired(now) && request.matches(s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.price.cmp(&b.price));
        Ok(matching)
    }

    async fn samples_since(&self, since: DateTime<Utc>) -> AppResult<Vec<PriceSample>> {
        Ok(lock(&self.samples).iter().filter(|s| s.created_at >= since).cloned().collect())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut samples = lock(&self.samples);
        let before = samples.len();
        samples.retain(|s| !s.is_expired(now));
        Ok((before - samples.len()) as u64)
    }

    async fn upsert_history(&self, row: &PriceHistory) -> AppResult<()> {
        lock(&self.history).insert((row.route_id.clone(), row.date), row.clone());
        Ok(())
    }

    async fn history(&self, route_id: &str, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<PriceHistory>> {
        Ok(lock(&self.history)
            .values()
            .filter(|h| h.route_id == route_id && h.date >= from && h.date <= to)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Default)]
pub struct MemoryAlertRepository {
    alerts: Mutex<BTreeMap<Uuid, PriceAlert>>,
}

impl MemoryAlertRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertRepository for MemoryAlertRepository {
    async fn create(&self, alert: &PriceAlert, limit: usize) -> AppResult<bool> {
        let mut alerts = lock(&self.alerts);
        let active = alerts.values().filter(|a| a.user_id == alert.user_id && a.is_active).count();
        if active >= limit {
            return Ok(false);
        }
        alerts.insert(alert.id, alert.clone());
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<PriceAlert>> {
        Ok(lock(&self.alerts).get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<PriceAlert>> {
        let mut alerts: Vec<PriceAlert> = lock(&self.alerts).values().filter(|a| a.user_id == user_id).cloned().collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn count_active_for_user(&self, user_id: &str) -> AppResult<usize> {
        Ok(lock(&self.alerts).values().filter(|a| a.user_id == user_id && a.is_active).count())
    }

    async fn active(&self, now: DateTime<Utc>) -> AppResult<Vec<PriceAlert>> {
        Ok(lock(&self.alerts).values().filter(|a| a.is_active && a.expires_at > now).cloned().collect())
    }

    async fn for_route(
        &self,
        origin: &str,
        destination: &str,
        departure_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PriceAlert>> {
        Ok(lock(&self.alerts)
            .values()
            .filter(|a| {
                a.is_active
                    && a.expires_at > now
                    && a.origin == origin
                    && a.destination == destination
                    && a.departure_date == departure_date
            })
            .cloned()
            .collect())
    }

    async fn record_trigger(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Option<PriceAlert>> {
        let mut alerts = lock(&self.alerts);
        match alerts.get_mut(&id) {
            Some(alert) if alert.is_eligible(at) => {
                alert.trigger_count += 1;
                alert.last_triggered = Some(at);
                Ok(Some(alert.clone()))
            }
            Some(_) => Ok(None),
            None => Err(AppError::not_found("alert", id)),
        }
    }

    async fn deactivate(&self, id: Uuid, user_id: &str) -> AppResult<bool> {
        match lock(&self.alerts).get_mut(&id) {
            Some(alert) if alert.user_id == user_id => {
                alert.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut flipped = 0;
        for alert in lock(&self.alerts).values_mut() {
            if alert.is_active && alert.is_expired(now) {
                alert.is_active = false;
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}

// ============================================================================
// Tracking
// ============================================================================

#[derive(Default)]
pub struct MemoryTrackingRepository {
    trackings: Mutex<BTreeMap<Uuid, PriceTracking>>,
}

impl MemoryTrackingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackingRepository for MemoryTrackingRepository {
    async fn create(&self, tracking: &PriceTracking, limit: usize) -> AppResult<bool> {
        let mut trackings = lock(&self.trackings);
        if trackings
            .values()
            .any(|t| t.is_active && t.user_id == tracking.user_id && t.route_id == tracking.route_id)
        {
            return Err(AppError::conflict(format!("route {} is already tracked", tracking.route_id))
                .with_code(codes::DUPLICATE_TRACKING));
        }
        if trackings.values().filter(|t| t.is_active && t.user_id == tracking.user_id).count() >= limit {
            return Ok(false);
        }
        trackings.insert(tracking.id, tracking.clone());
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<PriceTracking>> {
        Ok(lock(&self.trackings).get(&id).cloned())
    }

    async fn find_active(&self, user_id: &str, route_id: &str) -> AppResult<Option<PriceTracking>> {
        Ok(lock(&self.trackings)
            .values()
            .find(|t| t.is_active && t.user_id == user_id && t.route_id == route_id)
            .cloned())
    }

    async fn count_active_for_user(&self, user_id: &str) -> AppResult<usize> {
        Ok(lock(&self.trackings).values().filter(|t| t.is_active && t.user_id == user_id).count())
    }

    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<PriceTracking>> {
        Ok(lock(&self.trackings).values().filter(|t| t.user_id == user_id).cloned().collect())
    }

    async fn active(&self) -> AppResult<Vec<PriceTracking>> {
        Ok(lock(&self.trackings).values().filter(|t| t.is_active).cloned().collect())
    }

    async fn stop(&self, id: Uuid, user_id: &str) -> AppResult<bool> {
        match lock(&self.trackings).get_mut(&id) {
            Some(t) if t.user_id == user_id && t.is_active => {
                t.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid, user_id: &str) -> AppResult<bool> {
        let mut trackings = lock(&self.trackings);
        match trackings.get(&id) {
            Some(t) if t.user_id == user_id => {
                trackings.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: Mutex<HashMap<Uuid, SearchSession>>,
    history: Mutex<Vec<SearchHistoryEntry>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history_len(&self) -> usize {
        lock(&self.history).len()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create_session(&self, session: &SearchSession) -> AppResult<()> {
        lock(&self.sessions).insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> AppResult<Option<SearchSession>> {
        Ok(lock(&self.sessions).get(&id).cloned())
    }

    async fn record_history(&self, entry: &SearchHistoryEntry) -> AppResult<()> {
        lock(&self.history).push(entry.clone());
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut sessions = lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }
}

// ============================================================================
// Destinations and routes
// ============================================================================

#[derive(Default)]
pub struct MemoryDestinationStore {
    destinations: Mutex<HashMap<Uuid, Destination>>,
    themes: Mutex<BTreeMap<Theme, ThemeDefinition>>,
    routes: Mutex<BTreeMap<(String, String), RouteDuration>>,
    recommendations: Mutex<HashMap<String, (String, Instant)>>,
    destination_reads: AtomicUsize,
}

impl MemoryDestinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of single-destination reads served.
    pub fn destination_reads(&self) -> usize {
        self.destination_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DestinationStore for MemoryDestinationStore {
    async fn upsert_destination(&self, destination: &Destination) -> AppResult<()> {
        destination.validate()?;
        let mut destinations = lock(&self.destinations);
        destinations.retain(|id, d| *id == destination.id || d.iata_code != destination.iata_code);
        destinations.insert(destination.id, destination.clone());
        Ok(())
    }

    async fn get_destination(&self, id: Uuid) -> AppResult<Option<Destination>> {
        self.destination_reads.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.destinations).get(&id).cloned())
    }

    async fn get_destination_by_code(&self, iata_code: &str) -> AppResult<Option<Destination>> {
        self.destination_reads.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.destinations).values().find(|d| d.iata_code == iata_code).cloned())
    }

    async fn destinations_by_theme(&self, theme: Theme, min_score: u8, limit: usize) -> AppResult<Vec<ThemeEntry>> {
        let mut entries: Vec<ThemeEntry> = lock(&self.destinations)
            .values()
            .flat_map(ThemeEntry::project)
            .filter(|e| e.theme == theme && e.theme_score >= min_score)
            .collect();
        entries.sort_by(|a, b| b.theme_score.cmp(&a.theme_score).then(a.destination_id.cmp(&b.destination_id)));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn destinations_by_country(&self, country_code: &str) -> AppResult<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = lock(&self.destinations)
            .values()
            .filter(|d| d.country_code == country_code)
            .map(|d| d.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn theme_definitions(&self) -> AppResult<Vec<ThemeDefinition>> {
        Ok(lock(&self.themes).values().cloned().collect())
    }

    async fn upsert_theme_definition(&self, definition: &ThemeDefinition) -> AppResult<()> {
        lock(&self.themes).insert(definition.theme, definition.clone());
        Ok(())
    }

    async fn routes_from_origin(&self, origin: &str) -> AppResult<Vec<RouteDuration>> {
        Ok(lock(&self.routes).values().filter(|r| r.origin == origin).cloned().collect())
    }

    async fn routes_by_duration(&self, origin: &str, min_minutes: u32, max_minutes: u32) -> AppResult<Vec<RouteDuration>> {
        let mut routes: Vec<RouteDuration> = lock(&self.routes)
            .values()
            .filter(|r| r.origin == origin && (min_minutes..=max_minutes).contains(&r.duration_minutes))
            .cloned()
            .collect();
        routes.sort_by(|a, b| a.duration_minutes.cmp(&b.duration_minutes).then(a.destination.cmp(&b.destination)));
        Ok(routes)
    }

    async fn get_cached_recommendation(&self, cache_key: &str) -> AppResult<Option<String>> {
        let recs = lock(&self.recommendations);
        Ok(recs
            .get(cache_key)
            .filter(|(_, exp)| *exp > Instant::now())
            .map(|(payload, _)| payload.clone()))
    }

    async fn put_cached_recommendation(&self, cache_key: &str, payload: &str, ttl: Duration) -> AppResult<()> {
        lock(&self.recommendations).insert(cache_key.to_string(), (payload.to_string(), Instant::now() + ttl));
        Ok(())
    }
}

#[async_trait]
impl RouteStore for MemoryDestinationStore {
    async fn upsert_routes(&self, routes: &[RouteDuration]) -> AppResult<usize> {
        let mut stored = lock(&self.routes);
        for r in routes {
            stored.insert((r.origin.clone(), r.destination.clone()), r.clone());
        }
        Ok(routes.len())
    }
}

// ============================================================================
// Inventory
// ============================================================================

#[derive(Default)]
pub struct MemoryInventoryStore {
    inventory: Mutex<Vec<InventoryRecord>>,
    observations: Mutex<Vec<PriceObservation>>,
    results: Mutex<Vec<SearchResultRecord>>,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn write_inventory(&self, rows: &[InventoryRecord]) -> AppResult<usize> {
        lock(&self.inventory).extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn write_observations(&self, rows: &[PriceObservation]) -> AppResult<usize> {
        lock(&self.observations).extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn write_search_results(&self, rows: &[SearchResultRecord]) -> AppResult<usize> {
        lock(&self.results).extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn inventory(&self, origin: &str, destination: &str, departure_date: NaiveDate) -> AppResult<Vec<InventoryRecord>> {
        Ok(lock(&self.inventory)
            .iter()
            .filter(|r| r.origin == origin && r.destination == destination && r.departure_date == departure_date)
            .cloned()
            .collect())
    }

    async fn observations(&self, route: &str, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<PriceObservation>> {
        Ok(lock(&self.observations)
            .iter()
            .filter(|o| o.route == route && o.price_date >= from && o.price_date <= to)
            .cloned()
            .collect())
    }

    async fn search_results(&self, search_request_id: &str) -> AppResult<Vec<SearchResultRecord>> {
        let mut rows: Vec<SearchResultRecord> = lock(&self.results)
            .iter()
            .filter(|r| r.search_request_id == search_request_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.search_timestamp.cmp(&a.search_timestamp));
        Ok(rows)
    }
}

// ============================================================================
// Document indexes
// ============================================================================

#[derive(Default)]
pub struct MemoryFlightIndex {
    offers: Mutex<Vec<FlightOffer>>,
}

impl MemoryFlightIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offers(&self) -> Vec<FlightOffer> {
        lock(&self.offers).clone()
    }
}

#[async_trait]
impl FlightIndexer for MemoryFlightIndex {
    async fn index_offers(&self, offers: &[FlightOffer]) -> AppResult<BulkSummary> {
        let mut summary = BulkSummary::default();
        let mut stored = lock(&self.offers);
        for offer in offers {
            match offer.validate() {
                Ok(()) => {
                    stored.push(offer.clone());
                    summary.indexed += 1;
                }
                Err(e) => {
                    summary.failed += 1;
                    summary.errors.push(BulkItemError { id: offer.id.clone(), reason: e.to_string() });
                }
            }
        }
        Ok(summary)
    }
}

#[derive(Default)]
pub struct MemoryAirportDirectory {
    airports: Mutex<BTreeMap<String, Airport>>,
}

impl MemoryAirportDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AirportDirectory for MemoryAirportDirectory {
    async fn index_airports(&self, airports: &[Airport]) -> AppResult<BulkSummary> {
        let mut stored = lock(&self.airports);
        for a in airports {
            stored.insert(a.code.clone(), a.clone());
        }
        Ok(BulkSummary { indexed: airports.len(), ..Default::default() })
    }

    async fn suggest(&self, query: &str, limit: usize) -> AppResult<Vec<AirportSuggestion>> {
        let airports: Vec<Airport> = lock(&self.airports).values().cloned().collect();
        Ok(rank(query, &airports, limit))
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Records every event it is asked to deliver.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<AlertTriggeredEvent>>,
    fail: std::sync::atomic::AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let n = Self::default();
        n.fail.store(true, Ordering::SeqCst);
        n
    }

    pub fn sent(&self) -> Vec<AlertTriggeredEvent> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &AlertTriggeredEvent) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::unavailable("notification channel down"));
        }
        lock(&self.sent).push(event.clone());
        Ok(())
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Default)]
pub struct MemoryEventStore {
    events: Mutex<Vec<Event>>,
    cohorts: Mutex<HashMap<Uuid, Cohort>>,
    funnels: Mutex<HashMap<Uuid, Funnel>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: &Event) -> AppResult<()> {
        lock(&self.events).push(event.clone());
        Ok(())
    }

    async fn query_events(&self, query: &EventQuery) -> AppResult<Vec<Event>> {
        let mut events: Vec<Event> = lock(&self.events).iter().filter(|e| query.matches(e)).cloned().collect();
        match query.order_by {
            EventOrder::TimestampAsc => events.sort_by_key(|e| e.timestamp),
            EventOrder::TimestampDesc => events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        }
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn get_cohort(&self, id: Uuid) -> AppResult<Option<Cohort>> {
        Ok(lock(&self.cohorts).get(&id).cloned())
    }

    async fn create_cohort(&self, cohort: &Cohort) -> AppResult<()> {
        cohort.validate()?;
        lock(&self.cohorts).insert(cohort.id, cohort.clone());
        Ok(())
    }

    async fn mark_cohort_analyzed(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        if let Some(cohort) = lock(&self.cohorts).get_mut(&id) {
            cohort.first_analyzed_at.get_or_insert(at);
        }
        Ok(())
    }

    async fn get_funnel(&self, id: Uuid) -> AppResult<Option<Funnel>> {
        Ok(lock(&self.funnels).get(&id).cloned())
    }

    async fn create_funnel(&self, funnel: &Funnel) -> AppResult<()> {
        funnel.validate()?;
        lock(&self.funnels).insert(funnel.id, funnel.clone());
        Ok(())
    }
}

// ============================================================================
// Supplier
// ============================================================================

/// Serves canned offers and locations; counts calls.
#[derive(Default)]
pub struct StaticSupplier {
    offers: Mutex<Vec<FlightOffer>>,
    locations: Mutex<Vec<Airport>>,
    calls: AtomicUsize,
}

impl StaticSupplier {
    pub fn new(offers: Vec<FlightOffer>) -> Self {
        Self { offers: Mutex::new(offers), ..Default::default() }
    }

    pub fn with_locations(self, locations: Vec<Airport>) -> Self {
        *lock(&self.locations) = locations;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlightSupplier for StaticSupplier {
    fn provider(&self) -> &str {
        "static"
    }

    async fn search_offers(&self, request: &FlightSearchRequest) -> AppResult<Vec<FlightOffer>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let search_id = request.search_id();
        Ok(lock(&self.offers)
            .iter()
            .take(request.max_results as usize)
            .cloned()
            .map(|mut o| {
                o.search_id = search_id.clone();
                o
            })
            .collect())
    }

    async fn suggest_locations(&self, keyword: &str, limit: usize) -> AppResult<Vec<Airport>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(rank(keyword, &lock(&self.locations), limit).into_iter().map(|s| s.airport).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::tests::request;
    use chrono::{Duration as ChronoDuration, TimeZone};

    #[tokio::test]
    async fn test_record_trigger_respects_window() {
        let repo = MemoryAlertRepository::new();
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap();
        let alert = request().into_alert("u1", now);
        assert!(repo.create(&alert, 5).await.unwrap());

        let first = repo.record_trigger(alert.id, now).await.unwrap().unwrap();
        assert_eq!(first.trigger_count, 1);
        assert!(repo.record_trigger(alert.id, now + ChronoDuration::hours(1)).await.unwrap().is_none());
        let again = repo
            .record_trigger(alert.id, now + ChronoDuration::hours(4) + ChronoDuration::seconds(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.trigger_count, 2);
    }

    #[tokio::test]
    async fn test_tracking_uniqueness() {
        let repo = MemoryTrackingRepository::new();
        let t = PriceTracking {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            route_id: "LHR-CDG".into(),
            origin: "LHR".into(),
            destination: "CDG".into(),
            departure_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            return_date: None,
            trip_type: Default::default(),
            passenger_count: 1,
            cabin_class: Default::default(),
            is_active: true,
            created_at: Utc::now(),
        };
        assert!(repo.create(&t, 10).await.unwrap());
        let dup = PriceTracking { id: Uuid::new_v4(), ..t.clone() };
        let err = repo.create(&dup, 10).await.unwrap_err();
        assert!(err.is(codes::DUPLICATE_TRACKING));

        assert!(repo.stop(t.id, "u1").await.unwrap());
        assert!(repo.create(&dup, 10).await.unwrap());

        let other = PriceTracking { id: Uuid::new_v4(), route_id: "LHR-AMS".into(), ..t.clone() };
        assert!(!repo.create(&other, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_alert_limit_checked_on_insert() {
        let repo = MemoryAlertRepository::new();
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap();
        for _ in 0..2 {
            assert!(repo.create(&request().into_alert("u1", now), 2).await.unwrap());
        }
        assert!(!repo.create(&request().into_alert("u1", now), 2).await.unwrap());
        assert!(repo.create(&request().into_alert("u2", now), 2).await.unwrap());
        assert_eq!(repo.count_active_for_user("u1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cache_increment_and_expiry() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment("c").await.unwrap(), 1);
        assert_eq!(cache.increment("c").await.unwrap(), 2);
        cache.set("k", "v", Duration::from_millis(0)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.set_failing(true);
        assert!(cache.get("c").await.is_err());
    }
}
