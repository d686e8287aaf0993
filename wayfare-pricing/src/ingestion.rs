use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::prices::{IngestReport, PriceService};
use wayfare_core::inventory::IngestedOffer;
use wayfare_core::offer::FlightOffer;
use wayfare_core::repository::{FlightIndexer, InventoryStore, SessionRepository};
use wayfare_core::search::FlightSearchRequest;
use wayfare_core::session::{SearchHistoryEntry, SearchSession};
use wayfare_core::supplier::FlightSupplier;
use wayfare_core::price::PriceSample;
use wayfare_shared::AppResult;

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub search_id: String,
    pub session_id: Option<Uuid>,
    pub offers: Vec<FlightOffer>,
    pub stored: usize,
    pub indexed: usize,
    pub prices: IngestReport,
}

/// Live search followed by fan-out of the results into inventory, the
/// document index and the price store.
#[derive(Clone)]
pub struct IngestionService {
    supplier: Arc<dyn FlightSupplier>,
    inventory: Arc<dyn InventoryStore>,
    indexer: Arc<dyn FlightIndexer>,
    sessions: Arc<dyn SessionRepository>,
    prices: PriceService,
}

impl IngestionService {
    pub fn new(
        supplier: Arc<dyn FlightSupplier>,
        inventory: Arc<dyn InventoryStore>,
        indexer: Arc<dyn FlightIndexer>,
        sessions: Arc<dyn SessionRepository>,
        prices: PriceService,
    ) -> Self {
        Self { supplier, inventory, indexer, sessions, prices }
    }

    pub async fn search_and_store(
        &self,
        request: &FlightSearchRequest,
        user_id: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<SearchOutcome> {
        request.validate()?;
        let search_id = request.search_id();
        let offers = self
            .supplier
            .search_offers(request)
            .await
            .map_err(|e| e.with_operation("search_offers"))?;

        let rows: Vec<IngestedOffer> = offers.iter().map(|o| IngestedOffer::derive(o, request, now)).collect();
        let inventory: Vec<_> = rows.iter().map(|r| r.inventory.clone()).collect();
        let observations: Vec<_> = rows.iter().map(|r| r.observation.clone()).collect();
        let results: Vec<_> = rows.iter().map(|r| r.search_result.clone()).collect();

        let stored = if rows.is_empty() {
            0
        } else {
            let stored = self
                .inventory
                .write_inventory(&inventory)
                .await
                .map_err(|e| e.with_operation("write_inventory"))?;
            self.inventory
                .write_observations(&observations)
                .await
                .map_err(|e| e.with_operation("write_observations"))?;
            self.inventory
                .write_search_results(&results)
                .await
                .map_err(|e| e.with_operation("write_search_results"))?;
            stored
        };

        // The index is a read model; a stale index must not fail the search.
        let indexed = match self.indexer.index_offers(&offers).await {
            Ok(summary) => summary.indexed,
            Err(e) => {
                warn!(search_id = %search_id, error = %e, "offer indexing failed");
                0
            }
        };

        let samples: Vec<PriceSample> = rows
            .into_iter()
            .map(|r| r.sample)
            .filter(|s| match s.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(search_id = %search_id, error = %e, "skipping unusable price sample");
                    false
                }
            })
            .collect();
        let prices = self.prices.ingest(&samples, now).await?;

        let session_id = self.remember(request, user_id, offers.len(), now).await;

        info!(
            search_id = %search_id,
            route = %format!("{}-{}", request.origin, request.destination),
            offers = offers.len(),
            stored,
            indexed,
            "search results stored"
        );
        Ok(SearchOutcome { search_id, session_id, offers, stored, indexed, prices })
    }

    /// Session and history rows are best effort.
    async fn remember(
        &self,
        request: &FlightSearchRequest,
        user_id: Option<String>,
        results: usize,
        now: DateTime<Utc>,
    ) -> Option<Uuid> {
        let entry = SearchHistoryEntry::record(user_id.clone(), request, results, now);
        if let Err(e) = self.sessions.record_history(&entry).await {
            warn!(error = %e, "search history write failed");
        }
        let session = match SearchSession::open(user_id, request, results, now) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "search session not opened");
                return None;
            }
        };
        match self.sessions.create_session(&session).await {
            Ok(()) => Some(session.id),
            Err(e) => {
                warn!(error = %e, "search session write failed");
                None
            }
        }
    }

    pub async fn session(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Option<SearchSession>> {
        Ok(self.sessions.get_session(id).await?.filter(|s| !s.is_expired(now)))
    }

    pub async fn cleanup_sessions(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let deleted = self.sessions.delete_expired_sessions(now).await?;
        if deleted > 0 {
            info!(deleted, "expired search sessions removed");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::tests::{at, departure};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use wayfare_core::cache::TypedCache;
    use wayfare_core::memory::{
        MemoryCache, MemoryFlightIndex, MemoryInventoryStore, MemoryPriceRepository, MemorySessionRepository,
        StaticSupplier,
    };
    use wayfare_core::offer::{
        BookingConstraints, FlightEndpoint, FlightTime, Itinerary, PriceBreakdown, Segment,
    };
    use wayfare_core::price::PriceComparisonRequest;
    use wayfare_core::repository::PriceRepository;
    use wayfare_shared::codes;

    fn offer(id: &str, total: Decimal, segments: usize) -> FlightOffer {
        let endpoint = |code: &str, local: &str| FlightEndpoint {
            iata_code: code.into(),
            terminal: None,
            at: FlightTime::parse(local).unwrap(),
        };
        let segments = (0..segments)
            .map(|i| Segment {
                id: i.to_string(),
                departure: endpoint("LHR", "2025-06-01T08:00:00"),
                arrival: endpoint("CDG", "2025-06-01T10:15:00"),
                carrier_code: "AF".into(),
                carrier_name: "AIR FRANCE".into(),
                number: format!("10{}", i),
                aircraft_code: None,
                aircraft_name: None,
                operating_carrier_code: None,
                duration_minutes: Some(75),
                number_of_stops: 0,
                blacklisted_in_eu: false,
            })
            .collect();
        FlightOffer {
            id: id.into(),
            provider: "amadeus".into(),
            source: "GDS".into(),
            search_id: String::new(),
            one_way: true,
            itineraries: vec![Itinerary { duration_minutes: Some(75), segments }],
            price: PriceBreakdown {
                currency: "EUR".into(),
                total,
                base: total,
                taxes: vec![],
                fees: vec![],
                grand_total: total,
            },
            traveler_pricings: vec![],
            validating_airline_codes: vec!["AF".into()],
            booking: BookingConstraints::default(),
        }
    }

    struct Harness {
        service: IngestionService,
        prices: PriceService,
        inventory: Arc<MemoryInventoryStore>,
        index: Arc<MemoryFlightIndex>,
        sessions: Arc<MemorySessionRepository>,
        price_repo: Arc<MemoryPriceRepository>,
    }

    fn harness(offers: Vec<FlightOffer>) -> Harness {
        let inventory = Arc::new(MemoryInventoryStore::new());
        let index = Arc::new(MemoryFlightIndex::new());
        let sessions = Arc::new(MemorySessionRepository::new());
        let price_repo = Arc::new(MemoryPriceRepository::new());
        let prices = PriceService::new(price_repo.clone(), TypedCache::new(Arc::new(MemoryCache::new())));
        let service = IngestionService::new(
            Arc::new(StaticSupplier::new(offers)),
            inventory.clone(),
            index.clone(),
            sessions.clone(),
            prices.clone(),
        );
        Harness { service, prices, inventory, index, sessions, price_repo }
    }

    #[tokio::test]
    async fn test_results_fan_out_to_every_store() {
        let h = harness(vec![offer("1", dec!(85), 1), offer("2", dec!(120), 2)]);
        let request = FlightSearchRequest::one_way("LHR", "CDG", departure());
        let now = at(10, 0, 0);

        let outcome = h.service.search_and_store(&request, Some("u1".into()), now).await.unwrap();
        assert_eq!(outcome.offers.len(), 2);
        assert_eq!(outcome.stored, 2);
        assert_eq!(outcome.indexed, 2);
        assert_eq!(outcome.prices.stored, 2);
        assert!(outcome.session_id.is_some());

        let rows = h.inventory.search_results(&request.search_id()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.origin_code == "LHR" && r.destination_code == "CDG"));
        assert_eq!(h.inventory.inventory("LHR", "CDG", departure()).await.unwrap().len(), 2);
        assert_eq!(h.index.offers().len(), 2);
        assert_eq!(h.sessions.history_len(), 1);

        let comparison = h
            .prices
            .compare(&PriceComparisonRequest::new("LHR", "CDG", departure()), now)
            .await
            .unwrap();
        assert_eq!(comparison.best.unwrap().price, dec!(85));
        assert_eq!(h.price_repo.history("LHR-CDG", departure(), departure()).await.unwrap().len(), 1);

        let session = h.service.session(outcome.session_id.unwrap(), now).await.unwrap().unwrap();
        assert_eq!(session.results_count, 2);
        assert_eq!(session.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_unindexable_offer_does_not_fail_search() {
        let h = harness(vec![offer("1", dec!(85), 1), offer("broken", dec!(90), 0)]);
        let request = FlightSearchRequest::one_way("LHR", "CDG", departure());
        let outcome = h.service.search_and_store(&request, None, at(10, 0, 0)).await.unwrap();
        assert_eq!(outcome.offers.len(), 2);
        assert_eq!(outcome.indexed, 1);
    }

    #[tokio::test]
    async fn test_empty_result_still_opens_session() {
        let h = harness(vec![]);
        let request = FlightSearchRequest::one_way("LHR", "CDG", departure());
        let outcome = h.service.search_and_store(&request, None, at(10, 0, 0)).await.unwrap();
        assert!(outcome.offers.is_empty());
        assert_eq!(outcome.stored, 0);
        assert_eq!(outcome.prices, IngestReport::default());
        assert!(outcome.session_id.is_some());
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_supplier() {
        let h = harness(vec![offer("1", dec!(85), 1)]);
        let request = FlightSearchRequest::one_way("LHR", "LHR", departure());
        let err = h.service.search_and_store(&request, None, at(10, 0, 0)).await.unwrap_err();
        assert!(err.is(codes::VALIDATION_ERROR));
        assert_eq!(h.price_repo.sample_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_session_is_hidden_and_cleaned() {
        let h = harness(vec![]);
        let request = FlightSearchRequest::one_way("LHR", "CDG", departure());
        let now = at(10, 0, 0);
        let outcome = h.service.search_and_store(&request, None, now).await.unwrap();
        let id = outcome.session_id.unwrap();
        let later = now + chrono::Duration::hours(25);
        assert!(h.service.session(id, later).await.unwrap().is_none());
        assert_eq!(h.service.cleanup_sessions(later).await.unwrap(), 1);
    }
}
