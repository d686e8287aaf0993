use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::requests::{
    CountryStats, ExploreRequest, ExploreResult, Recommendation, SimilarDestination, ThemeRecommendations,
    ThemeRequest,
};
use crate::scoring::{estimate_price, exploration_score, similarity, PriceEstimate, SIMILARITY_THRESHOLD};
use wayfare_core::cache::CacheNamespace;
use wayfare_core::destination::{Destination, RouteDuration, ThemeDefinition};
use wayfare_core::iata::is_airport_code;
use wayfare_core::repository::DestinationStore;
use wayfare_shared::{AppError, AppResult};

pub const DEFAULT_SIMILAR_LIMIT: usize = 10;

/// Destination recommendations over the wide-column projections.
#[derive(Clone)]
pub struct DiscoveryService {
    store: Arc<dyn DestinationStore>,
}

impl DiscoveryService {
    pub fn new(store: Arc<dyn DestinationStore>) -> Self {
        Self { store }
    }

    /// Stored theme metadata, or the built-in set when none has been seeded.
    pub async fn themes(&self) -> AppResult<Vec<ThemeDefinition>> {
        let stored = self.store.theme_definitions().await?;
        if stored.is_empty() {
            return Ok(ThemeDefinition::builtin());
        }
        Ok(stored)
    }

    pub async fn recommend_by_theme(
        &self,
        request: &ThemeRequest,
        now: DateTime<Utc>,
    ) -> AppResult<ThemeRecommendations> {
        request.validate()?;
        let key = request.cache_key(now);
        match self.store.get_cached_recommendation(&key).await {
            Ok(Some(payload)) => match serde_json::from_str::<ThemeRecommendations>(&payload) {
                Ok(cached) => {
                    debug!(key = %key, "recommendation cache hit");
                    return Ok(cached);
                }
                Err(e) => warn!(key = %key, error = %e, "discarding undecodable recommendation"),
            },
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "recommendation cache read failed"),
        }

        let result = self.compute_theme(request, now).await?;

        match serde_json::to_string(&result) {
            Ok(payload) => {
                if let Err(e) = self
                    .store
                    .put_cached_recommendation(&key, &payload, CacheNamespace::Recommendations.ttl())
                    .await
                {
                    warn!(key = %key, error = %e, "recommendation cache write failed");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "recommendation not cacheable"),
        }
        Ok(result)
    }

    async fn compute_theme(&self, request: &ThemeRequest, now: DateTime<Utc>) -> AppResult<ThemeRecommendations> {
        // Over-fetch so filtering still leaves `limit` candidates in the common case.
        let entries = self
            .store
            .destinations_by_theme(request.theme, request.min_score, request.limit * 2)
            .await
            .map_err(|e| e.with_operation("destinations_by_theme"))?;

        let routes: HashMap<String, RouteDuration> = match &request.origin {
            Some(origin) => self
                .store
                .routes_from_origin(origin)
                .await?
                .into_iter()
                .map(|r| (r.destination.clone(), r))
                .collect(),
            None => HashMap::new(),
        };

        let survivors: Vec<_> = entries
            .into_iter()
            .filter(|e| {
                let hours = routes
                    .get(&e.iata_code)
                    .map(RouteDuration::duration_hours)
                    .unwrap_or(e.average_flight_time);
                request.admits(&e.country_code, hours, e.price_range)
            })
            .take(request.limit)
            .collect();

        let destinations = try_join_all(survivors.iter().map(|e| self.store.get_destination(e.destination_id))).await?;

        let mut recommendations = Vec::with_capacity(survivors.len());
        for (entry, destination) in survivors.iter().zip(destinations) {
            // Projections are eventually consistent with the source table.
            let Some(destination) = destination else {
                warn!(destination_id = %entry.destination_id, "theme projection points at a missing destination");
                continue;
            };
            let route = routes.get(&destination.iata_code);
            let hours = route.map(RouteDuration::duration_hours).unwrap_or(destination.average_flight_time);
            recommendations.push(Recommendation {
                theme_score: entry.theme_score,
                flight_minutes: route.map(|r| r.duration_minutes),
                estimated_price: estimate_price(&destination, hours),
                destination,
            });
        }

        let countries = country_stats(&recommendations);
        info!(
            theme = %request.theme,
            results = recommendations.len(),
            countries = countries.len(),
            "theme recommendations computed"
        );
        Ok(ThemeRecommendations {
            theme: request.theme,
            recommendations,
            countries,
            generated_at: now,
        })
    }

    /// Routes from the origin whose duration falls inside the requested window,
    /// shortest first.
    pub async fn candidates(&self, request: &ExploreRequest) -> AppResult<Vec<RouteDuration>> {
        request.validate()?;
        let (min_minutes, max_minutes) = request.minute_bounds();
        let mut routes = self
            .store
            .routes_by_duration(&request.origin, min_minutes, max_minutes)
            .await
            .map_err(|e| e.with_operation("routes_by_duration"))?;
        routes.sort_by(|a, b| a.duration_minutes.cmp(&b.duration_minutes).then_with(|| a.destination.cmp(&b.destination)));
        let mut seen = HashSet::new();
        routes.retain(|r| seen.insert(r.destination.clone()));
        Ok(routes)
    }

    pub async fn explore(&self, request: &ExploreRequest) -> AppResult<Vec<ExploreResult>> {
        let routes = self.candidates(request).await?;
        let destinations =
            try_join_all(routes.iter().map(|r| self.store.get_destination_by_code(&r.destination))).await?;

        let criteria = request.criteria();
        let mut results: Vec<ExploreResult> = routes
            .into_iter()
            .zip(destinations)
            .filter_map(|(route, destination)| {
                let destination = destination?;
                let match_score = exploration_score(
                    &destination,
                    &criteria,
                    route.duration_hours(),
                    request.min_flight_duration_hours,
                    request.max_flight_duration_hours,
                );
                Some(ExploreResult { destination, route, match_score })
            })
            .collect();

        results.sort_by(|a, b| {
            b.match_score
                .total_cmp(&a.match_score)
                .then(a.route.duration_minutes.cmp(&b.route.duration_minutes))
        });
        results.truncate(request.max_results);
        Ok(results)
    }

    async fn destination_by_code(&self, code: &str) -> AppResult<Destination> {
        if !is_airport_code(code) {
            return Err(AppError::validation("destination must be a 3-letter airport code").with_detail("code", code));
        }
        self.store
            .get_destination_by_code(code)
            .await?
            .ok_or_else(|| AppError::not_found("destination", code))
    }

    /// Destinations reachable from `origin` that resemble `code`, most similar first.
    pub async fn similar(&self, code: &str, origin: &str, limit: usize) -> AppResult<Vec<SimilarDestination>> {
        if !is_airport_code(origin) {
            return Err(AppError::validation("origin must be a 3-letter airport code").with_detail("origin", origin));
        }
        let target = self.destination_by_code(code).await?;
        let routes: Vec<RouteDuration> = self
            .store
            .routes_from_origin(origin)
            .await?
            .into_iter()
            .filter(|r| r.destination != target.iata_code)
            .collect();
        let candidates =
            try_join_all(routes.iter().map(|r| self.store.get_destination_by_code(&r.destination))).await?;

        let mut similar: Vec<SimilarDestination> = candidates
            .into_iter()
            .flatten()
            .map(|candidate| SimilarDestination { similarity: similarity(&target, &candidate), destination: candidate })
            .filter(|s| s.similarity >= SIMILARITY_THRESHOLD)
            .collect();
        similar.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        similar.truncate(limit);
        Ok(similar)
    }

    /// Flight time comes from the route table when the origin is known,
    /// otherwise from the destination's average.
    pub async fn estimate(&self, code: &str, origin: Option<&str>) -> AppResult<PriceEstimate> {
        let destination = self.destination_by_code(code).await?;
        let route_hours = match origin {
            Some(origin) => self
                .store
                .routes_from_origin(origin)
                .await?
                .into_iter()
                .find(|r| r.destination == destination.iata_code)
                .map(|r| r.duration_hours()),
            None => None,
        };
        Ok(estimate_price(&destination, route_hours.unwrap_or(destination.average_flight_time)))
    }
}

fn country_stats(recommendations: &[Recommendation]) -> Vec<CountryStats> {
    let mut grouped: BTreeMap<&str, Vec<&Recommendation>> = BTreeMap::new();
    for r in recommendations {
        grouped.entry(r.destination.country_code.as_str()).or_default().push(r);
    }
    let mut stats: Vec<CountryStats> = grouped
        .into_iter()
        .map(|(code, members)| {
            let total: f64 = members.iter().map(|r| r.theme_score as f64).sum();
            let average = total / members.len() as f64;
            CountryStats {
                country_code: code.to_string(),
                country: members[0].destination.country.clone(),
                destinations: members.len(),
                average_theme_score: (average * 10.0).round() / 10.0,
                best_theme_score: members.iter().map(|r| r.theme_score).max().unwrap_or(0),
            }
        })
        .collect();
    stats.sort_by(|a, b| b.destinations.cmp(&a.destinations).then(a.country_code.cmp(&b.country_code)));
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::tests::destination;
    use chrono::TimeZone;
    use wayfare_core::destination::{PriceRange, Theme};
    use wayfare_core::memory::MemoryDestinationStore;
    use wayfare_core::repository::RouteStore;
    use wayfare_shared::codes;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap()
    }

    fn route(origin: &str, destination: &str, minutes: u32) -> RouteDuration {
        RouteDuration {
            origin: origin.into(),
            destination: destination.into(),
            duration_minutes: minutes,
            distance_km: minutes as f64 * 10.0,
            is_direct: true,
            typical_stops: 0,
        }
    }

    async fn beach_store() -> Arc<MemoryDestinationStore> {
        let store = Arc::new(MemoryDestinationStore::new());
        let mut a = destination("AAA", "ES", &[(Theme::Beach, 90)]);
        a.popularity_score = 80;
        a.average_flight_time = 3.0;
        let mut b = destination("BBB", "PT", &[(Theme::Beach, 85)]);
        b.popularity_score = 90;
        b.average_flight_time = 2.0;
        store.upsert_destination(&a).await.unwrap();
        store.upsert_destination(&b).await.unwrap();
        store
    }

    fn codes_of(result: &ThemeRecommendations) -> Vec<&str> {
        result.recommendations.iter().map(|r| r.destination.iata_code.as_str()).collect()
    }

    #[tokio::test]
    async fn test_theme_ordering_and_flight_time_filter() {
        let service = DiscoveryService::new(beach_store().await);
        let mut request = ThemeRequest::new(Theme::Beach);
        request.limit = 10;
        request.max_flight_time = Some(4.0);
        let result = service.recommend_by_theme(&request, now()).await.unwrap();
        assert_eq!(codes_of(&result), vec!["AAA", "BBB"]);
        assert_eq!(result.countries.len(), 2);

        request.max_flight_time = Some(2.5);
        let result = service.recommend_by_theme(&request, now()).await.unwrap();
        assert_eq!(codes_of(&result), vec!["BBB"]);
    }

    #[tokio::test]
    async fn test_min_score_bounds() {
        let service = DiscoveryService::new(beach_store().await);
        let mut request = ThemeRequest::new(Theme::Beach);
        request.min_score = 0;
        assert_eq!(service.recommend_by_theme(&request, now()).await.unwrap().recommendations.len(), 2);
        request.min_score = 101;
        assert!(service.recommend_by_theme(&request, now()).await.unwrap().recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_recommendations_are_cached_for_the_hour() {
        let store = beach_store().await;
        let service = DiscoveryService::new(store.clone());
        let request = ThemeRequest::new(Theme::Beach);
        service.recommend_by_theme(&request, now()).await.unwrap();
        let reads = store.destination_reads();
        let cached = service.recommend_by_theme(&request, now()).await.unwrap();
        assert_eq!(store.destination_reads(), reads);
        assert_eq!(cached.recommendations.len(), 2);
    }

    #[tokio::test]
    async fn test_price_range_and_country_filters() {
        let store = beach_store().await;
        let mut lux = destination("CCC", "GR", &[(Theme::Beach, 95)]);
        lux.price_range = PriceRange::Luxury;
        store.upsert_destination(&lux).await.unwrap();
        let service = DiscoveryService::new(store);

        let mut request = ThemeRequest::new(Theme::Beach);
        request.price_range = Some(PriceRange::MidRange);
        request.exclude_countries = vec!["ES".into()];
        let result = service.recommend_by_theme(&request, now()).await.unwrap();
        assert_eq!(codes_of(&result), vec!["BBB"]);
        assert_eq!(result.countries[0].country_code, "PT");
        assert_eq!(result.countries[0].best_theme_score, 85);
    }

    #[tokio::test]
    async fn test_origin_route_overrides_average_flight_time() {
        let store = beach_store().await;
        store.upsert_routes(&[route("LHR", "AAA", 140)]).await.unwrap();
        let service = DiscoveryService::new(store);
        let mut request = ThemeRequest::new(Theme::Beach);
        request.origin = Some("LHR".into());
        request.max_flight_time = Some(2.5);
        let result = service.recommend_by_theme(&request, now()).await.unwrap();
        assert_eq!(codes_of(&result), vec!["AAA", "BBB"]);
        assert_eq!(result.recommendations[0].flight_minutes, Some(140));
        assert_eq!(result.recommendations[1].flight_minutes, None);
    }

    async fn route_store() -> Arc<MemoryDestinationStore> {
        let store = Arc::new(MemoryDestinationStore::new());
        for (code, popularity) in [("CDG", 90), ("AMS", 85), ("MAD", 80), ("ATH", 75)] {
            let mut d = destination(code, "EU", &[]);
            d.popularity_score = popularity;
            store.upsert_destination(&d).await.unwrap();
        }
        store
            .upsert_routes(&[route("LHR", "CDG", 85), route("LHR", "AMS", 90), route("LHR", "MAD", 150), route("LHR", "ATH", 220)])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_duration_window_candidates() {
        let service = DiscoveryService::new(route_store().await);
        let request = ExploreRequest::new("LHR", 1.0, 3.0);
        let candidates = service.candidates(&request).await.unwrap();
        let codes: Vec<&str> = candidates.iter().map(|r| r.destination.as_str()).collect();
        assert_eq!(codes, vec!["CDG", "AMS", "MAD"]);
    }

    #[tokio::test]
    async fn test_explore_scores_and_truncates() {
        let service = DiscoveryService::new(route_store().await);
        let mut request = ExploreRequest::new("LHR", 1.0, 3.0);
        request.max_results = 2;
        let results = service.explore(&request).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].destination.iata_code, "CDG");
        assert!(results[0].match_score >= results[1].match_score);
        assert!(results.iter().all(|r| (0.0..=100.0).contains(&r.match_score)));
    }

    #[tokio::test]
    async fn test_explore_rejects_bad_window() {
        let service = DiscoveryService::new(route_store().await);
        let err = service.explore(&ExploreRequest::new("LHR", 3.0, 1.0)).await.unwrap_err();
        assert!(err.is(codes::VALIDATION_ERROR));
    }

    #[tokio::test]
    async fn test_similar_skips_target_and_threshold() {
        let store = route_store().await;
        let mut odd = destination("OSL", "NO", &[]);
        odd.price_range = PriceRange::Luxury;
        odd.climate_type = Some("continental".into());
        odd.popularity_score = 10;
        store.upsert_destination(&odd).await.unwrap();
        store.upsert_routes(&[route("LHR", "OSL", 130)]).await.unwrap();
        let service = DiscoveryService::new(store);

        let similar = service.similar("CDG", "LHR", DEFAULT_SIMILAR_LIMIT).await.unwrap();
        let codes: Vec<&str> = similar.iter().map(|s| s.destination.iata_code.as_str()).collect();
        assert_eq!(codes, vec!["AMS", "MAD", "ATH"]);
        assert!(similar.iter().all(|s| s.similarity >= SIMILARITY_THRESHOLD));

        let err = service.similar("ZZZ", "LHR", 5).await.unwrap_err();
        assert!(err.is(codes::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_estimate_prefers_route_duration() {
        let service = DiscoveryService::new(route_store().await);
        let from_route = service.estimate("MAD", Some("LHR")).await.unwrap();
        assert_eq!(from_route.flight_hours, 2.5);
        let from_average = service.estimate("MAD", None).await.unwrap();
        assert_eq!(from_average.flight_hours, 2.5);
        let unknown_origin = service.estimate("MAD", Some("JFK")).await.unwrap();
        assert_eq!(unknown_origin.estimate, from_average.estimate);
    }

    #[tokio::test]
    async fn test_builtin_themes_when_unseeded() {
        let service = DiscoveryService::new(Arc::new(MemoryDestinationStore::new()));
        assert_eq!(service.themes().await.unwrap().len(), 5);
    }
}
