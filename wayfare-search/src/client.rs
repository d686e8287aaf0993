use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::aggregations::{AirlineStats, Facets, RouteInsights};
use crate::bulk::{self, BulkBatch};
use crate::document::FlightDocument;
use crate::error::{SearchError, SearchResult};
use crate::mappings;
use crate::query::{autocomplete_body, FlightQuery, SearchHit, SearchPage};
use crate::response::{BulkResponse, SearchResponse};
use crate::templates;
use wayfare_core::airport::{Airport, AirportSuggestion};
use wayfare_core::iata::is_airport_code;
use wayfare_core::offer::FlightOffer;
use wayfare_core::repository::{AirportDirectory, BulkSummary, FlightIndexer};
use wayfare_gateway::http::check_status;
use wayfare_gateway::{HttpClient, HttpClientConfig, HttpRequest};
use wayfare_resilience::Executor;
use wayfare_shared::{AppError, AppResult};

pub const MAX_INSIGHT_DAYS: u32 = 365;
pub const MAX_SUGGESTIONS: usize = 20;

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub url: String,
    pub flights_index: String,
    pub airports_index: String,
    pub timeout: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            flights_index: mappings::FLIGHTS_INDEX.to_string(),
            airports_index: mappings::AIRPORTS_INDEX.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Document search over the engine's REST API. Calls go through the
/// resilience executor when one is attached.
#[derive(Clone)]
pub struct SearchClient {
    http: HttpClient,
    base_url: String,
    flights_index: String,
    airports_index: String,
}

impl SearchClient {
    pub fn new(settings: SearchSettings, executor: Option<Executor>) -> SearchResult<Self> {
        let base_url = settings.url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SearchError::Config(format!("search url '{}'", settings.url)));
        }
        let http = HttpClient::new(HttpClientConfig {
            service: "search".to_string(),
            timeout: settings.timeout,
            requests_per_second: None,
            ..Default::default()
        })?;
        let http = match executor {
            Some(executor) => http.with_executor(executor),
            None => http,
        };
        Ok(Self {
            http,
            base_url,
            flights_index: settings.flights_index,
            airports_index: settings.airports_index,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Create both indexes with their mappings unless they already exist.
    pub async fn ensure_indices(&self) -> AppResult<()> {
        let wanted = [
            (&self.flights_index, mappings::flights_index()),
            (&self.airports_index, mappings::airports_index()),
        ];
        for (index, mapping) in wanted {
            let head = HttpRequest::new(Method::HEAD, self.url(index));
            if self.http.send(head).await?.is_success() {
                debug!(index = %index, "index exists");
                continue;
            }
            let create = HttpRequest::new(Method::PUT, self.url(index)).json(&mapping)?;
            let response = self.http.send(create.clone()).await?;
            // Another instance may have won the race between HEAD and PUT.
            if !response.is_success() && !response.body.contains("resource_already_exists_exception") {
                check_status(&response, &create).map_err(|e| e.with_operation("ensure_indices"))?;
            }
            info!(index = %index, "search index created");
        }
        Ok(())
    }

    pub async fn put_templates(&self) -> AppResult<()> {
        for (id, body) in templates::all() {
            let request = HttpRequest::new(Method::PUT, self.url(&format!("_scripts/{}", id))).json(&body)?;
            self.http
                .execute(request)
                .await
                .map_err(|e| e.with_operation("put_templates"))?;
        }
        Ok(())
    }

    async fn bulk(&self, batches: Vec<BulkBatch>) -> AppResult<BulkSummary> {
        let mut summary = BulkSummary::default();
        for batch in batches {
            let request = HttpRequest::post(self.url("_bulk")).ndjson(batch.body.clone());
            let response = self.http.execute(request).await.map_err(|e| e.with_operation("bulk"))?;
            let parsed: BulkResponse = response.json()?;
            summary.merge(bulk::summarize(&batch, &parsed));
        }
        Ok(summary)
    }

    pub async fn index_offers(&self, offers: &[FlightOffer]) -> AppResult<BulkSummary> {
        let (docs, mut summary) = bulk::flight_documents(offers, Utc::now());
        if !docs.is_empty() {
            let batches = bulk::batches(&self.flights_index, &docs).map_err(AppError::from)?;
            summary.merge(self.bulk(batches).await?);
        }
        if summary.is_clean() {
            info!(indexed = summary.indexed, "flight offers indexed");
        } else {
            warn!(indexed = summary.indexed, failed = summary.failed, "flight offers partially indexed");
        }
        Ok(summary)
    }

    pub async fn index_airports(&self, airports: &[Airport]) -> AppResult<BulkSummary> {
        let docs: Vec<(String, &Airport)> = airports.iter().map(|a| (a.code.clone(), a)).collect();
        if docs.is_empty() {
            return Ok(BulkSummary::default());
        }
        let batches = bulk::batches(&self.airports_index, &docs).map_err(AppError::from)?;
        let summary = self.bulk(batches).await?;
        info!(indexed = summary.indexed, failed = summary.failed, "airports indexed");
        Ok(summary)
    }

    async fn search<T: serde::de::DeserializeOwned>(
        &self,
        index: &str,
        body: &Value,
        operation: &str,
    ) -> AppResult<SearchResponse<T>> {
        let request = HttpRequest::post(self.url(&format!("{}/_search", index))).json(body)?;
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| e.with_operation(operation))?;
        response.json()
    }

    /// Hits and, when asked for, facets computed over the same query in one request.
    pub async fn search_flights(&self, query: &FlightQuery, with_facets: bool) -> AppResult<SearchPage> {
        query.validate()?;
        let body = query.to_body(with_facets);
        let response: SearchResponse<FlightDocument> =
            self.search(&self.flights_index, &body, "search_flights").await?;

        let facets = match (with_facets, &response.aggregations) {
            (true, Some(aggs)) => Some(Facets::parse(aggs)?),
            (true, None) => Some(Facets::default()),
            (false, _) => None,
        };
        let full_page = response.hits.hits.len() >= usize::from(query.page_size());
        let next_cursor = if full_page {
            response.hits.hits.last().and_then(|h| h.sort.clone())
        } else {
            None
        };
        let total = response
            .hits
            .total
            .as_ref()
            .map(|t| t.value)
            .unwrap_or(response.hits.hits.len() as u64);
        let hits = response
            .hits
            .hits
            .into_iter()
            .map(|h| SearchHit { id: h.id, score: h.score, flight: h.source })
            .collect();

        Ok(SearchPage { total, hits, facets, next_cursor })
    }

    /// Facets only, for a filter sidebar.
    pub async fn facets(&self, query: &FlightQuery) -> AppResult<Facets> {
        query.validate()?;
        let mut body = query.to_body(true);
        body["size"] = Value::from(0);
        let response: SearchResponse<Value> = self.search(&self.flights_index, &body, "facets").await?;
        match response.aggregations {
            Some(aggs) => Ok(Facets::parse(&aggs)?),
            None => Ok(Facets::default()),
        }
    }

    pub async fn suggest(&self, query: &str, limit: usize) -> AppResult<Vec<AirportSuggestion>> {
        let limit = limit.min(MAX_SUGGESTIONS);
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let body = autocomplete_body(query, limit);
        let response: SearchResponse<Airport> =
            self.search(&self.airports_index, &body, "suggest").await?;
        let mut suggestions: Vec<AirportSuggestion> = response
            .hits
            .hits
            .into_iter()
            .map(|h| AirportSuggestion { airport: h.source, score: h.score.unwrap_or(0.0) })
            .collect();
        suggestions.truncate(limit);
        Ok(suggestions)
    }

    fn check_route(origin: &str, destination: &str, days: u32) -> AppResult<()> {
        if !is_airport_code(origin) || !is_airport_code(destination) {
            return Err(AppError::validation("origin and destination must be 3-letter airport codes"));
        }
        if days == 0 || days > MAX_INSIGHT_DAYS {
            return Err(AppError::validation("days must be between 1 and 365").with_detail("days", days));
        }
        Ok(())
    }

    pub async fn route_insights(&self, origin: &str, destination: &str, days: u32) -> AppResult<RouteInsights> {
        Self::check_route(origin, destination, days)?;
        let body = RouteInsights::request(origin, destination, days, Utc::now());
        let response: SearchResponse<Value> =
            self.search(&self.flights_index, &body, "route_insights").await?;
        let aggs = response
            .aggregations
            .ok_or_else(|| SearchError::UnexpectedResponse("route insights without aggregations".into()))?;
        Ok(RouteInsights::parse(origin, destination, days, &aggs)?)
    }

    pub async fn airline_comparison(
        &self,
        origin: &str,
        destination: &str,
        days: u32,
    ) -> AppResult<Vec<AirlineStats>> {
        Self::check_route(origin, destination, days)?;
        let body = AirlineStats::request(origin, destination, days, Utc::now());
        let response: SearchResponse<Value> =
            self.search(&self.flights_index, &body, "airline_comparison").await?;
        let aggs = response
            .aggregations
            .ok_or_else(|| SearchError::UnexpectedResponse("airline comparison without aggregations".into()))?;
        Ok(AirlineStats::parse(&aggs)?)
    }

    /// Make everything indexed so far visible to search. Meant for tests and
    /// seeding, never for the request path.
    pub async fn force_refresh(&self) -> AppResult<()> {
        let indexes = format!("{},{}", self.flights_index, self.airports_index);
        self.http
            .execute(HttpRequest::post(self.url(&format!("{}/_refresh", indexes))))
            .await
            .map_err(|e| e.with_operation("force_refresh"))?;
        Ok(())
    }
}

#[async_trait]
impl FlightIndexer for SearchClient {
    async fn index_offers(&self, offers: &[FlightOffer]) -> AppResult<BulkSummary> {
        SearchClient::index_offers(self, offers).await
    }
}

#[async_trait]
impl AirportDirectory for SearchClient {
    async fn index_airports(&self, airports: &[Airport]) -> AppResult<BulkSummary> {
        SearchClient::index_airports(self, airports).await
    }

    async fn suggest(&self, query: &str, limit: usize) -> AppResult<Vec<AirportSuggestion>> {
        SearchClient::suggest(self, query, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_url() {
        let settings = SearchSettings { url: "localhost:9200".into(), ..Default::default() };
        assert!(SearchClient::new(settings, None).is_err());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let settings = SearchSettings { url: "http://es:9200/".into(), ..Default::default() };
        let client = SearchClient::new(settings, None).unwrap();
        assert_eq!(client.url("flights/_search"), "http://es:9200/flights/_search");
    }

    #[test]
    fn test_route_checks() {
        assert!(SearchClient::check_route("LHR", "CDG", 30).is_ok());
        assert!(SearchClient::check_route("LHR", "CDG", 0).is_err());
        assert!(SearchClient::check_route("lhr", "CDG", 30).is_err());
        assert!(SearchClient::check_route("LHR", "CDG", 366).is_err());
    }
}
