use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::http::{HttpClient, HttpClientConfig, HttpRequest, HttpResponse};
use crate::token::TokenManager;
use crate::translator::{build_search_request, translate_locations, translate_response};
use crate::wire::{FlightOffersResponse, LocationsResponse};
use wayfare_core::airport::Airport;
use wayfare_core::cache::{CacheNamespace, TypedCache};
use wayfare_core::offer::FlightOffer;
use wayfare_core::search::FlightSearchRequest;
use wayfare_core::supplier::FlightSupplier;
use wayfare_resilience::Executor;
use wayfare_shared::{AppError, AppResult, Masked};

const FLIGHT_OFFERS_PATH: &str = "/v2/shopping/flight-offers";
const LOCATIONS_PATH: &str = "/v1/reference-data/locations";

#[derive(Debug, Clone)]
pub struct VendorConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: Masked<String>,
    /// Label stamped on every offer.
    pub provider: String,
    pub timeout: Duration,
    pub requests_per_second: f64,
    pub burst: u32,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://test.api.amadeus.com".to_string(),
            client_id: String::new(),
            client_secret: Masked::default(),
            provider: "amadeus".to_string(),
            timeout: Duration::from_secs(30),
            requests_per_second: 10.0,
            burst: 20,
        }
    }
}

/// Flight-shopping vendor behind the [`FlightSupplier`] seam.
pub struct VendorClient {
    http: HttpClient,
    tokens: TokenManager,
    base_url: String,
    provider: String,
    cache: Option<TypedCache>,
}

impl VendorClient {
    pub fn new(config: VendorConfig, executor: Option<Executor>) -> Result<Self, GatewayError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(GatewayError::Config(format!("vendor base url '{}'", config.base_url)));
        }

        let http = HttpClient::new(HttpClientConfig {
            service: config.provider.clone(),
            timeout: config.timeout,
            requests_per_second: Some(config.requests_per_second),
            burst: config.burst,
            ..Default::default()
        })?;
        // Token refreshes bypass the executor: a failed refresh surfaces as-is.
        let tokens = TokenManager::new(http.clone(), &base_url, &config.client_id, config.client_secret);
        let http = match executor {
            Some(executor) => http.with_executor(executor),
            None => http,
        };

        Ok(Self { http, tokens, base_url, provider: config.provider, cache: None })
    }

    /// Serve repeated searches and location lookups from the cache.
    pub fn with_cache(mut self, cache: TypedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Send with the current bearer token; a 401 drops the token and the
    /// call is replayed once with a fresh one.
    async fn authorized(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        let token = self.tokens.token().await?;
        match self.http.execute(request.clone().bearer(&token)).await {
            Err(err) if upstream_status(&err) == Some(401) => {
                warn!(provider = %self.provider, "vendor rejected bearer token, refreshing");
                self.tokens.invalidate();
                let token = self.tokens.token().await?;
                self.http.execute(request.bearer(&token)).await
            }
            other => other,
        }
    }
}

fn upstream_status(err: &AppError) -> Option<u64> {
    err.details.get("upstream_status").and_then(serde_json::Value::as_u64)
}

#[async_trait]
impl FlightSupplier for VendorClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn search_offers(&self, request: &FlightSearchRequest) -> AppResult<Vec<FlightOffer>> {
        request.validate()?;
        let search_id = request.search_id();
        let cache_key = CacheNamespace::VendorFlightSearch.key(&search_id);

        if let Some(cache) = &self.cache {
            if let Some(offers) = cache.get_json::<Vec<FlightOffer>>(&cache_key).await {
                return Ok(offers);
            }
        }

        let body = build_search_request(request);
        let response = self
            .authorized(HttpRequest::post(format!("{}{}", self.base_url, FLIGHT_OFFERS_PATH)).json(&body)?)
            .await
            .map_err(|e| e.with_operation("search_offers"))?;
        let wire: FlightOffersResponse = response.json()?;
        let offers = translate_response(&wire, &self.provider, &search_id)?;

        info!(
            provider = %self.provider,
            route = %format!("{}-{}", request.origin, request.destination),
            offers = offers.len(),
            "vendor search completed"
        );

        if let Some(cache) = &self.cache {
            cache
                .put_json(&cache_key, &offers, CacheNamespace::VendorFlightSearch.ttl())
                .await;
        }
        Ok(offers)
    }

    async fn suggest_locations(&self, keyword: &str, limit: usize) -> AppResult<Vec<Airport>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(AppError::validation("keyword must not be empty"));
        }
        let limit = limit.clamp(1, 50);
        let cache_key = CacheNamespace::VendorAirports.key(&format!("{}:{}", keyword.to_lowercase(), limit));

        if let Some(cache) = &self.cache {
            if let Some(airports) = cache.get_json::<Vec<Airport>>(&cache_key).await {
                return Ok(airports);
            }
        }

        let request = HttpRequest::get(format!("{}{}", self.base_url, LOCATIONS_PATH))
            .query("subType", "AIRPORT,CITY")
            .query("keyword", keyword.to_uppercase())
            .query("page[limit]", limit.to_string())
            .query("view", "FULL");
        let response = self
            .authorized(request)
            .await
            .map_err(|e| e.with_operation("suggest_locations"))?;
        let wire: LocationsResponse = response.json()?;
        let mut airports = translate_locations(&wire);
        airports.truncate(limit);

        if let Some(cache) = &self.cache {
            cache
                .put_json(&cache_key, &airports, CacheNamespace::VendorAirports.ttl())
                .await;
        }
        Ok(airports)
    }
}
