use std::sync::Arc;
use std::time::Duration;

use wayfare_analytics::{CohortAnalyzer, FunnelAnalyzer};
use wayfare_core::cache::TypedCache;
use wayfare_core::repository::{AirportDirectory, EventStore};
use wayfare_core::supplier::FlightSupplier;
use wayfare_discovery::DiscoveryService;
use wayfare_pricing::{AlertService, IngestionService, PriceService, TrackingService};
use wayfare_resilience::BreakerManager;
use wayfare_search::SearchClient;
use wayfare_store::Config;

/// Settings the HTTP layer itself consults on every request.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub service_name: String,
    pub production: bool,
    pub allowed_origins: Vec<String>,
    pub rate_limit: i64,
    pub rate_window: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            service_name: "wayfare-api".to_string(),
            production: false,
            allowed_origins: Vec::new(),
            rate_limit: 100,
            rate_window: Duration::from_secs(60),
        }
    }
}

impl ApiSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            service_name: config.server.service_name.clone(),
            production: config.server.is_production(),
            allowed_origins: config.server.allowed_origins.clone(),
            rate_limit: config.limits.requests_per_window,
            rate_window: Duration::from_secs(config.limits.window_seconds),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<ApiSettings>,
    pub cache: TypedCache,
    pub breakers: &'static BreakerManager,
    pub search: SearchClient,
    pub airports: Arc<dyn AirportDirectory>,
    /// Vendor lookups; absent when no vendor credentials are configured.
    pub supplier: Option<Arc<dyn FlightSupplier>>,
    pub ingestion: Option<IngestionService>,
    pub prices: PriceService,
    pub alerts: AlertService,
    pub tracking: TrackingService,
    pub discovery: DiscoveryService,
    pub events: Arc<dyn EventStore>,
    pub cohorts: CohortAnalyzer,
    pub funnels: FunnelAnalyzer,
}
