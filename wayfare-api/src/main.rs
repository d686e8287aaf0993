use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wayfare_analytics::{CohortAnalyzer, FunnelAnalyzer};
use wayfare_api::{app, scheduler, ApiSettings, AppState};
use wayfare_core::cache::TypedCache;
use wayfare_core::repository::{
    AirportDirectory, EventStore, FlightIndexer, InventoryStore, Notifier, PriceRepository,
};
use wayfare_core::supplier::FlightSupplier;
use wayfare_discovery::DiscoveryService;
use wayfare_gateway::{VendorClient, VendorConfig};
use wayfare_pricing::{AlertService, IngestionService, PriceService, TrackingService};
use wayfare_resilience::{presets, BreakerManager, Executor};
use wayfare_search::{SearchClient, SearchSettings};
use wayfare_store::{
    Config, DbClient, KafkaNotifier, LoggingNotifier, PgAlertRepository, PgEventStore, PgPriceRepository,
    PgSessionRepository, PgTrackingRepository, RedisClient, WideColumnStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wayfare_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("failed to load config")?;
    tracing::info!(
        port = config.server.port,
        environment = %config.server.environment,
        "starting wayfare api"
    );

    // Relational store
    let db = DbClient::new(&config.database).await.context("failed to connect to postgres")?;
    db.migrate().await.context("failed to run migrations")?;

    // Cache
    let redis = RedisClient::new(&config.redis).await.context("failed to connect to redis")?;
    let cache = TypedCache::new(Arc::new(redis));

    // Wide-column store: destinations, routes, inventory
    let wide = Arc::new(
        WideColumnStore::connect(&config.wide_column)
            .await
            .context("failed to connect to wide-column store")?,
    );

    let search = SearchClient::new(
        SearchSettings {
            url: config.search.url.clone(),
            flights_index: config.search.flights_index.clone(),
            airports_index: config.search.airports_index.clone(),
            ..Default::default()
        },
        Some(Executor::global(presets::external_service("search"))),
    )
    .context("invalid search settings")?;
    if let Err(e) = search.ensure_indices().await {
        tracing::warn!(error = %e, "search indices not ready, continuing");
    }

    let supplier: Option<Arc<dyn FlightSupplier>> = if config.vendor.is_configured() {
        let vendor = VendorClient::new(
            VendorConfig {
                base_url: config.vendor.base_url.clone(),
                client_id: config.vendor.client_id.clone(),
                client_secret: config.vendor.client_secret.clone(),
                timeout: config.vendor.timeout(),
                requests_per_second: config.vendor.requests_per_second,
                burst: config.vendor.burst,
                ..Default::default()
            },
            Some(Executor::global(presets::external_service("vendor"))),
        )
        .context("invalid vendor settings")?
        .with_cache(cache.clone());
        Some(Arc::new(vendor))
    } else {
        tracing::warn!("vendor credentials missing, live search disabled");
        None
    };

    let notifier: Arc<dyn Notifier> = if config.kafka.brokers.is_empty() {
        Arc::new(LoggingNotifier)
    } else {
        Arc::new(KafkaNotifier::new(&config.kafka.brokers).context("failed to create kafka producer")?)
    };

    let price_repo: Arc<dyn PriceRepository> = Arc::new(PgPriceRepository::new(db.clone()));
    let alerts = AlertService::new(
        Arc::new(PgAlertRepository::new(db.clone())),
        price_repo.clone(),
        notifier,
        cache.clone(),
    );
    let prices = PriceService::new(price_repo.clone(), cache.clone()).with_alerts(alerts.clone());
    let tracking = TrackingService::new(Arc::new(PgTrackingRepository::new(db.clone())), price_repo, cache.clone());

    let indexer: Arc<dyn FlightIndexer> = Arc::new(search.clone());
    let inventory: Arc<dyn InventoryStore> = wide.clone();
    let ingestion = supplier.clone().map(|supplier| {
        IngestionService::new(
            supplier,
            inventory.clone(),
            indexer.clone(),
            Arc::new(PgSessionRepository::new(db.clone())),
            prices.clone(),
        )
    });

    let events: Arc<dyn EventStore> = Arc::new(PgEventStore::new(db.clone()));
    let airports: Arc<dyn AirportDirectory> = Arc::new(search.clone());

    let state = AppState {
        settings: Arc::new(ApiSettings::from_config(&config)),
        cache,
        breakers: BreakerManager::global(),
        search,
        airports,
        supplier,
        ingestion,
        prices,
        alerts,
        tracking,
        discovery: DiscoveryService::new(wide),
        events: events.clone(),
        cohorts: CohortAnalyzer::new(events.clone()),
        funnels: FunnelAnalyzer::new(events),
    };

    let jobs = scheduler::start(&state, &config.scheduler);
    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind")?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("draining background jobs");
    jobs.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
