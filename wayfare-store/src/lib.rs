pub mod alert_repo;
pub mod app_config;
pub mod database;
pub mod error;
pub mod event_repo;
pub mod events;
pub mod gate;
pub mod price_repo;
pub mod redis_repo;
pub mod route_repo;
pub mod session_repo;
pub mod tracking_repo;
pub mod wide_column;

pub use alert_repo::PgAlertRepository;
pub use app_config::Config;
pub use database::DbClient;
pub use error::{StoreError, StoreResult};
pub use event_repo::PgEventStore;
pub use events::{KafkaNotifier, LoggingNotifier};
pub use gate::QueryGate;
pub use price_repo::PgPriceRepository;
pub use redis_repo::RedisClient;
pub use route_repo::PgRouteRepository;
pub use session_repo::PgSessionRepository;
pub use tracking_repo::PgTrackingRepository;
pub use wide_column::WideColumnStore;
