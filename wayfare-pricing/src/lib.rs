//! Price comparison, alerts, route tracking and search ingestion.

pub mod alerts;
pub mod ingestion;
pub mod prices;
pub mod tracking;

pub use alerts::{AlertService, CheckReport};
pub use ingestion::{IngestionService, SearchOutcome};
pub use prices::{IngestReport, PriceService};
pub use tracking::TrackingService;
