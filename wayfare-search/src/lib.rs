//! Flight and airport document search over the Elasticsearch REST API.

pub mod aggregations;
pub mod bulk;
pub mod client;
pub mod document;
pub mod error;
pub mod mappings;
pub mod query;
pub mod response;
pub mod templates;

pub use aggregations::{AirlineStats, DailyPrice, Facets, RouteInsights};
pub use client::{SearchClient, SearchSettings};
pub use document::FlightDocument;
pub use error::SearchError;
pub use query::{FlightQuery, FlightSort, SearchPage};
