//! Destination discovery: theme recommendations, duration-based exploration,
//! similar destinations and fare estimates.

pub mod requests;
pub mod scoring;
pub mod service;

pub use requests::{
    CountryStats, ExploreRequest, ExploreResult, Recommendation, SimilarDestination, ThemeRecommendations,
    ThemeRequest,
};
pub use scoring::PriceEstimate;
pub use service::{DiscoveryService, DEFAULT_SIMILAR_LIMIT};
