use async_trait::async_trait;

use crate::airport::Airport;
use crate::offer::FlightOffer;
use crate::search::FlightSearchRequest;
use wayfare_shared::AppResult;

#[async_trait]
pub trait FlightSupplier: Send + Sync {
    /// Provider label stamped on every offer this supplier returns.
    fn provider(&self) -> &str;

    /// Run a shopping search and return canonical offers in vendor order.
    async fn search_offers(&self, request: &FlightSearchRequest) -> AppResult<Vec<FlightOffer>>;

    /// Airport and city lookup by keyword.
    async fn suggest_locations(&self, keyword: &str, limit: usize) -> AppResult<Vec<Airport>>;
}
