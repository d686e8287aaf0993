//! Static reference data loaded by the seeding binaries.

use wayfare_core::airport::{Airport, AirportType};
use wayfare_core::geo::AirportLocation;
use wayfare_shared::{AppError, AppResult};

const EUROPEAN_AIRPORTS: &str = include_str!("../data/european_airports.json");

pub fn european_airports() -> AppResult<Vec<Airport>> {
    serde_json::from_str(EUROPEAN_AIRPORTS)
        .map_err(|e| AppError::internal(format!("airport dataset is malformed: {}", e)).with_operation("seed"))
}

/// Physical airports with coordinates; city groupings have none.
pub fn locations(airports: &[Airport]) -> Vec<AirportLocation> {
    airports
        .iter()
        .filter(|a| a.airport_type == AirportType::Airport)
        .filter_map(|a| {
            Some(AirportLocation { code: a.code.clone(), latitude: a.latitude?, longitude: a.longitude? })
        })
        .collect()
}
