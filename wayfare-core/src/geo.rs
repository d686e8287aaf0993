use serde::{Deserialize, Serialize};

use crate::destination::RouteDuration;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const CRUISE_SPEED_KMH: f64 = 850.0;
/// Taxi, climb and descent.
pub const GROUND_OVERHEAD_MINUTES: f64 = 35.0;
pub const CONNECTION_SURCHARGE_MINUTES: u32 = 60;
pub const LONG_HAUL_KM: f64 = 3000.0;
pub const MIN_DURATION_MINUTES: u32 = 45;
pub const MAX_DURATION_MINUTES: u32 = 480;

/// Routes without a practical direct service even under 3000 km.
pub const LONG_HAUL_EXCEPTIONS: &[(&str, &str)] = &[
    ("LHR", "TLV"),
    ("LHR", "IST"),
    ("CDG", "TLV"),
    ("FRA", "TLV"),
    ("DUB", "IST"),
    ("LIS", "IST"),
    ("MAD", "TLV"),
    ("OSL", "ATH"),
    ("HEL", "LIS"),
    ("REK", "ATH"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportLocation {
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn is_long_haul_exception(origin: &str, destination: &str) -> bool {
    LONG_HAUL_EXCEPTIONS
        .iter()
        .any(|(a, b)| (*a == origin && *b == destination) || (*a == destination && *b == origin))
}

/// Expected block time for a route, in minutes.
pub fn estimate_duration_minutes(origin: &str, destination: &str, distance_km: f64) -> u32 {
    let mut minutes = (distance_km / CRUISE_SPEED_KMH * 60.0 + GROUND_OVERHEAD_MINUTES).round() as u32;
    if distance_km > LONG_HAUL_KM || is_long_haul_exception(origin, destination) {
        minutes += CONNECTION_SURCHARGE_MINUTES;
    }
    minutes.clamp(MIN_DURATION_MINUTES, MAX_DURATION_MINUTES)
}

pub fn route_between(from: &AirportLocation, to: &AirportLocation) -> RouteDuration {
    let distance = haversine_km(from.latitude, from.longitude, to.latitude, to.longitude);
    let minutes = estimate_duration_minutes(&from.code, &to.code, distance);
    let connecting = distance > LONG_HAUL_KM || is_long_haul_exception(&from.code, &to.code);
    RouteDuration {
        origin: from.code.clone(),
        destination: to.code.clone(),
        duration_minutes: minutes,
        distance_km: (distance * 10.0).round() / 10.0,
        is_direct: !connecting,
        typical_stops: u32::from(connecting),
    }
}

/// Every ordered pair of distinct airports.
pub fn all_routes(airports: &[AirportLocation]) -> Vec<RouteDuration> {
    let mut routes = Vec::with_capacity(airports.len() * airports.len().saturating_sub(1));
    for from in airports {
        for to in airports.iter().filter(|a| a.code != from.code) {
            routes.push(route_between(from, to));
        }
    }
    routes
}
