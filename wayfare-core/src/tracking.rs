use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::iata::{is_airport_code, route_id};
use crate::price::{PriceComparisonRequest, PriceHistory, PriceSample, TripType};
use crate::search::CabinClass;
use crate::validation::FieldErrors;
use wayfare_shared::AppError;

pub const MAX_ACTIVE_TRACKINGS: usize = 10;

/// A watched route. At most one active tracking per (user, route).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTracking {
    pub id: Uuid,
    pub user_id: String,
    pub route_id: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub trip_type: TripType,
    pub passenger_count: u8,
    pub cabin_class: CabinClass,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PriceTracking {
    pub fn comparison_request(&self, max_results: u16) -> PriceComparisonRequest {
        PriceComparisonRequest {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            departure_date: self.departure_date,
            return_date: self.return_date,
            trip_type: self.trip_type,
            passenger_count: self.passenger_count,
            cabin_class: Some(self.cabin_class),
            currency: None,
            max_results,
        }
    }
}

fn default_passengers() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTrackingRequest {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    #[serde(default)]
    pub trip_type: TripType,
    #[serde(default = "default_passengers")]
    pub passenger_count: u8,
    #[serde(default)]
    pub cabin_class: CabinClass,
}

impl CreateTrackingRequest {
    pub fn route_id(&self) -> String {
        route_id(&self.origin, &self.destination)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        errors.check(is_airport_code(&self.origin), "origin", "must be a 3-letter airport code");
        errors.check(
            is_airport_code(&self.destination),
            "destination",
            "must be a 3-letter airport code",
        );
        errors.check(self.origin != self.destination, "destination", "must differ from origin");
        errors.check(
            (1..=9).contains(&self.passenger_count),
            "passenger_count",
            "must be between 1 and 9",
        );
        if self.trip_type == TripType::Return {
            errors.check(self.return_date.is_some(), "return_date", "is required for return trips");
        }
        errors.into_result("invalid price tracking")
    }

    pub fn into_tracking(self, user_id: &str, now: DateTime<Utc>) -> PriceTracking {
        PriceTracking {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            route_id: self.route_id(),
            origin: self.origin,
            destination: self.destination,
            departure_date: self.departure_date,
            return_date: self.return_date,
            trip_type: self.trip_type,
            passenger_count: self.passenger_count,
            cabin_class: self.cabin_class,
            is_active: true,
            created_at: now,
        }
    }
}

/// What the sweep gathers for one tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub tracking_id: Uuid,
    pub route_id: String,
    pub current_prices: Vec<PriceSample>,
    pub history: Vec<PriceHistory>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_id_derived() {
        let req = CreateTrackingRequest {
            origin: "LHR".into(),
            destination: "JFK".into(),
            departure_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            return_date: None,
            trip_type: TripType::Oneway,
            passenger_count: 2,
            cabin_class: CabinClass::Business,
        };
        assert!(req.validate().is_ok());
        let tracking = req.into_tracking("u1", Utc::now());
        assert_eq!(tracking.route_id, "LHR-JFK");
        assert!(tracking.is_active);
        assert_eq!(tracking.comparison_request(10).max_results, 10);
    }

    #[test]
    fn test_return_requires_date() {
        let req = CreateTrackingRequest {
            origin: "LHR".into(),
            destination: "JFK".into(),
            departure_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            return_date: None,
            trip_type: TripType::Return,
            passenger_count: 1,
            cabin_class: CabinClass::Economy,
        };
        let err = req.validate().unwrap_err();
        assert!(err.details.contains_key("return_date"));
    }
}
