//! Rows written to the wide-column tables when vendor offers are ingested.
//!
//! Route and date columns always come from the search request that produced
//! the offers, so a record is keyed even when the vendor response omits them.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::iata::route_id;
use crate::offer::FlightOffer;
use crate::price::{PriceSample, TripType};
use crate::search::{CabinClass, FlightSearchRequest};

pub fn inventory_ttl() -> Duration {
    Duration::days(30)
}

pub fn price_history_ttl() -> Duration {
    Duration::days(90)
}

pub fn search_results_ttl() -> Duration {
    Duration::days(1)
}

/// How long a price derived from a vendor offer stays current.
pub fn derived_price_validity() -> Duration {
    Duration::hours(6)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub search_timestamp: DateTime<Utc>,
    pub offer_id: String,
    pub provider: String,
    pub airline: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub stops: u32,
    pub duration_minutes: Option<i64>,
    pub cabin_class: CabinClass,
    pub bookable_seats: Option<u32>,
    pub offer: FlightOffer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub route: String,
    pub price_date: NaiveDate,
    pub search_timestamp: DateTime<Utc>,
    pub id: Uuid,
    pub price: Decimal,
    pub currency: String,
    pub airline: Option<String>,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultRecord {
    pub search_request_id: String,
    pub search_timestamp: DateTime<Utc>,
    pub id: Uuid,
    pub origin_code: String,
    pub destination_code: String,
    pub departure_date: NaiveDate,
    pub price: Decimal,
    pub currency: String,
    pub offer: FlightOffer,
}

/// Every row derived from one ingested offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedOffer {
    pub inventory: InventoryRecord,
    pub observation: PriceObservation,
    pub search_result: SearchResultRecord,
    pub sample: PriceSample,
}

impl IngestedOffer {
    pub fn derive(offer: &FlightOffer, request: &FlightSearchRequest, at: DateTime<Utc>) -> Self {
        let airline = offer.primary_airline().map(str::to_string);
        let price = offer.price.grand_total;
        let currency = offer.price.currency.clone();
        let cabin_class = offer.cabin().unwrap_or(request.cabin_class);
        let duration_minutes = offer.outbound_minutes();

        let inventory = InventoryRecord {
            id: Uuid::new_v4(),
            origin: request.origin.clone(),
            destination: request.destination.clone(),
            departure_date: request.departure_date,
            search_timestamp: at,
            offer_id: offer.id.clone(),
            provider: offer.provider.clone(),
            airline: airline.clone(),
            price,
            currency: currency.clone(),
            stops: offer.outbound_stops(),
            duration_minutes,
            cabin_class,
            bookable_seats: offer.booking.number_of_bookable_seats,
            offer: offer.clone(),
        };

        let observation = PriceObservation {
            route: route_id(&request.origin, &request.destination),
            price_date: request.departure_date,
            search_timestamp: at,
            id: inventory.id,
            price,
            currency: currency.clone(),
            airline,
            provider: offer.provider.clone(),
        };

        let search_result = SearchResultRecord {
            search_request_id: request.search_id(),
            search_timestamp: at,
            id: inventory.id,
            origin_code: request.origin.clone(),
            destination_code: request.destination.clone(),
            departure_date: request.departure_date,
            price,
            currency: currency.clone(),
            offer: offer.clone(),
        };

        let sample = PriceSample {
            id: inventory.id,
            provider: offer.provider.clone(),
            origin: request.origin.clone(),
            destination: request.destination.clone(),
            departure_date: request.departure_date,
            return_date: request.return_date,
            trip_type: if request.is_round_trip() { TripType::Return } else { TripType::Oneway },
            passenger_count: request.passenger_count().min(u8::MAX as u32) as u8,
            cabin_class,
            price,
            currency,
            is_refundable: false,
            baggage_included: offer.baggage_included(),
            direct_flight: offer.is_direct(),
            duration_minutes: duration_minutes.and_then(|m| u32::try_from(m).ok()),
            booking_url: None,
            valid_until: at + derived_price_validity(),
            created_at: at,
        };

        Self { inventory, observation, search_result, sample }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::tests::segment;
    use crate::offer::{BookingConstraints, Itinerary, PriceBreakdown};

    #[test]
    fn test_keys_come_from_request() {
        let offer = FlightOffer {
            id: "1".into(),
            provider: "amadeus".into(),
            source: "GDS".into(),
            search_id: String::new(),
            one_way: true,
            itineraries: vec![Itinerary {
                duration_minutes: Some(75),
                segments: vec![segment("1", "LHR", "2025-06-01T08:00:00", "CDG", "2025-06-01T10:15:00")],
            }],
            price: PriceBreakdown {
                currency: "EUR".into(),
                total: Decimal::new(8500, 2),
                base: Decimal::new(6000, 2),
                taxes: vec![],
                fees: vec![],
                grand_total: Decimal::new(8500, 2),
            },
            traveler_pricings: vec![],
            validating_airline_codes: vec![],
            booking: BookingConstraints::default(),
        };
        let request = FlightSearchRequest::one_way("LHR", "CDG", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        let rows = IngestedOffer::derive(&offer, &request, Utc::now());

        assert_eq!(rows.search_result.origin_code, "LHR");
        assert_eq!(rows.search_result.destination_code, "CDG");
        assert_eq!(rows.search_result.search_request_id, request.search_id());
        assert_eq!(rows.observation.route, "LHR-CDG");
        assert_eq!(rows.inventory.airline.as_deref(), Some("BA"));
        assert_eq!(rows.sample.trip_type, TripType::Oneway);
        assert!(rows.sample.direct_flight);
        assert!(rows.sample.validate().is_ok());
    }
}
