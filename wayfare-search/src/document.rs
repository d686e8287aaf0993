use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use wayfare_core::offer::FlightOffer;
use wayfare_core::search::CabinClass;
use wayfare_core::{CoreError, CoreResult};

/// Flattened offer as stored in the `flights` index. Prices are sent as
/// decimal strings and coerced by the numeric mapping, so no float rounding
/// happens on our side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightDocument {
    pub offer_id: String,
    pub search_id: String,
    pub provider: String,
    pub origin_airport: String,
    pub destination_airport: String,
    pub airline: String,
    pub cabin_class: CabinClass,
    pub price: Decimal,
    pub currency: String,
    pub duration_minutes: Option<i64>,
    pub stops: u32,
    pub is_direct: bool,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub departure_date: NaiveDate,
    pub return_departure_time: Option<DateTime<Utc>>,
    pub bookable_seats: Option<u32>,
    pub indexed_at: DateTime<Utc>,
}

impl FlightDocument {
    pub fn from_offer(offer: &FlightOffer, indexed_at: DateTime<Utc>) -> CoreResult<Self> {
        offer.validate()?;
        let outbound = offer
            .outbound()
            .ok_or_else(|| CoreError::InvariantViolation(format!("offer {} has no outbound", offer.id)))?;
        let origin = outbound
            .origin()
            .ok_or_else(|| CoreError::InvariantViolation(format!("offer {} has no segments", offer.id)))?;
        let destination = outbound.destination().unwrap_or(origin);
        let departs = offer
            .departure()
            .ok_or_else(|| CoreError::InvariantViolation(format!("offer {} has no departure", offer.id)))?;
        let departure = departs.approximate_utc();

        Ok(Self {
            offer_id: offer.id.clone(),
            search_id: offer.search_id.clone(),
            provider: offer.provider.clone(),
            origin_airport: origin.to_string(),
            destination_airport: destination.to_string(),
            airline: offer.primary_airline().unwrap_or_default().to_string(),
            cabin_class: offer.cabin().unwrap_or_default(),
            price: offer.price.grand_total,
            currency: offer.price.currency.clone(),
            duration_minutes: offer.outbound_minutes(),
            stops: offer.outbound_stops(),
            is_direct: offer.is_direct(),
            departure_time: departure,
            arrival_time: offer.arrival().map(|t| t.approximate_utc()),
            // Travellers search by the day printed on the ticket, not the UTC day.
            departure_date: departs.local.date(),
            return_departure_time: offer
                .inbound()
                .and_then(|i| i.segments.first())
                .map(|s| s.departure.at.approximate_utc()),
            bookable_seats: offer.booking.number_of_bookable_seats,
            indexed_at,
        })
    }

    /// Vendor offer ids are only unique within one search.
    pub fn document_id(&self) -> String {
        let scope = if self.search_id.is_empty() { &self.provider } else { &self.search_id };
        format!("{}-{}", scope, self.offer_id)
    }
}
