use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::search::CabinClass;
use crate::{CoreError, CoreResult};

// ============================================================================
// Flight Time
// ============================================================================

/// A wall-clock time as received from a supplier. When the supplier sent an
/// offset it is kept; when it did not, the time is airport-local and the offset
/// stays unknown rather than being invented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlightTime {
    pub local: NaiveDateTime,
    pub utc_offset_seconds: Option<i32>,
}

impl FlightTime {
    pub fn local(local: NaiveDateTime) -> Self {
        Self { local, utc_offset_seconds: None }
    }

    pub fn utc(at: DateTime<Utc>) -> Self {
        Self { local: at.naive_utc(), utc_offset_seconds: Some(0) }
    }

    /// Parse an ISO-8601 timestamp, with or without offset.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Self {
                local: with_offset.naive_local(),
                utc_offset_seconds: Some(with_offset.offset().local_minus_utc()),
            });
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(Self::local)
            .ok_or_else(|| CoreError::InvalidFormat(format!("datetime '{}'", raw)))
    }

    pub fn is_zone_known(&self) -> bool {
        self.utc_offset_seconds.is_some()
    }

    /// The instant in UTC, only when the offset is known.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        let offset = FixedOffset::east_opt(self.utc_offset_seconds?)?;
        offset
            .from_local_datetime(&self.local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Best-effort instant for ordering and indexing: the UTC instant when the
    /// offset is known, the wall-clock time read as UTC otherwise.
    pub fn approximate_utc(&self) -> DateTime<Utc> {
        self.to_utc().unwrap_or_else(|| Utc.from_utc_datetime(&self.local))
    }

    /// Render the way it was received.
    pub fn to_wire(&self) -> String {
        match self.utc_offset_seconds.and_then(FixedOffset::east_opt) {
            Some(offset) => match offset.from_local_datetime(&self.local).single() {
                Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
                None => self.local.format("%Y-%m-%dT%H:%M:%S").to_string(),
            },
            None => self.local.format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }
}

impl fmt::Display for FlightTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

// ============================================================================
// Offer Model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightEndpoint {
    pub iata_code: String,
    pub terminal: Option<String>,
    pub at: FlightTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub departure: FlightEndpoint,
    pub arrival: FlightEndpoint,
    pub carrier_code: String,
    pub carrier_name: String,
    pub number: String,
    pub aircraft_code: Option<String>,
    pub aircraft_name: Option<String>,
    pub operating_carrier_code: Option<String>,
    pub duration_minutes: Option<i64>,
    pub number_of_stops: u32,
    pub blacklisted_in_eu: bool,
}

impl Segment {
    pub fn flight_number(&self) -> String {
        format!("{}{}", self.carrier_code, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Itinerary {
    pub duration_minutes: Option<i64>,
    pub segments: Vec<Segment>,
}

impl Itinerary {
    /// Segments must be time-monotonic: each arrival precedes the next departure.
    pub fn validate(&self) -> CoreResult<()> {
        if self.segments.is_empty() {
            return Err(CoreError::InvariantViolation("itinerary has no segments".into()));
        }
        for pair in self.segments.windows(2) {
            let arrival = pair[0].arrival.at.approximate_utc();
            let next_departure = pair[1].departure.at.approximate_utc();
            if next_departure < arrival {
                return Err(CoreError::InvariantViolation(format!(
                    "segment {} departs before segment {} arrives",
                    pair[1].id, pair[0].id
                )));
            }
        }
        Ok(())
    }

    pub fn origin(&self) -> Option<&str> {
        self.segments.first().map(|s| s.departure.iata_code.as_str())
    }

    pub fn destination(&self) -> Option<&str> {
        self.segments.last().map(|s| s.arrival.iata_code.as_str())
    }

    /// Connections plus technical stops.
    pub fn stops(&self) -> u32 {
        let connections = self.segments.len().saturating_sub(1) as u32;
        connections + self.segments.iter().map(|s| s.number_of_stops).sum::<u32>()
    }

    /// Supplier-stated duration, else elapsed time between first departure and
    /// last arrival.
    pub fn total_minutes(&self) -> Option<i64> {
        if let Some(minutes) = self.duration_minutes {
            return Some(minutes);
        }
        let first = self.segments.first()?.departure.at.to_utc()?;
        let last = self.segments.last()?.arrival.at.to_utc()?;
        Some((last - first).num_minutes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub amount: Decimal,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub currency: String,
    pub total: Decimal,
    pub base: Decimal,
    pub taxes: Vec<Charge>,
    pub fees: Vec<Charge>,
    pub grand_total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelerType {
    Adult,
    Child,
    Senior,
    HeldInfant,
    SeatedInfant,
}

impl TravelerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelerType::Adult => "ADULT",
            TravelerType::Child => "CHILD",
            TravelerType::Senior => "SENIOR",
            TravelerType::HeldInfant => "HELD_INFANT",
            TravelerType::SeatedInfant => "SEATED_INFANT",
        }
    }

    pub fn parse(raw: &str) -> CoreResult<Self> {
        match raw {
            "ADULT" => Ok(TravelerType::Adult),
            "CHILD" => Ok(TravelerType::Child),
            "SENIOR" => Ok(TravelerType::Senior),
            "HELD_INFANT" => Ok(TravelerType::HeldInfant),
            "SEATED_INFANT" => Ok(TravelerType::SeatedInfant),
            other => Err(CoreError::InvalidFormat(format!("traveler type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FareDetail {
    pub segment_id: String,
    pub cabin: Option<CabinClass>,
    pub fare_basis: Option<String>,
    pub booking_class: Option<String>,
    pub included_checked_bags: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelerPricing {
    pub traveler_id: String,
    pub fare_option: String,
    pub traveler_type: TravelerType,
    pub currency: String,
    pub total: Decimal,
    pub base: Decimal,
    pub fare_details: Vec<FareDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConstraints {
    pub last_ticketing_datetime: Option<FlightTime>,
    pub number_of_bookable_seats: Option<u32>,
}

/// A bookable combination of itineraries at a single price from a single provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightOffer {
    pub id: String,
    pub provider: String,
    pub source: String,
    pub search_id: String,
    pub one_way: bool,
    pub itineraries: Vec<Itinerary>,
    pub price: PriceBreakdown,
    pub traveler_pricings: Vec<TravelerPricing>,
    pub validating_airline_codes: Vec<String>,
    pub booking: BookingConstraints,
}

impl FlightOffer {
    pub fn validate(&self) -> CoreResult<()> {
        if self.itineraries.is_empty() {
            return Err(CoreError::InvariantViolation(format!("offer {} has no itineraries", self.id)));
        }
        self.itineraries.iter().try_for_each(Itinerary::validate)
    }

    pub fn outbound(&self) -> Option<&Itinerary> {
        self.itineraries.first()
    }

    pub fn inbound(&self) -> Option<&Itinerary> {
        self.itineraries.get(1)
    }

    pub fn departure(&self) -> Option<&FlightTime> {
        self.outbound()?.segments.first().map(|s| &s.departure.at)
    }

    pub fn arrival(&self) -> Option<&FlightTime> {
        self.outbound()?.segments.last().map(|s| &s.arrival.at)
    }

    /// The carrier that prices the offer, falling back to the first marketing carrier.
    pub fn primary_airline(&self) -> Option<&str> {
        self.validating_airline_codes
            .first()
            .map(String::as_str)
            .or_else(|| self.outbound()?.segments.first().map(|s| s.carrier_code.as_str()))
    }

    pub fn outbound_stops(&self) -> u32 {
        self.outbound().map(Itinerary::stops).unwrap_or(0)
    }

    pub fn is_direct(&self) -> bool {
        self.itineraries.iter().all(|i| i.stops() == 0)
    }

    pub fn outbound_minutes(&self) -> Option<i64> {
        self.outbound()?.total_minutes()
    }

    /// Cabin of the first priced segment.
    pub fn cabin(&self) -> Option<CabinClass> {
        self.traveler_pricings
            .iter()
            .flat_map(|tp| tp.fare_details.iter())
            .find_map(|fd| fd.cabin)
    }

    pub fn baggage_included(&self) -> bool {
        self.traveler_pricings
            .iter()
            .flat_map(|tp| tp.fare_details.iter())
            .any(|fd| fd.included_checked_bags.unwrap_or(0) > 0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn segment(id: &str, from: &str, dep: &str, to: &str, arr: &str) -> Segment {
        Segment {
            id: id.to_string(),
            departure: FlightEndpoint {
                iata_code: from.to_string(),
                terminal: None,
                at: FlightTime::parse(dep).unwrap(),
            },
            arrival: FlightEndpoint {
                iata_code: to.to_string(),
                terminal: None,
                at: FlightTime::parse(arr).unwrap(),
            },
            carrier_code: "BA".to_string(),
            carrier_name: "BRITISH AIRWAYS".to_string(),
            number: "304".to_string(),
            aircraft_code: Some("320".to_string()),
            aircraft_name: None,
            operating_carrier_code: None,
            duration_minutes: None,
            number_of_stops: 0,
            blacklisted_in_eu: false,
        }
    }

    #[test]
    fn test_flight_time_keeps_offset() {
        let t = FlightTime::parse("2025-06-01T10:00:00+02:00").unwrap();
        assert!(t.is_zone_known());
        assert_eq!(t.to_wire(), "2025-06-01T10:00:00+02:00");
        assert_eq!(t.to_utc().unwrap().to_rfc3339(), "2025-06-01T08:00:00+00:00");
    }

    #[test]
    fn test_flight_time_without_zone_is_flagged() {
        let t = FlightTime::parse("2025-06-01T10:00:00").unwrap();
        assert!(!t.is_zone_known());
        assert!(t.to_utc().is_none());
        assert_eq!(t.to_wire(), "2025-06-01T10:00:00");
        assert!(FlightTime::parse("June 1st").is_err());
    }

    #[test]
    fn test_itinerary_monotonic() {
        let ok = Itinerary {
            duration_minutes: None,
            segments: vec![
                segment("1", "LHR", "2025-06-01T08:00:00", "AMS", "2025-06-01T10:20:00"),
                segment("2", "AMS", "2025-06-01T11:05:00", "ATH", "2025-06-01T15:30:00"),
            ],
        };
        assert!(ok.validate().is_ok());
        assert_eq!(ok.stops(), 1);

        let mut broken = ok.clone();
        broken.segments[1].departure.at = FlightTime::parse("2025-06-01T09:00:00").unwrap();
        assert!(matches!(broken.validate(), Err(CoreError::InvariantViolation(_))));
    }

    #[test]
    fn test_total_minutes_from_offsets() {
        let itinerary = Itinerary {
            duration_minutes: None,
            segments: vec![segment(
                "1",
                "LHR",
                "2025-06-01T08:00:00+01:00",
                "CDG",
                "2025-06-01T10:15:00+02:00",
            )],
        };
        assert_eq!(itinerary.total_minutes(), Some(75));
    }
}
