use chrono::NaiveDate;
use tracing::warn;

use crate::wire::*;
use wayfare_core::airport::{Airport, AirportType};
use wayfare_core::money::parse_amount;
use wayfare_core::offer::{
    BookingConstraints, Charge, FareDetail, FlightEndpoint, FlightOffer, FlightTime, Itinerary,
    PriceBreakdown, Segment, TravelerPricing, TravelerType,
};
use wayfare_core::search::{CabinClass, FlightSearchRequest};
use wayfare_core::{CoreError, CoreResult};
use wayfare_shared::AppResult;

pub const GDS_SOURCE: &str = "GDS";
pub const CABIN_COVERAGE: &str = "MOST_SEGMENTS";
const STANDARD_FARE: &str = "STANDARD";

// ============================================================================
// Canonical -> Vendor
// ============================================================================

/// Build the shopping request body for a canonical search.
pub fn build_search_request(request: &FlightSearchRequest) -> FlightOffersSearchRequest {
    let mut origin_destinations = vec![OriginDestination {
        id: "1".to_string(),
        origin_location_code: request.origin.clone(),
        destination_location_code: request.destination.clone(),
        departure_date_time_range: DateTimeRange {
            date: request.departure_date.to_string(),
            time: None,
        },
    }];
    if let Some(return_date) = request.return_date {
        origin_destinations.push(OriginDestination {
            id: "2".to_string(),
            origin_location_code: request.destination.clone(),
            destination_location_code: request.origin.clone(),
            departure_date_time_range: DateTimeRange { date: return_date.to_string(), time: None },
        });
    }

    FlightOffersSearchRequest {
        currency_code: request.currency.clone(),
        origin_destinations,
        travelers: travelers(request),
        sources: vec![GDS_SOURCE.to_string()],
        search_criteria: Some(SearchCriteria {
            max_flight_offers: request.max_results,
            flight_filters: Some(FlightFilters {
                cabin_restrictions: vec![CabinRestriction {
                    cabin: request.cabin_class.as_str().to_string(),
                    coverage: CABIN_COVERAGE.to_string(),
                    origin_destination_ids: vec!["1".to_string()],
                }],
            }),
        }),
    }
}

/// Adults, then children, then held infants; ids are sequential from "1" and
/// every infant travels on the lap of traveler "1".
fn travelers(request: &FlightSearchRequest) -> Vec<WireTraveler> {
    let kinds = std::iter::repeat(TravelerType::Adult)
        .take(request.adults as usize)
        .chain(std::iter::repeat(TravelerType::Child).take(request.children as usize))
        .chain(std::iter::repeat(TravelerType::HeldInfant).take(request.infants as usize));

    kinds
        .enumerate()
        .map(|(idx, kind)| WireTraveler {
            id: (idx + 1).to_string(),
            traveler_type: kind.as_str().to_string(),
            associated_adult_id: (kind == TravelerType::HeldInfant).then(|| "1".to_string()),
            fare_options: vec![STANDARD_FARE.to_string()],
        })
        .collect()
}

/// Render canonical offers back into a vendor response, dictionaries included.
pub fn to_wire_response(offers: &[FlightOffer]) -> FlightOffersResponse {
    let mut dictionaries = Dictionaries::default();
    for segment in offers.iter().flat_map(|o| o.itineraries.iter()).flat_map(|i| i.segments.iter()) {
        dictionaries
            .carriers
            .insert(segment.carrier_code.clone(), segment.carrier_name.clone());
        if let (Some(code), Some(name)) = (&segment.aircraft_code, &segment.aircraft_name) {
            dictionaries.aircraft.insert(code.clone(), name.clone());
        }
    }
    FlightOffersResponse { data: offers.iter().map(to_wire_offer).collect(), dictionaries }
}

pub fn to_wire_offer(offer: &FlightOffer) -> WireOffer {
    WireOffer {
        offer_type: "flight-offer".to_string(),
        id: offer.id.clone(),
        source: offer.source.clone(),
        one_way: offer.one_way,
        last_ticketing_date_time: offer.booking.last_ticketing_datetime.map(|t| t.to_wire()),
        number_of_bookable_seats: offer.booking.number_of_bookable_seats,
        itineraries: offer
            .itineraries
            .iter()
            .map(|i| WireItinerary {
                duration: i.duration_minutes.map(format_iso_duration),
                segments: i.segments.iter().map(to_wire_segment).collect(),
            })
            .collect(),
        price: WirePrice {
            currency: offer.price.currency.clone(),
            total: offer.price.total.to_string(),
            base: offer.price.base.to_string(),
            fees: offer
                .price
                .fees
                .iter()
                .map(|c| WireFee { amount: c.amount.to_string(), fee_type: c.code.clone() })
                .collect(),
            taxes: offer
                .price
                .taxes
                .iter()
                .map(|c| WireTax { amount: c.amount.to_string(), code: c.code.clone() })
                .collect(),
            grand_total: Some(offer.price.grand_total.to_string()),
        },
        validating_airline_codes: offer.validating_airline_codes.clone(),
        traveler_pricings: offer
            .traveler_pricings
            .iter()
            .map(|tp| WireTravelerPricing {
                traveler_id: tp.traveler_id.clone(),
                fare_option: tp.fare_option.clone(),
                traveler_type: tp.traveler_type.as_str().to_string(),
                price: WireTravelerPrice {
                    currency: tp.currency.clone(),
                    total: tp.total.to_string(),
                    base: tp.base.to_string(),
                },
                fare_details_by_segment: tp
                    .fare_details
                    .iter()
                    .map(|fd| WireFareDetail {
                        segment_id: fd.segment_id.clone(),
                        cabin: fd.cabin.map(|c| c.as_str().to_string()),
                        fare_basis: fd.fare_basis.clone(),
                        booking_class: fd.booking_class.clone(),
                        included_checked_bags: fd
                            .included_checked_bags
                            .map(|quantity| WireBags { quantity: Some(quantity) }),
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn to_wire_segment(segment: &Segment) -> WireSegment {
    let endpoint = |e: &FlightEndpoint| WireEndpoint {
        iata_code: e.iata_code.clone(),
        terminal: e.terminal.clone(),
        at: e.at.to_wire(),
    };
    WireSegment {
        id: segment.id.clone(),
        departure: endpoint(&segment.departure),
        arrival: endpoint(&segment.arrival),
        carrier_code: segment.carrier_code.clone(),
        number: segment.number.clone(),
        aircraft: segment.aircraft_code.clone().map(|code| WireAircraft { code }),
        operating: segment
            .operating_carrier_code
            .clone()
            .map(|carrier_code| WireOperating { carrier_code }),
        duration: segment.duration_minutes.map(format_iso_duration),
        number_of_stops: segment.number_of_stops,
        blacklisted_in_eu: segment.blacklisted_in_eu,
    }
}

// ============================================================================
// Vendor -> Canonical
// ============================================================================

/// Translate a whole search response. Malformed amounts or timestamps fail
/// the response; offers whose itineraries break time ordering are dropped.
pub fn translate_response(
    response: &FlightOffersResponse,
    provider: &str,
    search_id: &str,
) -> AppResult<Vec<FlightOffer>> {
    let mut offers = Vec::with_capacity(response.data.len());
    for wire in &response.data {
        let offer = translate_offer(wire, &response.dictionaries, provider, search_id)?;
        match offer.validate() {
            Ok(()) => offers.push(offer),
            Err(e) => warn!(offer_id = %wire.id, error = %e, "dropping inconsistent vendor offer"),
        }
    }
    Ok(offers)
}

pub fn translate_offer(
    wire: &WireOffer,
    dictionaries: &Dictionaries,
    provider: &str,
    search_id: &str,
) -> CoreResult<FlightOffer> {
    let itineraries = wire
        .itineraries
        .iter()
        .map(|i| {
            Ok(Itinerary {
                duration_minutes: i.duration.as_deref().map(parse_iso_duration).transpose()?,
                segments: i
                    .segments
                    .iter()
                    .map(|s| translate_segment(s, dictionaries))
                    .collect::<CoreResult<Vec<_>>>()?,
            })
        })
        .collect::<CoreResult<Vec<_>>>()?;

    let total = parse_amount(&wire.price.total)?;
    let price = PriceBreakdown {
        currency: wire.price.currency.clone(),
        total,
        base: parse_amount(&wire.price.base)?,
        taxes: wire
            .price
            .taxes
            .iter()
            .map(|t| Ok(Charge { amount: parse_amount(&t.amount)?, code: t.code.clone() }))
            .collect::<CoreResult<Vec<_>>>()?,
        fees: wire
            .price
            .fees
            .iter()
            .map(|f| Ok(Charge { amount: parse_amount(&f.amount)?, code: f.fee_type.clone() }))
            .collect::<CoreResult<Vec<_>>>()?,
        grand_total: match &wire.price.grand_total {
            Some(raw) => parse_amount(raw)?,
            None => total,
        },
    };

    let traveler_pricings = wire
        .traveler_pricings
        .iter()
        .map(translate_traveler_pricing)
        .collect::<CoreResult<Vec<_>>>()?;

    Ok(FlightOffer {
        id: wire.id.clone(),
        provider: provider.to_string(),
        source: wire.source.clone(),
        search_id: search_id.to_string(),
        one_way: wire.one_way,
        itineraries,
        price,
        traveler_pricings,
        validating_airline_codes: wire.validating_airline_codes.clone(),
        booking: BookingConstraints {
            last_ticketing_datetime: wire
                .last_ticketing_date_time
                .as_deref()
                .map(parse_ticketing)
                .transpose()?,
            number_of_bookable_seats: wire.number_of_bookable_seats,
        },
    })
}

fn translate_segment(wire: &WireSegment, dictionaries: &Dictionaries) -> CoreResult<Segment> {
    let endpoint = |e: &WireEndpoint| -> CoreResult<FlightEndpoint> {
        Ok(FlightEndpoint {
            iata_code: e.iata_code.clone(),
            terminal: e.terminal.clone(),
            at: FlightTime::parse(&e.at)?,
        })
    };
    let aircraft_code = wire.aircraft.as_ref().map(|a| a.code.clone());
    Ok(Segment {
        id: wire.id.clone(),
        departure: endpoint(&wire.departure)?,
        arrival: endpoint(&wire.arrival)?,
        carrier_code: wire.carrier_code.clone(),
        carrier_name: lookup(&dictionaries.carriers, &wire.carrier_code),
        number: wire.number.clone(),
        aircraft_name: aircraft_code.as_deref().map(|code| lookup(&dictionaries.aircraft, code)),
        aircraft_code,
        operating_carrier_code: wire.operating.as_ref().map(|o| o.carrier_code.clone()),
        duration_minutes: wire.duration.as_deref().map(parse_iso_duration).transpose()?,
        number_of_stops: wire.number_of_stops,
        blacklisted_in_eu: wire.blacklisted_in_eu,
    })
}

fn translate_traveler_pricing(wire: &WireTravelerPricing) -> CoreResult<TravelerPricing> {
    Ok(TravelerPricing {
        traveler_id: wire.traveler_id.clone(),
        fare_option: wire.fare_option.clone(),
        traveler_type: TravelerType::parse(&wire.traveler_type)?,
        currency: wire.price.currency.clone(),
        total: parse_amount(&wire.price.total)?,
        base: parse_amount(&wire.price.base)?,
        fare_details: wire
            .fare_details_by_segment
            .iter()
            .map(|fd| {
                Ok(FareDetail {
                    segment_id: fd.segment_id.clone(),
                    cabin: fd.cabin.as_deref().map(str::parse::<CabinClass>).transpose()?,
                    fare_basis: fd.fare_basis.clone(),
                    booking_class: fd.booking_class.clone(),
                    included_checked_bags: fd.included_checked_bags.as_ref().and_then(|b| b.quantity),
                })
            })
            .collect::<CoreResult<Vec<_>>>()?,
    })
}

/// Dictionary misses fall back to the raw code.
fn lookup(dictionary: &std::collections::BTreeMap<String, String>, code: &str) -> String {
    dictionary.get(code).cloned().unwrap_or_else(|| code.to_string())
}

/// Ticketing deadlines arrive either as a date or as a local datetime.
fn parse_ticketing(raw: &str) -> CoreResult<FlightTime> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| CoreError::InvalidFormat(format!("ticketing date '{}'", raw)))?;
        return Ok(FlightTime::local(midnight));
    }
    FlightTime::parse(raw)
}

/// Minutes in an ISO-8601 duration such as `PT2H15M` or `P1DT3H`. Seconds
/// round to the nearest minute.
pub fn parse_iso_duration(raw: &str) -> CoreResult<i64> {
    let invalid = || CoreError::InvalidFormat(format!("duration '{}'", raw));
    let rest = raw.strip_prefix('P').ok_or_else(invalid)?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, t),
        None => (rest, ""),
    };
    if date_part.is_empty() && time_part.is_empty() {
        return Err(invalid());
    }

    let mut seconds: i64 = 0;
    for (part, units) in [(date_part, &[('D', 86_400)][..]), (time_part, &[('H', 3600), ('M', 60), ('S', 1)][..])] {
        let mut number = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() {
                number.push(c);
                continue;
            }
            let scale = units.iter().find(|(u, _)| *u == c).map(|(_, s)| *s).ok_or_else(invalid)?;
            let value: i64 = number.parse().map_err(|_| invalid())?;
            seconds = value
                .checked_mul(scale)
                .and_then(|v| seconds.checked_add(v))
                .ok_or_else(invalid)?;
            number.clear();
        }
        if !number.is_empty() {
            return Err(invalid());
        }
    }
    Ok(seconds.checked_add(30).ok_or_else(invalid)? / 60)
}

pub fn format_iso_duration(minutes: i64) -> String {
    let (hours, mins) = (minutes / 60, minutes % 60);
    match (hours, mins) {
        (0, m) => format!("PT{}M", m),
        (h, 0) => format!("PT{}H", h),
        (h, m) => format!("PT{}H{}M", h, m),
    }
}

// ============================================================================
// Reference Data
// ============================================================================

pub fn translate_locations(response: &LocationsResponse) -> Vec<Airport> {
    response
        .data
        .iter()
        .map(|loc| {
            let address = loc.address.as_ref();
            Airport {
                code: loc.iata_code.clone(),
                name: loc.name.clone(),
                city: address
                    .and_then(|a| a.city_name.clone())
                    .unwrap_or_else(|| loc.name.clone()),
                country: address.and_then(|a| a.country_name.clone()).unwrap_or_default(),
                country_code: address.and_then(|a| a.country_code.clone()).unwrap_or_default(),
                airport_type: if loc.sub_type.eq_ignore_ascii_case("CITY") {
                    AirportType::City
                } else {
                    AirportType::Airport
                },
                popularity: loc.analytics.as_ref().map(|a| a.travelers.score).unwrap_or(0),
                latitude: loc.geo_code.as_ref().map(|g| g.latitude),
                longitude: loc.geo_code.as_ref().map(|g| g.longitude),
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wayfare_shared::codes;

    pub const ROUND_TRIP_RESPONSE: &str = r#"{
        "data": [{
            "type": "flight-offer",
            "id": "1",
            "source": "GDS",
            "oneWay": false,
            "lastTicketingDateTime": "2025-05-30",
            "numberOfBookableSeats": 7,
            "itineraries": [
                {
                    "duration": "PT1H15M",
                    "segments": [{
                        "id": "1",
                        "departure": {"iataCode": "LHR", "terminal": "5", "at": "2025-06-01T08:00:00"},
                        "arrival": {"iataCode": "CDG", "terminal": "2A", "at": "2025-06-01T10:15:00"},
                        "carrierCode": "BA",
                        "number": "304",
                        "aircraft": {"code": "320"},
                        "duration": "PT1H15M",
                        "numberOfStops": 0,
                        "blacklistedInEU": false
                    }]
                },
                {
                    "duration": "PT1H20M",
                    "segments": [{
                        "id": "2",
                        "departure": {"iataCode": "CDG", "at": "2025-06-08T18:00:00"},
                        "arrival": {"iataCode": "LHR", "at": "2025-06-08T18:20:00"},
                        "carrierCode": "AF",
                        "number": "1080",
                        "aircraft": {"code": "321"},
                        "operating": {"carrierCode": "AF"},
                        "duration": "PT1H20M",
                        "numberOfStops": 0,
                        "blacklistedInEU": false
                    }]
                }
            ],
            "price": {
                "currency": "EUR",
                "total": "185.43",
                "base": "120.00",
                "fees": [{"amount": "0.00", "type": "SUPPLIER"}],
                "taxes": [{"amount": "65.43", "code": "GB"}],
                "grandTotal": "185.43"
            },
            "validatingAirlineCodes": ["BA"],
            "travelerPricings": [{
                "travelerId": "1",
                "fareOption": "STANDARD",
                "travelerType": "ADULT",
                "price": {"currency": "EUR", "total": "185.43", "base": "120.00"},
                "fareDetailsBySegment": [
                    {"segmentId": "1", "cabin": "ECONOMY", "fareBasis": "OLN0", "class": "O",
                     "includedCheckedBags": {"quantity": 1}},
                    {"segmentId": "2", "cabin": "ECONOMY", "fareBasis": "RLN0", "class": "R"}
                ]
            }]
        }],
        "dictionaries": {
            "locations": {"LHR": {"cityCode": "LON", "countryCode": "GB"}},
            "aircraft": {"320": "AIRBUS A320"},
            "carriers": {"BA": "BRITISH AIRWAYS"}
        }
    }"#;

    pub fn response() -> FlightOffersResponse {
        serde_json::from_str(ROUND_TRIP_RESPONSE).unwrap()
    }

    fn request() -> FlightSearchRequest {
        FlightSearchRequest::one_way("LHR", "CDG", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
    }

    #[test]
    fn test_one_way_request_shape() {
        let mut req = request();
        req.adults = 2;
        req.children = 1;
        req.infants = 1;
        req.cabin_class = CabinClass::Business;
        let body = serde_json::to_value(build_search_request(&req)).unwrap();

        assert_eq!(body["currencyCode"], "EUR");
        assert_eq!(body["sources"], serde_json::json!(["GDS"]));
        assert_eq!(body["originDestinations"].as_array().unwrap().len(), 1);
        assert_eq!(body["originDestinations"][0]["id"], "1");
        assert_eq!(body["originDestinations"][0]["departureDateTimeRange"]["date"], "2025-06-01");

        let travelers = body["travelers"].as_array().unwrap();
        let types: Vec<&str> = travelers.iter().map(|t| t["travelerType"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["ADULT", "ADULT", "CHILD", "HELD_INFANT"]);
        assert_eq!(travelers[3]["id"], "4");
        assert_eq!(travelers[3]["associatedAdultId"], "1");
        assert!(travelers[0].get("associatedAdultId").is_none());

        let restriction = &body["searchCriteria"]["flightFilters"]["cabinRestrictions"][0];
        assert_eq!(restriction["cabin"], "BUSINESS");
        assert_eq!(restriction["coverage"], "MOST_SEGMENTS");
        assert_eq!(restriction["originDestinationIds"], serde_json::json!(["1"]));
    }

    #[test]
    fn test_round_trip_request_has_two_legs() {
        let mut req = request();
        req.return_date = NaiveDate::from_ymd_opt(2025, 6, 8);
        let wire = build_search_request(&req);
        let ids: Vec<&str> = wire.origin_destinations.iter().map(|od| od.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(wire.origin_destinations[1].origin_location_code, "CDG");
        assert_eq!(wire.origin_destinations[1].departure_date_time_range.date, "2025-06-08");
    }

    #[test]
    fn test_translate_keeps_precision_and_order() {
        let offers = translate_response(&response(), "amadeus", "abc").unwrap();
        assert_eq!(offers.len(), 1);
        let offer = &offers[0];
        assert_eq!(offer.price.total, dec!(185.43));
        assert_eq!(offer.price.base.to_string(), "120.00");
        assert_eq!(offer.itineraries[0].origin(), Some("LHR"));
        assert_eq!(offer.itineraries[1].origin(), Some("CDG"));
        assert_eq!(offer.outbound_minutes(), Some(75));
        assert_eq!(offer.cabin(), Some(CabinClass::Economy));
        assert!(offer.baggage_included());
        assert_eq!(offer.provider, "amadeus");
        assert_eq!(offer.search_id, "abc");
    }

    #[test]
    fn test_dictionary_misses_fall_back_to_code() {
        let offers = translate_response(&response(), "amadeus", "abc").unwrap();
        let outbound = &offers[0].itineraries[0].segments[0];
        let inbound = &offers[0].itineraries[1].segments[0];
        assert_eq!(outbound.carrier_name, "BRITISH AIRWAYS");
        assert_eq!(outbound.aircraft_name.as_deref(), Some("AIRBUS A320"));
        assert_eq!(inbound.carrier_name, "AF");
        assert_eq!(inbound.aircraft_name.as_deref(), Some("321"));
    }

    #[test]
    fn test_times_without_zone_stay_local() {
        let offers = translate_response(&response(), "amadeus", "abc").unwrap();
        let departure = offers[0].departure().unwrap();
        assert!(!departure.is_zone_known());
        assert_eq!(departure.to_wire(), "2025-06-01T08:00:00");
    }

    #[test]
    fn test_canonical_wire_round_trip() {
        let first = translate_response(&response(), "amadeus", "abc").unwrap();
        let wire = to_wire_response(&first);
        let json = serde_json::to_string(&wire).unwrap();
        let reparsed: FlightOffersResponse = serde_json::from_str(&json).unwrap();
        let second = translate_response(&reparsed, "amadeus", "abc").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_malformed_price_is_invalid_format() {
        let mut bad = response();
        bad.data[0].price.total = "18x.43".to_string();
        let err = translate_response(&bad, "amadeus", "abc").unwrap_err();
        assert!(err.is(codes::INVALID_FORMAT));
    }

    #[test]
    fn test_out_of_order_offer_is_dropped() {
        let mut bad = response();
        let template = bad.data[0].itineraries[0].segments[0].clone();
        bad.data[0].itineraries[0].segments.push(WireSegment {
            id: "9".to_string(),
            departure: WireEndpoint { iata_code: "CDG".into(), terminal: None, at: "2025-06-01T09:00:00".into() },
            arrival: WireEndpoint { iata_code: "NCE".into(), terminal: None, at: "2025-06-01T10:30:00".into() },
            ..template
        });
        assert!(translate_response(&bad, "amadeus", "abc").unwrap().is_empty());
    }

    #[test]
    fn test_iso_durations() {
        assert_eq!(parse_iso_duration("PT2H15M").unwrap(), 135);
        assert_eq!(parse_iso_duration("PT45M").unwrap(), 45);
        assert_eq!(parse_iso_duration("P1DT2H").unwrap(), 1560);
        assert_eq!(parse_iso_duration("PT1H29M40S").unwrap(), 90);
        assert!(parse_iso_duration("2H").is_err());
        assert!(parse_iso_duration("PT").is_err());
        assert!(parse_iso_duration("PT5X").is_err());
        assert_eq!(format_iso_duration(135), "PT2H15M");
        assert_eq!(format_iso_duration(120), "PT2H");
        assert_eq!(format_iso_duration(45), "PT45M");
    }

    #[test]
    fn test_oversized_duration_is_invalid_format() {
        let err = parse_iso_duration("P999999999999999D").unwrap_err();
        assert!(matches!(err, CoreError::InvalidFormat(_)));
        assert!(parse_iso_duration("PT9223372036854775807S").is_err());
        assert!(parse_iso_duration("P99999999999999999999D").is_err());
    }

    #[test]
    fn test_locations_translation() {
        let raw = r#"{"data": [
            {"type": "location", "subType": "AIRPORT", "name": "HEATHROW", "iataCode": "LHR",
             "address": {"cityName": "LONDON", "countryName": "UNITED KINGDOM", "countryCode": "GB"},
             "geoCode": {"latitude": 51.47, "longitude": -0.45},
             "analytics": {"travelers": {"score": 45}}},
            {"type": "location", "subType": "CITY", "name": "LONDON", "iataCode": "LON"}
        ]}"#;
        let response: LocationsResponse = serde_json::from_str(raw).unwrap();
        let airports = translate_locations(&response);
        assert_eq!(airports[0].city, "LONDON");
        assert_eq!(airports[0].popularity, 45);
        assert_eq!(airports[1].airport_type, AirportType::City);
        assert_eq!(airports[1].city, "LONDON");
    }
}
