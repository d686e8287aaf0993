//! Vendor JSON shapes. Field names follow the vendor's camelCase; amounts stay
//! strings until the translator parses them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// OAuth2
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: u64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

// ============================================================================
// Flight Offers Search (request)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightOffersSearchRequest {
    pub currency_code: String,
    pub origin_destinations: Vec<OriginDestination>,
    pub travelers: Vec<WireTraveler>,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_criteria: Option<SearchCriteria>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginDestination {
    pub id: String,
    pub origin_location_code: String,
    pub destination_location_code: String,
    pub departure_date_time_range: DateTimeRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeRange {
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTraveler {
    pub id: String,
    pub traveler_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub associated_adult_id: Option<String>,
    pub fare_options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    pub max_flight_offers: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight_filters: Option<FlightFilters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightFilters {
    pub cabin_restrictions: Vec<CabinRestriction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CabinRestriction {
    pub cabin: String,
    pub coverage: String,
    pub origin_destination_ids: Vec<String>,
}

// ============================================================================
// Flight Offers Search (response)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightOffersResponse {
    #[serde(default)]
    pub data: Vec<WireOffer>,
    #[serde(default)]
    pub dictionaries: Dictionaries,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOffer {
    #[serde(rename = "type", default = "default_offer_type")]
    pub offer_type: String,
    pub id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub one_way: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ticketing_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_bookable_seats: Option<u32>,
    pub itineraries: Vec<WireItinerary>,
    pub price: WirePrice,
    #[serde(default)]
    pub validating_airline_codes: Vec<String>,
    #[serde(default)]
    pub traveler_pricings: Vec<WireTravelerPricing>,
}

fn default_offer_type() -> String {
    "flight-offer".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireItinerary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    pub segments: Vec<WireSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSegment {
    pub id: String,
    pub departure: WireEndpoint,
    pub arrival: WireEndpoint,
    pub carrier_code: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aircraft: Option<WireAircraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating: Option<WireOperating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default)]
    pub number_of_stops: u32,
    #[serde(rename = "blacklistedInEU", default)]
    pub blacklisted_in_eu: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEndpoint {
    pub iata_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<String>,
    pub at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireAircraft {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOperating {
    pub carrier_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePrice {
    pub currency: String,
    pub total: String,
    pub base: String,
    #[serde(default)]
    pub fees: Vec<WireFee>,
    #[serde(default)]
    pub taxes: Vec<WireTax>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grand_total: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFee {
    pub amount: String,
    #[serde(rename = "type")]
    pub fee_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTax {
    pub amount: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTravelerPricing {
    pub traveler_id: String,
    pub fare_option: String,
    pub traveler_type: String,
    pub price: WireTravelerPrice,
    #[serde(default)]
    pub fare_details_by_segment: Vec<WireFareDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTravelerPrice {
    pub currency: String,
    pub total: String,
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFareDetail {
    pub segment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cabin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fare_basis: Option<String>,
    #[serde(rename = "class", default, skip_serializing_if = "Option::is_none")]
    pub booking_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included_checked_bags: Option<WireBags>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireBags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

/// Flat code-keyed lookups shipped alongside search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dictionaries {
    #[serde(default)]
    pub locations: BTreeMap<String, WireLocationEntry>,
    #[serde(default)]
    pub aircraft: BTreeMap<String, String>,
    #[serde(default)]
    pub currencies: BTreeMap<String, String>,
    #[serde(default)]
    pub carriers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireLocationEntry {
    #[serde(default)]
    pub city_code: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

// ============================================================================
// Reference Data: Locations
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationsResponse {
    #[serde(default)]
    pub data: Vec<WireLocation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireLocation {
    pub sub_type: String,
    pub name: String,
    pub iata_code: String,
    #[serde(default)]
    pub address: Option<WireAddress>,
    #[serde(default)]
    pub geo_code: Option<WireGeoCode>,
    #[serde(default)]
    pub analytics: Option<WireLocationAnalytics>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAddress {
    #[serde(default)]
    pub city_name: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireGeoCode {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireLocationAnalytics {
    pub travelers: WireTravelerScore,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireTravelerScore {
    pub score: u32,
}
