//! Conversions between domain values and CQL column types.
//!
//! Money is stored as CQL `decimal` so the full precision of the vendor price
//! survives; dates use the driver's raw `date`/`timestamp` representations.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use scylla::value::{CqlDate, CqlDecimal, CqlTimestamp, CqlValue};
use scylla::{DeserializeRow, SerializeRow};
use uuid::Uuid;

use crate::database::{int_to_u32, parse_column};
use crate::error::{StoreError, StoreResult};
use wayfare_core::destination::{RouteDuration, ThemeDefinition, ThemeEntry};
use wayfare_core::inventory::{InventoryRecord, PriceObservation, SearchResultRecord};

/// CQL `date` counts days from 1970-01-01 with the epoch centred at 2^31.
const CQL_DATE_EPOCH_OFFSET: i64 = 1 << 31;

fn epoch() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

pub fn decimal_to_cql(value: Decimal) -> CqlDecimal {
    let mantissa = value.mantissa().to_be_bytes();
    // Shortest two's-complement form: drop leading bytes that only repeat the sign.
    let mut start = 0;
    while start < mantissa.len() - 1 {
        let byte = mantissa[start];
        let next_negative = mantissa[start + 1] & 0x80 != 0;
        if (byte == 0x00 && !next_negative) || (byte == 0xff && next_negative) {
            start += 1;
        } else {
            break;
        }
    }
    CqlDecimal::from_signed_be_bytes_and_exponent(mantissa[start..].to_vec(), value.scale() as i32)
}

pub fn decimal_from_cql(value: &CqlDecimal) -> StoreResult<Decimal> {
    let (bytes, scale) = value.as_signed_be_bytes_slice_and_exponent();
    if bytes.is_empty() || bytes.len() > 16 {
        return Err(StoreError::Corrupt(format!("decimal of {} bytes", bytes.len())));
    }
    let fill = if bytes[0] & 0x80 != 0 { 0xff } else { 0x00 };
    let mut buf = [fill; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    let mantissa = i128::from_be_bytes(buf);

    let scale = u32::try_from(scale).map_err(|_| StoreError::Corrupt(format!("decimal scale {}", scale)))?;
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map_err(|e| StoreError::Corrupt(format!("decimal {}e-{}: {}", mantissa, scale, e)))
}

pub fn date_to_cql(date: NaiveDate) -> CqlDate {
    let days = date.signed_duration_since(epoch()).num_days();
    CqlDate((days + CQL_DATE_EPOCH_OFFSET) as u32)
}

pub fn date_from_cql(date: CqlDate) -> StoreResult<NaiveDate> {
    let days = i64::from(date.0) - CQL_DATE_EPOCH_OFFSET;
    epoch()
        .checked_add_signed(Duration::days(days))
        .ok_or_else(|| StoreError::Corrupt(format!("date {} days from epoch", days)))
}

pub fn timestamp_to_cql(at: DateTime<Utc>) -> CqlTimestamp {
    CqlTimestamp(at.timestamp_millis())
}

pub fn timestamp_from_cql(at: CqlTimestamp) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(at.0).ok_or_else(|| StoreError::Corrupt(format!("timestamp {}", at.0)))
}

fn score_from_cql(column: &str, value: i32) -> StoreResult<u8> {
    u8::try_from(value).map_err(|_| StoreError::Corrupt(format!("{}: {}", column, value)))
}

fn optional_u32(column: &str, value: Option<i32>) -> StoreResult<Option<u32>> {
    value.map(|v| int_to_u32(column, v)).transpose()
}

// ============================================================================
// flight_inventory
// ============================================================================

#[derive(Debug, Clone, SerializeRow, DeserializeRow)]
pub(crate) struct InventoryRow {
    origin: String,
    destination: String,
    departure_date: CqlDate,
    search_timestamp: CqlTimestamp,
    id: Uuid,
    offer_id: String,
    provider: String,
    airline: Option<String>,
    price: CqlDecimal,
    currency: String,
    stops: i32,
    duration_minutes: Option<i64>,
    cabin_class: String,
    bookable_seats: Option<i32>,
    offer_data: String,
}

impl InventoryRow {
    pub(crate) fn encode(record: &InventoryRecord) -> StoreResult<Self> {
        Ok(Self {
            origin: record.origin.clone(),
            destination: record.destination.clone(),
            departure_date: date_to_cql(record.departure_date),
            search_timestamp: timestamp_to_cql(record.search_timestamp),
            id: record.id,
            offer_id: record.offer_id.clone(),
            provider: record.provider.clone(),
            airline: record.airline.clone(),
            price: decimal_to_cql(record.price),
            currency: record.currency.clone(),
            stops: record.stops as i32,
            duration_minutes: record.duration_minutes,
            cabin_class: record.cabin_class.as_str().to_string(),
            bookable_seats: record.bookable_seats.map(|s| s as i32),
            offer_data: serde_json::to_string(&record.offer)?,
        })
    }
}

impl TryFrom<InventoryRow> for InventoryRecord {
    type Error = StoreError;

    fn try_from(row: InventoryRow) -> StoreResult<Self> {
        Ok(InventoryRecord {
            id: row.id,
            origin: row.origin,
            destination: row.destination,
            departure_date: date_from_cql(row.departure_date)?,
            search_timestamp: timestamp_from_cql(row.search_timestamp)?,
            offer_id: row.offer_id,
            provider: row.provider,
            airline: row.airline,
            price: decimal_from_cql(&row.price)?,
            currency: row.currency,
            stops: int_to_u32("stops", row.stops)?,
            duration_minutes: row.duration_minutes,
            cabin_class: parse_column("cabin_class", &row.cabin_class)?,
            bookable_seats: optional_u32("bookable_seats", row.bookable_seats)?,
            offer: serde_json::from_str(&row.offer_data)?,
        })
    }
}

// ============================================================================
// price_history_cass
// ============================================================================

#[derive(Debug, Clone, SerializeRow, DeserializeRow)]
pub(crate) struct ObservationRow {
    route: String,
    price_date: CqlDate,
    search_timestamp: CqlTimestamp,
    id: Uuid,
    price: CqlDecimal,
    currency: String,
    airline: Option<String>,
    provider: String,
}

impl From<&PriceObservation> for ObservationRow {
    fn from(o: &PriceObservation) -> Self {
        Self {
            route: o.route.clone(),
            price_date: date_to_cql(o.price_date),
            search_timestamp: timestamp_to_cql(o.search_timestamp),
            id: o.id,
            price: decimal_to_cql(o.price),
            currency: o.currency.clone(),
            airline: o.airline.clone(),
            provider: o.provider.clone(),
        }
    }
}

impl TryFrom<ObservationRow> for PriceObservation {
    type Error = StoreError;

    fn try_from(row: ObservationRow) -> StoreResult<Self> {
        Ok(PriceObservation {
            route: row.route,
            price_date: date_from_cql(row.price_date)?,
            search_timestamp: timestamp_from_cql(row.search_timestamp)?,
            id: row.id,
            price: decimal_from_cql(&row.price)?,
            currency: row.currency,
            airline: row.airline,
            provider: row.provider,
        })
    }
}

// ============================================================================
// search_results
// ============================================================================

#[derive(Debug, Clone, SerializeRow, DeserializeRow)]
pub(crate) struct SearchResultRow {
    search_request_id: String,
    search_timestamp: CqlTimestamp,
    id: Uuid,
    origin_code: String,
    destination_code: String,
    departure_date: CqlDate,
    price: CqlDecimal,
    currency: String,
    offer_data: String,
}

impl SearchResultRow {
    pub(crate) fn encode(record: &SearchResultRecord) -> StoreResult<Self> {
        Ok(Self {
            search_request_id: record.search_request_id.clone(),
            search_timestamp: timestamp_to_cql(record.search_timestamp),
            id: record.id,
            origin_code: record.origin_code.clone(),
            destination_code: record.destination_code.clone(),
            departure_date: date_to_cql(record.departure_date),
            price: decimal_to_cql(record.price),
            currency: record.currency.clone(),
            offer_data: serde_json::to_string(&record.offer)?,
        })
    }
}

impl TryFrom<SearchResultRow> for SearchResultRecord {
    type Error = StoreError;

    fn try_from(row: SearchResultRow) -> StoreResult<Self> {
        Ok(SearchResultRecord {
            search_request_id: row.search_request_id,
            search_timestamp: timestamp_from_cql(row.search_timestamp)?,
            id: row.id,
            origin_code: row.origin_code,
            destination_code: row.destination_code,
            departure_date: date_from_cql(row.departure_date)?,
            price: decimal_from_cql(&row.price)?,
            currency: row.currency,
            offer: serde_json::from_str(&row.offer_data)?,
        })
    }
}

// ============================================================================
// flight_routes / flight_routes_by_duration
// ============================================================================

/// Same columns in both route tables; only the clustering differs.
#[derive(Debug, Clone, DeserializeRow)]
pub(crate) struct RouteRow {
    origin_airport: String,
    destination_airport: String,
    total_duration_minutes: i32,
    distance_km: f64,
    is_direct: bool,
    typical_stops: i32,
}

impl TryFrom<RouteRow> for RouteDuration {
    type Error = StoreError;

    fn try_from(row: RouteRow) -> StoreResult<Self> {
        Ok(RouteDuration {
            origin: row.origin_airport,
            destination: row.destination_airport,
            duration_minutes: int_to_u32("total_duration_minutes", row.total_duration_minutes)?,
            distance_km: row.distance_km,
            is_direct: row.is_direct,
            typical_stops: int_to_u32("typical_stops", row.typical_stops)?,
        })
    }
}

/// Bind values in `ROUTE_COLUMNS` order.
pub(crate) fn route_values(route: &RouteDuration) -> Vec<CqlValue> {
    vec![
        CqlValue::Text(route.origin.clone()),
        CqlValue::Text(route.destination.clone()),
        CqlValue::Int(route.duration_minutes as i32),
        CqlValue::Double(route.distance_km),
        CqlValue::Boolean(route.is_direct),
        CqlValue::Int(route.typical_stops as i32),
    ]
}

pub(crate) fn route_by_duration_key(origin: &str, duration_minutes: i32, destination: &str) -> Vec<CqlValue> {
    vec![
        CqlValue::Text(origin.to_string()),
        CqlValue::Int(duration_minutes),
        CqlValue::Text(destination.to_string()),
    ]
}

// ============================================================================
// destinations and projections
// ============================================================================

#[derive(Debug, Clone, DeserializeRow)]
pub(crate) struct ThemeEntryRow {
    theme_name: String,
    theme_score: i32,
    destination_id: Uuid,
    iata_code: String,
    city: String,
    country: String,
    country_code: String,
    average_flight_time: f64,
    price_range: String,
    popularity_score: i32,
}

impl TryFrom<ThemeEntryRow> for ThemeEntry {
    type Error = StoreError;

    fn try_from(row: ThemeEntryRow) -> StoreResult<Self> {
        Ok(ThemeEntry {
            theme: parse_column("theme_name", &row.theme_name)?,
            theme_score: score_from_cql("theme_score", row.theme_score)?,
            destination_id: row.destination_id,
            iata_code: row.iata_code,
            city: row.city,
            country: row.country,
            country_code: row.country_code,
            average_flight_time: row.average_flight_time,
            price_range: parse_column("price_range", &row.price_range)?,
            popularity_score: score_from_cql("popularity_score", row.popularity_score)?,
        })
    }
}

/// Bind values in `THEME_ENTRY_COLUMNS` order.
pub(crate) fn theme_entry_values(entry: &ThemeEntry) -> Vec<CqlValue> {
    vec![
        CqlValue::Text(entry.theme.as_str().to_string()),
        CqlValue::Int(i32::from(entry.theme_score)),
        CqlValue::Uuid(entry.destination_id),
        CqlValue::Text(entry.iata_code.clone()),
        CqlValue::Text(entry.city.clone()),
        CqlValue::Text(entry.country.clone()),
        CqlValue::Text(entry.country_code.clone()),
        CqlValue::Double(entry.average_flight_time),
        CqlValue::Text(entry.price_range.as_str().to_string()),
        CqlValue::Int(i32::from(entry.popularity_score)),
    ]
}

pub(crate) fn theme_entry_key(entry: &ThemeEntry) -> Vec<CqlValue> {
    vec![
        CqlValue::Text(entry.theme.as_str().to_string()),
        CqlValue::Int(i32::from(entry.theme_score)),
        CqlValue::Uuid(entry.destination_id),
    ]
}

#[derive(Debug, Clone, DeserializeRow)]
pub(crate) struct ThemeDefinitionRow {
    theme_key: String,
    display_name: String,
    description: String,
    icon: Option<String>,
}

impl TryFrom<ThemeDefinitionRow> for ThemeDefinition {
    type Error = StoreError;

    fn try_from(row: ThemeDefinitionRow) -> StoreResult<Self> {
        Ok(ThemeDefinition {
            theme: parse_column("theme_key", &row.theme_key)?,
            display_name: row.display_name,
            description: row.description,
            icon: row.icon,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;
    use wayfare_core::destination::{PriceRange, Theme};

    #[test]
    fn test_decimal_keeps_precision() {
        for raw in ["0", "85.00", "1234.5678", "-12.5", "0.000001", "79228162514264337593543950335", "-128", "127", "128"] {
            let value = Decimal::from_str(raw).unwrap();
            let back = decimal_from_cql(&decimal_to_cql(value)).unwrap();
            assert_eq!(back, value, "{}", raw);
            assert_eq!(back.scale(), value.scale(), "{}", raw);
        }
    }

    #[test]
    fn test_decimal_uses_minimal_bytes() {
        let cql = decimal_to_cql(dec!(1.27));
        let (bytes, scale) = cql.as_signed_be_bytes_slice_and_exponent();
        assert_eq!(bytes, &[127]);
        assert_eq!(scale, 2);

        let cql = decimal_to_cql(dec!(128));
        let (bytes, _) = cql.as_signed_be_bytes_slice_and_exponent();
        assert_eq!(bytes, &[0x00, 0x80]);

        let cql = decimal_to_cql(dec!(-1));
        let (bytes, _) = cql.as_signed_be_bytes_slice_and_exponent();
        assert_eq!(bytes, &[0xff]);
    }

    #[test]
    fn test_negative_scale_is_corrupt() {
        let cql = CqlDecimal::from_signed_be_bytes_and_exponent(vec![1], -2);
        assert!(matches!(decimal_from_cql(&cql), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_date_epoch_offset() {
        assert_eq!(date_to_cql(epoch()).0, 1u32 << 31);
        let d = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(date_from_cql(date_to_cql(d)).unwrap(), d);
        let before = NaiveDate::from_ymd_opt(1960, 2, 29).unwrap();
        assert_eq!(date_from_cql(date_to_cql(before)).unwrap(), before);
    }

    #[test]
    fn test_timestamp_millisecond_precision() {
        let at = DateTime::parse_from_rfc3339("2025-06-01T10:00:00.123456Z").unwrap().with_timezone(&Utc);
        let back = timestamp_from_cql(timestamp_to_cql(at)).unwrap();
        assert_eq!(back.timestamp_millis(), at.timestamp_millis());
    }

    #[test]
    fn test_theme_entry_row_decodes() {
        let row = ThemeEntryRow {
            theme_name: "beach".into(),
            theme_score: 90,
            destination_id: Uuid::new_v4(),
            iata_code: "FAO".into(),
            city: "Faro".into(),
            country: "Portugal".into(),
            country_code: "PT".into(),
            average_flight_time: 2.8,
            price_range: "mid-range".into(),
            popularity_score: 75,
        };
        let entry = ThemeEntry::try_from(row).unwrap();
        assert_eq!(entry.theme, Theme::Beach);
        assert_eq!(entry.price_range, PriceRange::MidRange);
        assert_eq!(theme_entry_values(&entry).len(), 10);
        assert_eq!(theme_entry_key(&entry)[1], CqlValue::Int(90));
    }

    #[test]
    fn test_out_of_range_score_is_corrupt() {
        assert!(score_from_cql("theme_score", 300).is_err());
        assert!(score_from_cql("theme_score", -1).is_err());
        assert_eq!(score_from_cql("theme_score", 100).unwrap(), 100);
    }

    #[test]
    fn test_route_row_decodes() {
        let row = RouteRow {
            origin_airport: "LHR".into(),
            destination_airport: "MAD".into(),
            total_duration_minutes: 150,
            distance_km: 1250.0,
            is_direct: true,
            typical_stops: 0,
        };
        let route = RouteDuration::try_from(row).unwrap();
        assert_eq!(route.duration_minutes, 150);
        assert_eq!(route_values(&route)[2], CqlValue::Int(150));
    }
}
