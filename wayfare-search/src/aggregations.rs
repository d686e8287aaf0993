//! Aggregation requests and their decoded results. The engine reports
//! metrics as doubles, so amounts are converted back to decimals rounded to
//! cents at this boundary.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::{SearchError, SearchResult};

pub const PRICE_INTERVAL: u32 = 50;
pub const DURATION_INTERVAL: u32 = 60;
pub const PERCENTILES: [f64; 5] = [25.0, 50.0, 75.0, 90.0, 95.0];
const TERMS_SIZE: u32 = 50;

fn money(value: &Value) -> Option<Decimal> {
    value
        .as_f64()
        .and_then(Decimal::from_f64_retain)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

fn count(value: &Value) -> u64 {
    value.as_u64().unwrap_or(0)
}

fn buckets<'a>(aggs: &'a Value, name: &str) -> SearchResult<&'a Vec<Value>> {
    aggs[name]["buckets"]
        .as_array()
        .ok_or_else(|| SearchError::UnexpectedResponse(format!("aggregation '{}' missing", name)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeBucket {
    pub from: Decimal,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermBucket {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeBucket {
    pub at: DateTime<Utc>,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Facets {
    pub prices: Vec<RangeBucket>,
    pub durations: Vec<RangeBucket>,
    pub airlines: Vec<TermBucket>,
    pub stops: Vec<TermBucket>,
    pub cabin_classes: Vec<TermBucket>,
    pub departure_hours: Vec<TimeBucket>,
}

impl Facets {
    pub fn request() -> Value {
        json!({
            "price_histogram": { "histogram": { "field": "price", "interval": PRICE_INTERVAL, "min_doc_count": 1 } },
            "duration_histogram": { "histogram": { "field": "duration_minutes", "interval": DURATION_INTERVAL, "min_doc_count": 1 } },
            "airlines": { "terms": { "field": "airline", "size": TERMS_SIZE } },
            "stops": { "terms": { "field": "stops", "size": 10 } },
            "cabin_classes": { "terms": { "field": "cabin_class", "size": 4 } },
            "departure_hours": { "date_histogram": { "field": "departure_time", "fixed_interval": "1h", "min_doc_count": 1 } }
        })
    }

    pub fn parse(aggs: &Value) -> SearchResult<Self> {
        let ranges = |name: &str| -> SearchResult<Vec<RangeBucket>> {
            Ok(buckets(aggs, name)?
                .iter()
                .filter_map(|b| Some(RangeBucket { from: money(&b["key"])?, count: count(&b["doc_count"]) }))
                .collect())
        };
        let terms = |name: &str| -> SearchResult<Vec<TermBucket>> {
            Ok(buckets(aggs, name)?
                .iter()
                .map(|b| TermBucket { key: term_key(&b["key"]), count: count(&b["doc_count"]) })
                .collect())
        };
        let departure_hours = buckets(aggs, "departure_hours")?
            .iter()
            .filter_map(|b| {
                let at = DateTime::from_timestamp_millis(b["key"].as_i64()?)?;
                Some(TimeBucket { at, count: count(&b["doc_count"]) })
            })
            .collect();

        Ok(Self {
            prices: ranges("price_histogram")?,
            durations: ranges("duration_histogram")?,
            airlines: terms("airlines")?,
            stops: terms("stops")?,
            cabin_classes: terms("cabin_classes")?,
            departure_hours,
        })
    }
}

/// Term keys arrive as strings for keyword fields and numbers for numeric ones.
fn term_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPrice {
    pub date: NaiveDate,
    pub average_price: Option<Decimal>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteInsights {
    pub origin: String,
    pub destination: String,
    pub days: u32,
    pub sample_count: u64,
    pub min_price: Option<Decimal>,
    pub avg_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    /// Keyed by percentile label ("25", "50", ...).
    pub percentiles: BTreeMap<String, Decimal>,
    pub daily: Vec<DailyPrice>,
}

fn route_filter(origin: &str, destination: &str, since: DateTime<Utc>) -> Value {
    json!({
        "bool": {
            "filter": [
                { "term": { "origin_airport": origin } },
                { "term": { "destination_airport": destination } },
                { "range": { "indexed_at": { "gte": since.to_rfc3339() } } }
            ]
        }
    })
}

impl RouteInsights {
    pub fn request(origin: &str, destination: &str, days: u32, now: DateTime<Utc>) -> Value {
        let since = now - Duration::days(i64::from(days));
        json!({
            "size": 0,
            "query": route_filter(origin, destination, since),
            "aggs": {
                "price_stats": { "stats": { "field": "price" } },
                "price_percentiles": { "percentiles": { "field": "price", "percents": PERCENTILES } },
                "daily": {
                    "date_histogram": { "field": "indexed_at", "calendar_interval": "day", "min_doc_count": 0 },
                    "aggs": { "avg_price": { "avg": { "field": "price" } } }
                }
            }
        })
    }

    pub fn parse(origin: &str, destination: &str, days: u32, aggs: &Value) -> SearchResult<Self> {
        let stats = &aggs["price_stats"];
        let percentiles = aggs["price_percentiles"]["values"]
            .as_object()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|(label, v)| Some((percentile_label(label), money(v)?)))
                    .collect()
            })
            .unwrap_or_default();
        let daily = buckets(aggs, "daily")?
            .iter()
            .filter_map(|b| {
                let at = DateTime::from_timestamp_millis(b["key"].as_i64()?)?;
                Some(DailyPrice {
                    date: at.date_naive(),
                    average_price: money(&b["avg_price"]["value"]),
                    count: count(&b["doc_count"]),
                })
            })
            .collect();

        Ok(Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            days,
            sample_count: count(&stats["count"]),
            min_price: money(&stats["min"]),
            avg_price: money(&stats["avg"]),
            max_price: money(&stats["max"]),
            percentiles,
            daily,
        })
    }
}

/// "25.0" -> "25"
fn percentile_label(raw: &str) -> String {
    raw.strip_suffix(".0").unwrap_or(raw).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirlineStats {
    pub airline: String,
    pub flight_count: u64,
    pub avg_price: Option<Decimal>,
    pub min_price: Option<Decimal>,
    pub avg_duration_hours: Option<f64>,
    pub avg_stops: Option<f64>,
}

impl AirlineStats {
    pub fn request(origin: &str, destination: &str, days: u32, now: DateTime<Utc>) -> Value {
        let since = now - Duration::days(i64::from(days));
        json!({
            "size": 0,
            "query": route_filter(origin, destination, since),
            "aggs": {
                "airlines": {
                    "terms": { "field": "airline", "size": TERMS_SIZE },
                    "aggs": {
                        "avg_price": { "avg": { "field": "price" } },
                        "min_price": { "min": { "field": "price" } },
                        "avg_duration": { "avg": { "field": "duration_minutes" } },
                        "avg_stops": { "avg": { "field": "stops" } }
                    }
                }
            }
        })
    }

    pub fn parse(aggs: &Value) -> SearchResult<Vec<Self>> {
        Ok(buckets(aggs, "airlines")?
            .iter()
            .map(|b| AirlineStats {
                airline: term_key(&b["key"]),
                flight_count: count(&b["doc_count"]),
                avg_price: money(&b["avg_price"]["value"]),
                min_price: money(&b["min_price"]["value"]),
                avg_duration_hours: b["avg_duration"]["value"].as_f64().map(|m| m / 60.0),
                avg_stops: b["avg_stops"]["value"].as_f64(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_facet_request_intervals() {
        let aggs = Facets::request();
        assert_eq!(aggs["price_histogram"]["histogram"]["interval"], 50);
        assert_eq!(aggs["duration_histogram"]["histogram"]["interval"], 60);
        assert_eq!(aggs["departure_hours"]["date_histogram"]["fixed_interval"], "1h");
    }

    #[test]
    fn test_parse_facets() {
        let aggs = json!({
            "price_histogram": { "buckets": [{ "key": 50.0, "doc_count": 2 }, { "key": 100.0, "doc_count": 1 }] },
            "duration_histogram": { "buckets": [{ "key": 120.0, "doc_count": 3 }] },
            "airlines": { "buckets": [{ "key": "AF", "doc_count": 2 }, { "key": "BA", "doc_count": 1 }] },
            "stops": { "buckets": [{ "key": 0, "doc_count": 3 }] },
            "cabin_classes": { "buckets": [{ "key": "ECONOMY", "doc_count": 3 }] },
            "departure_hours": { "buckets": [{ "key": 1748764800000i64, "doc_count": 3 }] }
        });
        let facets = Facets::parse(&aggs).unwrap();
        assert_eq!(facets.prices[0], RangeBucket { from: dec!(50), count: 2 });
        assert_eq!(facets.airlines[1].key, "BA");
        assert_eq!(facets.stops[0].key, "0");
        assert_eq!(facets.departure_hours[0].at.to_rfc3339(), "2025-06-01T08:00:00+00:00");
    }

    #[test]
    fn test_missing_aggregation_is_unexpected() {
        assert!(matches!(
            Facets::parse(&json!({})),
            Err(SearchError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_route_insights() {
        let aggs = json!({
            "price_stats": { "count": 4, "min": 80.0, "max": 140.5, "avg": 101.125, "sum": 404.5 },
            "price_percentiles": { "values": { "25.0": 82.5, "50.0": 92.0, "75.0": 120.0, "90.0": 134.35, "95.0": 137.425 } },
            "daily": { "buckets": [
                { "key": 1748736000000i64, "doc_count": 3, "avg_price": { "value": 88.0 } },
                { "key": 1748822400000i64, "doc_count": 0, "avg_price": { "value": null } }
            ] }
        });
        let insights = RouteInsights::parse("LHR", "CDG", 30, &aggs).unwrap();
        assert_eq!(insights.sample_count, 4);
        assert_eq!(insights.avg_price, Some(dec!(101.13)));
        assert_eq!(insights.percentiles["90"], dec!(134.35));
        assert_eq!(insights.daily.len(), 2);
        assert_eq!(insights.daily[0].date, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(insights.daily[1].average_price, None);
    }

    #[test]
    fn test_empty_route_has_no_prices() {
        let aggs = json!({
            "price_stats": { "count": 0, "min": null, "max": null, "avg": null, "sum": 0.0 },
            "price_percentiles": { "values": { "25.0": null } },
            "daily": { "buckets": [] }
        });
        let insights = RouteInsights::parse("LHR", "CDG", 7, &aggs).unwrap();
        assert_eq!(insights.min_price, None);
        assert!(insights.percentiles.is_empty());
    }

    #[test]
    fn test_airline_stats_duration_in_hours() {
        let aggs = json!({
            "airlines": { "buckets": [{
                "key": "AF", "doc_count": 5,
                "avg_price": { "value": 99.999 }, "min_price": { "value": 80.0 },
                "avg_duration": { "value": 150.0 }, "avg_stops": { "value": 0.2 }
            }] }
        });
        let stats = AirlineStats::parse(&aggs).unwrap();
        assert_eq!(stats[0].avg_price, Some(dec!(100.00)));
        assert_eq!(stats[0].avg_duration_hours, Some(2.5));
        assert_eq!(stats[0].flight_count, 5);
    }
}
