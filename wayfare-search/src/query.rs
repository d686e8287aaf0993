use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::aggregations::Facets;
use crate::document::FlightDocument;
use wayfare_core::airport::{CODE_PREFIX_BOOST, EXACT_CODE_BOOST, FUZZY_BOOST, NAME_PREFIX_BOOST};
use wayfare_core::iata::{is_airport_code, is_carrier_code};
use wayfare_core::search::CabinClass;
use wayfare_core::validation::FieldErrors;
use wayfare_shared::AppResult;

pub const DEFAULT_PAGE_SIZE: u16 = 50;
pub const MAX_PAGE_SIZE: u16 = 250;
pub const MAX_FLEXIBLE_DAYS: u8 = 7;
const PREFERRED_AIRLINE_BOOST: f64 = 2.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightSort {
    #[default]
    Price,
    Duration,
    DepartureTime,
    Relevance,
}

impl FlightSort {
    fn clauses(self) -> Value {
        let primary = match self {
            FlightSort::Price => Some("price"),
            FlightSort::Duration => Some("duration_minutes"),
            FlightSort::DepartureTime => Some("departure_time"),
            FlightSort::Relevance => None,
        };
        // _id as the last key keeps search_after cursors stable across equal scores.
        match primary {
            Some(field) => json!([
                { field: { "order": "asc", "missing": "_last" } },
                { "_score": { "order": "desc" } },
                { "offer_id": { "order": "asc" } }
            ]),
            None => json!([
                { "_score": { "order": "desc" } },
                { "price": { "order": "asc" } },
                { "offer_id": { "order": "asc" } }
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightQuery {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    /// Widen the date filter to ±N days.
    #[serde(default)]
    pub flexible_days: u8,
    #[serde(default)]
    pub cabin_class: Option<CabinClass>,
    #[serde(default)]
    pub max_stops: Option<u32>,
    #[serde(default)]
    pub direct_only: bool,
    #[serde(default)]
    pub min_duration_minutes: Option<u32>,
    #[serde(default)]
    pub max_duration_minutes: Option<u32>,
    #[serde(default)]
    pub preferred_airlines: Vec<String>,
    #[serde(default)]
    pub excluded_airlines: Vec<String>,
    #[serde(default)]
    pub sort: FlightSort,
    #[serde(default)]
    pub size: Option<u16>,
    /// Sort values of the last hit of the previous page.
    #[serde(default)]
    pub search_after: Option<Vec<Value>>,
}

impl FlightQuery {
    pub fn new(origin: &str, destination: &str, departure_date: NaiveDate) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_date,
            flexible_days: 0,
            cabin_class: None,
            max_stops: None,
            direct_only: false,
            min_duration_minutes: None,
            max_duration_minutes: None,
            preferred_airlines: Vec::new(),
            excluded_airlines: Vec::new(),
            sort: FlightSort::default(),
            size: None,
            search_after: None,
        }
    }

    pub fn page_size(&self) -> u16 {
        self.size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn date_window(&self) -> (NaiveDate, NaiveDate) {
        let days = Duration::days(i64::from(self.flexible_days));
        (self.departure_date - days, self.departure_date + days)
    }

    pub fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        errors.check(is_airport_code(&self.origin), "origin", "must be a 3-letter airport code");
        errors.check(
            is_airport_code(&self.destination),
            "destination",
            "must be a 3-letter airport code",
        );
        errors.check(self.origin != self.destination, "destination", "must differ from origin");
        errors.check(
            self.flexible_days <= MAX_FLEXIBLE_DAYS,
            "flexible_days",
            "must be at most 7",
        );
        if let (Some(min), Some(max)) = (self.min_duration_minutes, self.max_duration_minutes) {
            errors.check(min <= max, "min_duration_minutes", "must not exceed max_duration_minutes");
        }
        errors.check(
            self.preferred_airlines.iter().chain(&self.excluded_airlines).all(|c| is_carrier_code(c)),
            "airlines",
            "must be 2-character carrier codes",
        );
        errors.into_result("invalid flight query")
    }

    fn filters(&self) -> Vec<Value> {
        let (from, to) = self.date_window();
        let mut filters = vec![
            json!({ "term": { "origin_airport": self.origin } }),
            json!({ "term": { "destination_airport": self.destination } }),
            json!({ "range": { "departure_date": {
                "gte": from.format("%Y-%m-%d").to_string(),
                "lte": to.format("%Y-%m-%d").to_string()
            } } }),
        ];
        if let Some(cabin) = self.cabin_class {
            filters.push(json!({ "term": { "cabin_class": cabin.as_str() } }));
        }
        if self.direct_only {
            filters.push(json!({ "term": { "stops": 0 } }));
        } else if let Some(max_stops) = self.max_stops {
            filters.push(json!({ "range": { "stops": { "lte": max_stops } } }));
        }
        if self.min_duration_minutes.is_some() || self.max_duration_minutes.is_some() {
            let mut bounds = serde_json::Map::new();
            if let Some(min) = self.min_duration_minutes {
                bounds.insert("gte".into(), json!(min));
            }
            if let Some(max) = self.max_duration_minutes {
                bounds.insert("lte".into(), json!(max));
            }
            filters.push(json!({ "range": { "duration_minutes": bounds } }));
        }
        filters
    }

    /// The boolean query on its own, shared by hits and aggregations.
    pub fn bool_query(&self) -> Value {
        let mut query = json!({
            "bool": {
                "filter": self.filters()
            }
        });
        if !self.preferred_airlines.is_empty() {
            query["bool"]["should"] = json!([{
                "terms": { "airline": self.preferred_airlines, "boost": PREFERRED_AIRLINE_BOOST }
            }]);
        }
        if !self.excluded_airlines.is_empty() {
            query["bool"]["must_not"] = json!([{ "terms": { "airline": self.excluded_airlines } }]);
        }
        query
    }

    /// Full request body. Facet aggregations ride along on the same request
    /// when asked for.
    pub fn to_body(&self, with_facets: bool) -> Value {
        let mut body = json!({
            "query": self.bool_query(),
            "sort": self.sort.clauses(),
            "size": self.page_size(),
            "track_total_hits": true
        });
        if let Some(cursor) = &self.search_after {
            body["search_after"] = json!(cursor);
        }
        if with_facets {
            body["aggs"] = Facets::request();
        }
        body
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: Option<f64>,
    pub flight: FlightDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPage {
    pub total: u64,
    pub hits: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Facets>,
    /// Present only when the page was full, so another page may exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Vec<Value>>,
}

/// Composite autocomplete scoring: an exact code match outranks any prefix.
pub fn autocomplete_body(query: &str, limit: usize) -> Value {
    let q = query.trim();
    json!({
        "size": limit,
        "query": {
            "bool": {
                "should": [
                    { "term": { "code.exact": { "value": q.to_lowercase(), "boost": EXACT_CODE_BOOST } } },
                    { "match": { "code": { "query": q, "boost": CODE_PREFIX_BOOST } } },
                    { "match": { "name": { "query": q, "boost": NAME_PREFIX_BOOST } } },
                    { "match": { "city": { "query": q, "boost": NAME_PREFIX_BOOST } } },
                    { "multi_match": {
                        "query": q,
                        "fields": ["code", "name", "city", "country"],
                        "fuzziness": "AUTO",
                        "boost": FUZZY_BOOST
                    } }
                ],
                "minimum_should_match": 1
            }
        },
        "sort": [
            { "_score": { "order": "desc" } },
            { "popularity": { "order": "desc" } }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> FlightQuery {
        FlightQuery::new("LHR", "CDG", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
    }

    #[test]
    fn test_exact_day_filter() {
        let body = query().to_body(false);
        let filters = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[2]["range"]["departure_date"]["gte"], "2025-06-01");
        assert_eq!(filters[2]["range"]["departure_date"]["lte"], "2025-06-01");
        assert_eq!(body["size"], 50);
        assert!(body.get("aggs").is_none());
    }

    #[test]
    fn test_flexible_window_and_optional_filters() {
        let mut q = query();
        q.flexible_days = 3;
        q.cabin_class = Some(CabinClass::Business);
        q.max_stops = Some(1);
        q.max_duration_minutes = Some(300);
        let body = q.to_body(true);
        let filters = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filters[2]["range"]["departure_date"]["gte"], "2025-05-29");
        assert_eq!(filters[2]["range"]["departure_date"]["lte"], "2025-06-04");
        assert!(filters.contains(&json!({ "term": { "cabin_class": "BUSINESS" } })));
        assert!(filters.contains(&json!({ "range": { "stops": { "lte": 1 } } })));
        assert!(filters.contains(&json!({ "range": { "duration_minutes": { "lte": 300 } } })));
        assert!(body["aggs"].get("price_histogram").is_some());
    }

    #[test]
    fn test_direct_only_overrides_max_stops() {
        let mut q = query();
        q.direct_only = true;
        q.max_stops = Some(2);
        let body = q.to_body(false);
        let filters = body["query"]["bool"]["filter"].as_array().unwrap();
        assert!(filters.contains(&json!({ "term": { "stops": 0 } })));
        assert!(!filters.iter().any(|f| f["range"].get("stops").is_some()));
    }

    #[test]
    fn test_airline_preferences() {
        let mut q = query();
        q.preferred_airlines = vec!["AF".into()];
        q.excluded_airlines = vec!["U2".into()];
        let body = q.to_body(false);
        assert_eq!(body["query"]["bool"]["should"][0]["terms"]["airline"][0], "AF");
        assert_eq!(body["query"]["bool"]["must_not"][0]["terms"]["airline"][0], "U2");
    }

    #[test]
    fn test_sort_ties_break_on_score() {
        let mut q = query();
        q.sort = FlightSort::Duration;
        let body = q.to_body(false);
        assert!(body["sort"][0].get("duration_minutes").is_some());
        assert!(body["sort"][1].get("_score").is_some());
    }

    #[test]
    fn test_page_size_clamped() {
        let mut q = query();
        q.size = Some(0);
        assert_eq!(q.page_size(), 1);
        q.size = Some(1000);
        assert_eq!(q.page_size(), MAX_PAGE_SIZE);
    }

    #[test]
    fn test_validation_collects_fields() {
        let mut q = query();
        q.destination = "LHR".into();
        q.flexible_days = 10;
        q.min_duration_minutes = Some(200);
        q.max_duration_minutes = Some(100);
        let err = q.validate().unwrap_err();
        assert_eq!(err.http_status, 400);
        assert!(err.details.contains_key("destination"));
        assert!(err.details.contains_key("flexible_days"));
        assert!(err.details.contains_key("min_duration_minutes"));
    }

    #[test]
    fn test_autocomplete_exact_code_boost() {
        let body = autocomplete_body(" LHR ", 5);
        assert_eq!(body["size"], 5);
        let exact = &body["query"]["bool"]["should"][0]["term"]["code.exact"];
        assert_eq!(exact["value"], "lhr");
        assert_eq!(exact["boost"], EXACT_CODE_BOOST);
        assert_eq!(body["sort"][1]["popularity"]["order"], "desc");
    }
}
