use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde_json::json;
use wayfare_core::airport::{Airport, AirportType};
use wayfare_core::offer::{
    BookingConstraints, FlightEndpoint, FlightOffer, FlightTime, Itinerary, PriceBreakdown, Segment,
};
use wayfare_core::repository::AirportDirectory;
use wayfare_search::{FlightQuery, SearchClient, SearchSettings};
use wayfare_shared::codes;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> SearchClient {
    SearchClient::new(SearchSettings { url: server.uri(), ..Default::default() }, None).unwrap()
}

fn airport(code: &str, name: &str, city: &str, popularity: u32) -> Airport {
    Airport {
        code: code.into(),
        name: name.into(),
        city: city.into(),
        country: "United Kingdom".into(),
        country_code: "GB".into(),
        airport_type: AirportType::Airport,
        popularity,
        latitude: None,
        longitude: None,
    }
}

fn offer(id: &str) -> FlightOffer {
    let endpoint = |code: &str, at: &str| FlightEndpoint {
        iata_code: code.into(),
        terminal: None,
        at: FlightTime::parse(at).unwrap(),
    };
    FlightOffer {
        id: id.into(),
        provider: "amadeus".into(),
        source: "GDS".into(),
        search_id: "s1".into(),
        one_way: true,
        itineraries: vec![Itinerary {
            duration_minutes: Some(75),
            segments: vec![Segment {
                id: "1".into(),
                departure: endpoint("LHR", "2025-06-01T08:00:00+01:00"),
                arrival: endpoint("CDG", "2025-06-01T10:15:00+02:00"),
                carrier_code: "AF".into(),
                carrier_name: "AIR FRANCE".into(),
                number: "1081".into(),
                aircraft_code: None,
                aircraft_name: None,
                operating_carrier_code: None,
                duration_minutes: Some(75),
                number_of_stops: 0,
                blacklisted_in_eu: false,
            }],
        }],
        price: PriceBreakdown {
            currency: "EUR".into(),
            total: dec!(85.10),
            base: dec!(60.00),
            taxes: vec![],
            fees: vec![],
            grand_total: dec!(85.10),
        },
        traveler_pricings: vec![],
        validating_airline_codes: vec!["AF".into()],
        booking: BookingConstraints::default(),
    }
}

fn flight_source(id: &str, price: &str) -> serde_json::Value {
    json!({
        "offer_id": id,
        "search_id": "s1",
        "provider": "amadeus",
        "origin_airport": "LHR",
        "destination_airport": "CDG",
        "airline": "AF",
        "cabin_class": "ECONOMY",
        "price": price,
        "currency": "EUR",
        "duration_minutes": 75,
        "stops": 0,
        "is_direct": true,
        "departure_time": "2025-06-01T07:00:00Z",
        "arrival_time": "2025-06-01T08:15:00Z",
        "departure_date": "2025-06-01",
        "return_departure_time": null,
        "bookable_seats": 4,
        "indexed_at": "2025-05-20T12:00:00Z"
    })
}

#[tokio::test]
async fn test_ensure_indices_creates_only_missing() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/flights"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/airports"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/airports"))
        .and(body_partial_json(json!({ "settings": { "analysis": { "filter": { "autocomplete_filter": { "type": "edge_ngram" } } } } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/flights"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    client(&server).ensure_indices().await.unwrap();
}

#[tokio::test]
async fn test_ensure_indices_tolerates_concurrent_creation() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "type": "resource_already_exists_exception" }, "status": 400
        })))
        .mount(&server)
        .await;

    client(&server).ensure_indices().await.unwrap();
}

#[tokio::test]
async fn test_index_offers_reports_item_failures_without_failing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(header("content-type", "application/x-ndjson"))
        .and(body_string_contains("\"_id\":\"s1-1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 5,
            "errors": true,
            "items": [
                { "index": { "_id": "s1-1", "status": 201 } },
                { "index": { "_id": "s1-2", "status": 400, "error": { "type": "mapper_parsing_exception", "reason": "boom" } } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let summary = client(&server).index_offers(&[offer("1"), offer("2")]).await.unwrap();
    assert_eq!(summary.indexed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors[0].id, "s1-2");
    assert!(!summary.is_clean());
}

#[tokio::test]
async fn test_search_flights_returns_hits_facets_and_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flights/_search"))
        .and(body_partial_json(json!({ "size": 1, "track_total_hits": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 2,
            "hits": {
                "total": { "value": 7, "relation": "eq" },
                "hits": [{ "_id": "s1-1", "_score": null, "_source": flight_source("1", "85.10"), "sort": [85.1, null, "1"] }]
            },
            "aggregations": {
                "price_histogram": { "buckets": [{ "key": 50.0, "doc_count": 7 }] },
                "duration_histogram": { "buckets": [{ "key": 60.0, "doc_count": 7 }] },
                "airlines": { "buckets": [{ "key": "AF", "doc_count": 7 }] },
                "stops": { "buckets": [{ "key": 0, "doc_count": 7 }] },
                "cabin_classes": { "buckets": [{ "key": "ECONOMY", "doc_count": 7 }] },
                "departure_hours": { "buckets": [] }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut query = FlightQuery::new("LHR", "CDG", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
    query.size = Some(1);
    let page = client(&server).search_flights(&query, true).await.unwrap();

    assert_eq!(page.total, 7);
    assert_eq!(page.hits.len(), 1);
    assert_eq!(page.hits[0].flight.price, dec!(85.10));
    assert_eq!(page.facets.unwrap().airlines[0].count, 7);
    assert_eq!(page.next_cursor.unwrap()[2], "1");
}

#[tokio::test]
async fn test_search_flights_rejects_invalid_query_without_calling_engine() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let query = FlightQuery::new("LHR", "LHR", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
    let err = client(&server).search_flights(&query, false).await.unwrap_err();
    assert!(err.is(codes::VALIDATION_ERROR));
}

#[tokio::test]
async fn test_suggest_exact_code_ranks_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/airports/_search"))
        .and(body_partial_json(json!({ "size": 2 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": {
                "total": { "value": 4 },
                "hits": [
                    { "_id": "LHR", "_score": 18.2, "_source": airport("LHR", "Heathrow", "London", 100) },
                    { "_id": "LGW", "_score": 3.1, "_source": airport("LGW", "Gatwick", "London", 80) },
                    { "_id": "LTN", "_score": 3.0, "_source": airport("LTN", "Luton", "London", 60) }
                ]
            }
        })))
        .mount(&server)
        .await;

    let suggestions = client(&server).suggest("LHR", 2).await.unwrap();
    assert_eq!(suggestions.len(), 2);
    assert_eq!(suggestions[0].airport.code, "LHR");
    assert!(suggestions[0].score > suggestions[1].score);
}

#[tokio::test]
async fn test_suggest_blank_query_is_empty() {
    let server = MockServer::start().await;
    let suggestions = AirportDirectory::suggest(&client(&server), "   ", 5).await.unwrap();
    assert!(suggestions.is_empty());
}

#[tokio::test]
async fn test_route_insights_parses_aggregations() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flights/_search"))
        .and(body_partial_json(json!({ "size": 0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": { "total": { "value": 2 }, "hits": [] },
            "aggregations": {
                "price_stats": { "count": 2, "min": 80.0, "max": 90.0, "avg": 85.0, "sum": 170.0 },
                "price_percentiles": { "values": { "50.0": 85.0 } },
                "daily": { "buckets": [{ "key": 1748736000000i64, "doc_count": 2, "avg_price": { "value": 85.0 } }] }
            }
        })))
        .mount(&server)
        .await;

    let insights = client(&server).route_insights("LHR", "CDG", 30).await.unwrap();
    assert_eq!(insights.min_price, Some(dec!(80)));
    assert_eq!(insights.percentiles["50"], dec!(85));
    assert_eq!(insights.daily.len(), 1);
}

#[tokio::test]
async fn test_engine_outage_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server).airline_comparison("LHR", "CDG", 30).await.unwrap_err();
    assert!(err.is(codes::BAD_GATEWAY));
    assert_eq!(err.operation.as_deref(), Some("airline_comparison"));
}
