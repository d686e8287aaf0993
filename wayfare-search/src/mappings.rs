use serde_json::{json, Value};

pub const FLIGHTS_INDEX: &str = "flights";
pub const AIRPORTS_INDEX: &str = "airports";

pub fn flights_index() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
            "refresh_interval": "1s"
        },
        "mappings": {
            "dynamic": "strict",
            "properties": {
                "offer_id": { "type": "keyword" },
                "search_id": { "type": "keyword" },
                "provider": { "type": "keyword" },
                "origin_airport": { "type": "keyword" },
                "destination_airport": { "type": "keyword" },
                "airline": { "type": "keyword" },
                "cabin_class": { "type": "keyword" },
                "price": { "type": "scaled_float", "scaling_factor": 100 },
                "currency": { "type": "keyword" },
                "duration_minutes": { "type": "integer" },
                "stops": { "type": "integer" },
                "is_direct": { "type": "boolean" },
                "departure_time": { "type": "date" },
                "arrival_time": { "type": "date" },
                "departure_date": { "type": "date", "format": "yyyy-MM-dd" },
                "return_departure_time": { "type": "date" },
                "bookable_seats": { "type": "integer" },
                "indexed_at": { "type": "date" }
            }
        }
    })
}

/// Edge n-grams on index, plain lowercase terms on search, so "lon" matches
/// "London" without the query itself being n-grammed.
pub fn airports_index() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
            "analysis": {
                "filter": {
                    "autocomplete_filter": {
                        "type": "edge_ngram",
                        "min_gram": 1,
                        "max_gram": 20
                    }
                },
                "analyzer": {
                    "autocomplete": {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": ["lowercase", "asciifolding", "autocomplete_filter"]
                    },
                    "autocomplete_search": {
                        "type": "custom",
                        "tokenizer": "keyword",
                        "filter": ["lowercase", "asciifolding"]
                    }
                },
                "normalizer": {
                    "lowercase_normalizer": {
                        "type": "custom",
                        "filter": ["lowercase"]
                    }
                }
            }
        },
        "mappings": {
            "properties": {
                "code": {
                    "type": "text",
                    "analyzer": "autocomplete",
                    "search_analyzer": "autocomplete_search",
                    "fields": {
                        "exact": { "type": "keyword", "normalizer": "lowercase_normalizer" }
                    }
                },
                "name": {
                    "type": "text",
                    "analyzer": "autocomplete",
                    "search_analyzer": "autocomplete_search"
                },
                "city": {
                    "type": "text",
                    "analyzer": "autocomplete",
                    "search_analyzer": "autocomplete_search"
                },
                "country": { "type": "text" },
                "country_code": { "type": "keyword" },
                "type": { "type": "keyword" },
                "popularity": { "type": "integer" },
                "latitude": { "type": "float" },
                "longitude": { "type": "float" }
            }
        }
    })
}
