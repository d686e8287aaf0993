//! Stored mustache search templates. Callers that go through
//! [`SearchClient`](crate::SearchClient) build the same queries in Rust; the
//! stored copies serve clients that only speak `_search/template`.

use serde_json::{json, Value};

pub const FLIGHT_SEARCH: &str = "flight_search";
pub const AIRPORT_AUTOCOMPLETE: &str = "airport_autocomplete";

const FLIGHT_SEARCH_SOURCE: &str = r#"{
  "size": "{{size}}{{^size}}50{{/size}}",
  "query": {
    "bool": {
      "filter": [
        { "term": { "origin_airport": "{{origin}}" } },
        { "term": { "destination_airport": "{{destination}}" } },
        { "range": { "departure_date": { "gte": "{{date_from}}", "lte": "{{date_to}}" } } }
        {{#cabin_class}}, { "term": { "cabin_class": "{{cabin_class}}" } }{{/cabin_class}}
        {{#max_stops}}, { "range": { "stops": { "lte": {{max_stops}} } } }{{/max_stops}}
      ]
    }
  },
  "sort": [ { "{{sort_field}}{{^sort_field}}price{{/sort_field}}": "asc" }, "_score" ]
}"#;

const AIRPORT_AUTOCOMPLETE_SOURCE: &str = r#"{
  "size": "{{limit}}{{^limit}}10{{/limit}}",
  "query": {
    "bool": {
      "should": [
        { "term": { "code.exact": { "value": "{{query}}", "boost": 10 } } },
        { "match": { "code": { "query": "{{query}}", "boost": 5 } } },
        { "match": { "name": { "query": "{{query}}", "boost": 3 } } },
        { "match": { "city": { "query": "{{query}}", "boost": 3 } } },
        { "multi_match": { "query": "{{query}}", "fields": ["code", "name", "city", "country"], "fuzziness": "AUTO", "boost": 1 } }
      ],
      "minimum_should_match": 1
    }
  },
  "sort": [ "_score", { "popularity": "desc" } ]
}"#;

/// `(id, body)` pairs for `PUT _scripts/{id}`.
pub fn all() -> Vec<(&'static str, Value)> {
    vec![
        (FLIGHT_SEARCH, script(FLIGHT_SEARCH_SOURCE)),
        (AIRPORT_AUTOCOMPLETE, script(AIRPORT_AUTOCOMPLETE_SOURCE)),
    ]
}

fn script(source: &str) -> Value {
    json!({ "script": { "lang": "mustache", "source": source } })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_mustache_scripts() {
        let templates = all();
        assert_eq!(templates.len(), 2);
        for (id, body) in templates {
            assert_eq!(body["script"]["lang"], "mustache", "{}", id);
            assert!(body["script"]["source"].as_str().unwrap().contains("{{"));
        }
    }
}
