//! Just the parts of the search engine's responses we read.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct SearchResponse<T> {
    #[serde(default)]
    pub took: u64,
    pub hits: Hits<T>,
    #[serde(default)]
    pub aggregations: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Hits<T> {
    #[serde(default)]
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub hits: Vec<Hit<T>>,
}

#[derive(Debug, Deserialize)]
pub struct TotalHits {
    pub value: u64,
}

#[derive(Debug, Deserialize)]
pub struct Hit<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source")]
    pub source: T,
    #[serde(default)]
    pub sort: Option<Vec<Value>>,
}

/// Response body of `_bulk`.
#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

/// Each item is keyed by the action name (`index`, `create`, ...).
#[derive(Debug, Deserialize)]
pub struct BulkItem(pub std::collections::HashMap<String, BulkItemResult>);

impl BulkItem {
    pub fn result(&self) -> Option<&BulkItemResult> {
        self.0.values().next()
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkItemResult {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub status: u16,
    #[serde(default)]
    pub error: Option<BulkItemFailure>,
}

#[derive(Debug, Deserialize)]
pub struct BulkItemFailure {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl BulkItemFailure {
    pub fn describe(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{}: {}", self.kind, reason),
            None => self.kind.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_hits_with_sort_values() {
        let raw = json!({
            "took": 3,
            "hits": {
                "total": { "value": 1, "relation": "eq" },
                "hits": [{ "_id": "a", "_score": null, "_source": { "x": 1 }, "sort": [85.1, 1.0, "a"] }]
            }
        });
        let parsed: SearchResponse<Value> = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.hits.total.unwrap().value, 1);
        assert_eq!(parsed.hits.hits[0].id, "a");
        assert!(parsed.hits.hits[0].score.is_none());
        assert_eq!(parsed.hits.hits[0].sort.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn test_parses_bulk_item_failures() {
        let raw = json!({
            "took": 10,
            "errors": true,
            "items": [
                { "index": { "_id": "1", "status": 201 } },
                { "index": { "_id": "2", "status": 400, "error": {
                    "type": "mapper_parsing_exception", "reason": "failed to parse field [price]"
                } } }
            ]
        });
        let parsed: BulkResponse = serde_json::from_value(raw).unwrap();
        assert!(parsed.errors);
        let failed = parsed.items[1].result().unwrap();
        assert_eq!(failed.status, 400);
        assert_eq!(
            failed.error.as_ref().unwrap().describe(),
            "mapper_parsing_exception: failed to parse field [price]"
        );
    }
}
