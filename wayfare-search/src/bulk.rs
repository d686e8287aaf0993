use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::document::FlightDocument;
use crate::error::SearchResult;
use crate::response::BulkResponse;
use wayfare_core::offer::FlightOffer;
use wayfare_core::repository::{BulkItemError, BulkSummary};

pub const BATCH_SIZE: usize = 1000;

/// One `_bulk` request body and the document ids it carries, in order.
#[derive(Debug, Clone)]
pub struct BulkBatch {
    pub body: String,
    pub ids: Vec<String>,
}

/// Split documents into NDJSON `index` batches of at most [`BATCH_SIZE`].
pub fn batches<T: Serialize>(index: &str, docs: &[(String, T)]) -> SearchResult<Vec<BulkBatch>> {
    docs.chunks(BATCH_SIZE)
        .map(|chunk| {
            let mut body = String::new();
            let mut ids = Vec::with_capacity(chunk.len());
            for (id, doc) in chunk {
                let action = serde_json::json!({ "index": { "_index": index, "_id": id } });
                body.push_str(&serde_json::to_string(&action)?);
                body.push('\n');
                body.push_str(&serde_json::to_string(doc)?);
                body.push('\n');
                ids.push(id.clone());
            }
            Ok(BulkBatch { body, ids })
        })
        .collect()
}

/// Flatten offers into documents. Offers that cannot be flattened are
/// reported as failures instead of aborting the whole load.
pub fn flight_documents(
    offers: &[FlightOffer],
    indexed_at: DateTime<Utc>,
) -> (Vec<(String, FlightDocument)>, BulkSummary) {
    let mut docs = Vec::with_capacity(offers.len());
    let mut rejected = BulkSummary::default();
    for offer in offers {
        match FlightDocument::from_offer(offer, indexed_at) {
            Ok(doc) => docs.push((doc.document_id(), doc)),
            Err(e) => {
                rejected.failed += 1;
                rejected.errors.push(BulkItemError { id: offer.id.clone(), reason: e.to_string() });
            }
        }
    }
    (docs, rejected)
}

/// Per-item outcome of one batch.
pub fn summarize(batch: &BulkBatch, response: &BulkResponse) -> BulkSummary {
    let mut summary = BulkSummary::default();
    for (position, item) in response.items.iter().enumerate() {
        let Some(result) = item.result() else {
            continue;
        };
        if (200..300).contains(&result.status) {
            summary.indexed += 1;
            continue;
        }
        let id = result
            .id
            .clone()
            .or_else(|| batch.ids.get(position).cloned())
            .unwrap_or_default();
        let reason = result
            .error
            .as_ref()
            .map(|e| e.describe())
            .unwrap_or_else(|| format!("status {}", result.status));
        warn!(document_id = %id, %reason, "bulk item rejected");
        summary.failed += 1;
        summary.errors.push(BulkItemError { id, reason });
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::{direct_offer, offer};
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_batches_split_at_limit() {
        let docs: Vec<(String, serde_json::Value)> =
            (0..BATCH_SIZE + 1).map(|i| (i.to_string(), json!({ "n": i }))).collect();
        let batches = batches("flights", &docs).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].ids.len(), BATCH_SIZE);
        assert_eq!(batches[1].ids, vec![BATCH_SIZE.to_string()]);
        assert_eq!(batches[1].body.lines().count(), 2);
        assert!(batches[1].body.ends_with('\n'));
        let action: serde_json::Value = serde_json::from_str(batches[1].body.lines().next().unwrap()).unwrap();
        assert_eq!(action["index"]["_index"], "flights");
    }

    #[test]
    fn test_unflattenable_offers_become_failures() {
        let empty = offer("broken", dec!(10), vec![]);
        let (docs, rejected) = flight_documents(&[direct_offer("ok", dec!(10)), empty], Utc::now());
        assert_eq!(docs.len(), 1);
        assert_eq!(rejected.failed, 1);
        assert_eq!(rejected.errors[0].id, "broken");
    }

    #[test]
    fn test_summarize_records_each_failure() {
        let batch = BulkBatch { body: String::new(), ids: vec!["a".into(), "b".into(), "c".into()] };
        let response: BulkResponse = serde_json::from_value(json!({
            "errors": true,
            "items": [
                { "index": { "_id": "a", "status": 201 } },
                { "index": { "_id": "b", "status": 400, "error": { "type": "mapper_parsing_exception", "reason": "bad price" } } },
                { "index": { "_id": "c", "status": 200 } }
            ]
        }))
        .unwrap();
        let summary = summarize(&batch, &response);
        assert_eq!(summary.indexed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors[0], BulkItemError { id: "b".into(), reason: "mapper_parsing_exception: bad price".into() });
    }
}
