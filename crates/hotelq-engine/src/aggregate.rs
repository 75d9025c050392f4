use async_trait::async_trait;
use serde_json::{json, Map, Value};

use hotelq_core::{fields, AggregateError, Aggregator, SharedState};

/// Result lists the summary knows how to label. Only lodging lists count
/// towards the total.
const RESULT_LISTS: [(&str, &str, bool); 4] = [
    (fields::HOTELS, "name", true),
    (fields::FUZZY_HOTELS, "name", true),
    (fields::PLANS, "plan_name", true),
    (fields::POIS, "hotel_name", false),
];

/// Number of names listed per result list.
const TOP_N: usize = 3;

/// Structured stand-in for the text-generation service: result counts, the
/// first few names per list and a one-line message.
#[derive(Debug, Default, Clone, Copy)]
pub struct SummaryAggregator;

#[async_trait]
impl Aggregator for SummaryAggregator {
    async fn aggregate(&self, state: &SharedState) -> Result<Value, AggregateError> {
        let mut counts = Map::new();
        let mut top = Map::new();
        let mut total = 0usize;
        for (list, label, lodging) in RESULT_LISTS {
            if !state.schema().contains(list) {
                continue;
            }
            let records = state.list(list);
            if lodging {
                total += records.len();
            }
            counts.insert(list.to_string(), json!(records.len()));
            let names: Vec<&str> = records
                .iter()
                .filter_map(|r| r.get(label).and_then(Value::as_str))
                .take(TOP_N)
                .collect();
            top.insert(list.to_string(), json!(names));
        }

        let relaxed = state.strings(fields::RELAXED);
        let message = match (total, relaxed.is_empty()) {
            (0, _) => "no matching stays found".to_string(),
            (n, true) => format!("found {n} result(s)"),
            (n, false) => format!("found {n} result(s) after relaxing {}", relaxed.join(", ")),
        };
        Ok(json!({
            "message": message,
            "total": total,
            "counts": counts,
            "top": top,
            "relaxed": relaxed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotelq_core::{PartialState, Reducer, Schema};
    use std::sync::Arc;

    fn state(hotels: Value, relaxed: &[&str]) -> SharedState {
        let mut schema = Schema::base();
        schema.register("hotels", Reducer::keyed("id"), json!([])).expect("register");
        let mut state = Arc::new(schema).initial_state();
        let patch =
            PartialState::new().with("hotels", hotels).with(fields::RELAXED, json!(relaxed));
        state.merge(&patch).expect("merge");
        state
    }

    #[tokio::test]
    async fn summary_counts_registered_lists_only() {
        let hotels = json!([
            {"id": 1, "name": "A"},
            {"id": 2, "name": "B"},
            {"id": 3, "name": "C"},
            {"id": 4, "name": "D"},
        ]);
        let out = SummaryAggregator.aggregate(&state(hotels, &[])).await.expect("aggregate");
        assert_eq!(out["total"], 4);
        assert_eq!(out["top"]["hotels"], json!(["A", "B", "C"]));
        assert!(out["counts"].get("plans").is_none());
        assert_eq!(out["message"], "found 4 result(s)");
    }

    #[tokio::test]
    async fn message_names_relaxed_steps() {
        let found = state(json!([{"id": 1}]), &["price"]);
        let out = SummaryAggregator.aggregate(&found).await.expect("aggregate");
        assert_eq!(out["message"], "found 1 result(s) after relaxing price");
        let none = state(json!([]), &["price"]);
        let empty = SummaryAggregator.aggregate(&none).await.expect("aggregate");
        assert_eq!(empty["message"], "no matching stays found");
    }

    #[tokio::test]
    async fn nearby_places_are_listed_but_not_totalled() {
        let mut schema = Schema::base();
        schema.register(fields::HOTELS, Reducer::keyed("id"), json!([])).expect("register");
        schema.register(fields::POIS, Reducer::keyed("hotel_id"), json!([])).expect("register");
        let mut state = Arc::new(schema).initial_state();
        let pois = json!([{"hotel_id": 1, "hotel_name": "A", "pois": {"夜市": [{}]}}]);
        let patch = PartialState::new()
            .with(fields::HOTELS, json!([{"id": 1, "name": "A"}]))
            .with(fields::POIS, pois);
        state.merge(&patch).expect("merge");

        let out = SummaryAggregator.aggregate(&state).await.expect("aggregate");
        assert_eq!(out["total"], 1);
        assert_eq!(out["counts"]["pois"], 1);
        assert_eq!(out["top"]["pois"], json!(["A"]));
    }
}
