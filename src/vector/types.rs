use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Collections the server manages for itself (e.g. saved chat threads).
/// They are hidden from data listings and excluded from all-collection
/// retrieval.
pub const SYSTEM_COLLECTION_PREFIX: &str = "tabula_";

pub fn is_system_collection(name: &str) -> bool {
    name.starts_with(SYSTEM_COLLECTION_PREFIX)
}

/// Payload stored with every point: the chunk text plus flat string-to-string
/// metadata (source filename, chunk index, sheet, row and the like).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointPayload {
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PointPayload {
    pub fn new(content: String, metadata: BTreeMap<String, String>) -> Self {
        Self { content, metadata }
    }

    /// Tolerant read of a payload object. Earlier writers stored some
    /// metadata values as numbers, so scalars are coerced to strings
    /// instead of failing deserialization.
    pub fn from_value(value: &Value) -> Self {
        let content = value
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut metadata = BTreeMap::new();
        if let Some(map) = value.get("metadata").and_then(Value::as_object) {
            for (key, val) in map {
                metadata.insert(key.clone(), scalar_to_string(val));
            }
        }

        Self { content, metadata }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    }
}

/// A point ready to be written: id, embedding vector and payload.
#[derive(Debug, Clone)]
pub struct NewPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// A point read back without its vector.
#[derive(Debug, Clone)]
pub struct StoredPoint {
    pub id: String,
    pub payload: PointPayload,
}

/// A similarity search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub score: f32,
    pub payload: PointPayload,
}

/// OR-of-equals filter over payload fields, used when scrolling.
#[derive(Debug, Clone, Default)]
pub struct ScrollFilter {
    pub any_of: Vec<(String, String)>,
}

impl ScrollFilter {
    pub fn any_of(pairs: Vec<(String, String)>) -> Self {
        Self { any_of: pairs }
    }

    /// Matches points ingested from the given file, whichever metadata key
    /// the writer used for it.
    pub fn for_filename(filename: &str) -> Self {
        Self::any_of(vec![
            ("metadata.filename".to_string(), filename.to_string()),
            ("metadata.source".to_string(), filename.to_string()),
        ])
    }

    pub fn to_qdrant(&self) -> Value {
        let clauses: Vec<Value> = self
            .any_of
            .iter()
            .map(|(key, value)| json!({ "key": key, "match": { "value": value } }))
            .collect();
        json!({ "should": clauses })
    }

    /// Local evaluation of the filter, mirroring the remote semantics.
    pub fn matches(&self, payload: &PointPayload) -> bool {
        if self.any_of.is_empty() {
            return true;
        }
        self.any_of.iter().any(|(key, value)| {
            if key == "content" {
                return payload.content == *value;
            }
            key.strip_prefix("metadata.")
                .and_then(|field| payload.metadata.get(field))
                .is_some_and(|stored| stored == value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_collections_are_recognized_by_prefix() {
        assert!(is_system_collection("tabula_threads"));
        assert!(!is_system_collection("sales_2024"));
        assert!(!is_system_collection("tabula"));
    }

    #[test]
    fn payload_parsing_coerces_numeric_metadata() {
        let value = json!({
            "content": "Region: EMEA Revenue: 15000",
            "metadata": { "source": "sales.csv", "chunk_index": 3 }
        });

        let payload = PointPayload::from_value(&value);
        assert_eq!(payload.content, "Region: EMEA Revenue: 15000");
        assert_eq!(payload.metadata.get("source").map(String::as_str), Some("sales.csv"));
        assert_eq!(payload.metadata.get("chunk_index").map(String::as_str), Some("3"));
    }

    #[test]
    fn payload_parsing_tolerates_missing_fields() {
        let payload = PointPayload::from_value(&json!({}));
        assert_eq!(payload.content, "");
        assert!(payload.metadata.is_empty());
    }

    #[test]
    fn filename_filter_matches_either_metadata_key() {
        let filter = ScrollFilter::for_filename("sales.csv");

        let by_source = PointPayload::new(
            "row".to_string(),
            BTreeMap::from([("source".to_string(), "sales.csv".to_string())]),
        );
        let by_filename = PointPayload::new(
            "row".to_string(),
            BTreeMap::from([("filename".to_string(), "sales.csv".to_string())]),
        );
        let other = PointPayload::new(
            "row".to_string(),
            BTreeMap::from([("source".to_string(), "other.csv".to_string())]),
        );

        assert!(filter.matches(&by_source));
        assert!(filter.matches(&by_filename));
        assert!(!filter.matches(&other));
    }

    #[test]
    fn qdrant_filter_shape_uses_should_clauses() {
        let filter = ScrollFilter::for_filename("sales.csv");
        let value = filter.to_qdrant();
        let clauses = value.get("should").and_then(Value::as_array).unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0]["match"]["value"], "sales.csv");
    }
}
