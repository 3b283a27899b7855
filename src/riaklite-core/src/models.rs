use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bucket type used when none is given
pub const DEFAULT_BUCKET_TYPE: &str = "default";

/// Bucket type holding counter datatypes
pub const COUNTERS_BUCKET_TYPE: &str = "counters";

/// Search schema used by new indexes unless another is named
pub const DEFAULT_SCHEMA: &str = "_yz_default";

pub const DEFAULT_N_VAL: u32 = 3;

/// Bucket property linking a bucket to a search index
pub const SEARCH_INDEX_PROPERTY: &str = "search_index";

/// Largest file accepted for binary upload or schema creation (2 MiB)
pub const MAX_FILE_BYTESIZE: u64 = 2 * 1024 * 1024;

/// Counter datatype as returned by the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counter {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub value: i64,
}

/// Body of a counter update
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CounterOp {
    Increment(u64),
    Decrement(u64),
}

/// `response` object of a search reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResults {
    #[serde(rename = "numFound", default)]
    pub num_found: u64,
    #[serde(default)]
    pub start: u64,
    #[serde(rename = "maxScore", default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub docs: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Body of a search index creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexDefinition {
    pub schema: String,
    pub n_val: u32,
}

impl IndexDefinition {
    /// A zero replication factor falls back to [`DEFAULT_N_VAL`]
    pub fn new(schema: impl Into<String>, n_val: u32) -> Self {
        Self {
            schema: schema.into(),
            n_val: if n_val == 0 { DEFAULT_N_VAL } else { n_val },
        }
    }
}

impl Default for IndexDefinition {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMA, DEFAULT_N_VAL)
    }
}

/// Body of a bucket properties update
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BucketProps {
    pub props: HashMap<String, serde_json::Value>,
}

impl BucketProps {
    pub fn single(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let mut props = HashMap::new();
        props.insert(name.into(), value.into());
        Self { props }
    }
}

// Routes are lists of unescaped path segments. The client percent-encodes
// each one, so names may contain `/`, `#`, `?` or spaces.

/// Path of a key-value object inside a bucket type
pub fn key_route<'a>(bucket_type: &'a str, bucket: &'a str, key: &'a str) -> Vec<&'a str> {
    vec!["types", bucket_type, "buckets", bucket, "keys", key]
}

pub fn counter_route<'a>(bucket: &'a str, key: &'a str) -> Vec<&'a str> {
    vec!["types", COUNTERS_BUCKET_TYPE, "buckets", bucket, "datatypes", key]
}

/// Path of a raw object in the default bucket type
pub fn binary_route<'a>(bucket: &'a str, key: &'a str) -> Vec<&'a str> {
    vec!["buckets", bucket, "keys", key]
}

pub fn search_route(bucket: &str) -> Vec<&str> {
    vec!["search", "query", bucket]
}

pub fn schema_route(name: &str) -> Vec<&str> {
    vec!["search", "schema", name]
}

pub fn index_route(name: &str) -> Vec<&str> {
    vec!["search", "index", name]
}

pub fn props_route(bucket: &str) -> Vec<&str> {
    vec!["buckets", bucket, "props"]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counter_op_body() {
        assert_eq!(
            serde_json::to_value(CounterOp::Increment(0)).unwrap(),
            json!({"increment": 0})
        );
        assert_eq!(
            serde_json::to_value(CounterOp::Decrement(7)).unwrap(),
            json!({"decrement": 7})
        );
    }

    #[test]
    fn test_index_definition_n_val_fallback() {
        let index = IndexDefinition::new("my_schema", 0);
        assert_eq!(index.n_val, 3);
        assert_eq!(
            serde_json::to_value(&index).unwrap(),
            json!({"schema": "my_schema", "n_val": 3})
        );
        assert_eq!(IndexDefinition::new("s", 5).n_val, 5);
        assert_eq!(IndexDefinition::default().schema, "_yz_default");
    }

    #[test]
    fn test_bucket_props_body() {
        let props = BucketProps::single("search_index", "famous");
        assert_eq!(
            serde_json::to_value(&props).unwrap(),
            json!({"props": {"search_index": "famous"}})
        );
    }

    #[test]
    fn test_search_results_decode() {
        let results: SearchResults = serde_json::from_value(json!({
            "numFound": 2,
            "start": 0,
            "maxScore": 1.5,
            "docs": [{"_yz_rk": "a", "name_s": "x"}, {"_yz_rk": "b"}]
        }))
        .unwrap();

        assert_eq!(results.num_found, 2);
        assert_eq!(results.max_score, Some(1.5));
        assert_eq!(results.docs.len(), 2);
        assert_eq!(results.docs[0]["name_s"], json!("x"));
    }

    #[test]
    fn test_counter_decode() {
        let counter: Counter = serde_json::from_value(json!({"type": "counter", "value": 42})).unwrap();
        assert_eq!(counter.value, 42);
        assert_eq!(counter.kind.as_deref(), Some("counter"));
    }

    #[test]
    fn test_routes() {
        assert_eq!(
            key_route("default", "users", "u1"),
            ["types", "default", "buckets", "users", "keys", "u1"]
        );
        assert_eq!(
            counter_route("hits", "page"),
            ["types", "counters", "buckets", "hits", "datatypes", "page"]
        );
        assert_eq!(binary_route("files", "a/b.png"), ["buckets", "files", "keys", "a/b.png"]);
        assert_eq!(search_route("users"), ["search", "query", "users"]);
        assert_eq!(schema_route("s"), ["search", "schema", "s"]);
        assert_eq!(index_route("i"), ["search", "index", "i"]);
        assert_eq!(props_route("users"), ["buckets", "users", "props"]);
    }
}
