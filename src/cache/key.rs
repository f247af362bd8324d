//! Deterministic cache key generation.
//!
//! Keys have the form `<report_type>:<sha256 hex>`. The parameter bag is
//! canonicalized before hashing: object keys are sorted at every depth while
//! array order is preserved, so two bags that are equal as mappings always
//! collapse to the same key, and the hash has no per-process seed.

use crate::models::{QueryParameters, ReportType};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Newtype for generated cache keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        CacheKey(key)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey(key.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyGenerator;

impl KeyGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Derive the key for a report type and an arbitrary parameter bag
    pub fn generate_key(&self, report_type: ReportType, params: &Value) -> CacheKey {
        let canonical = canonicalize(params);
        // Value's Display is compact JSON; it cannot fail for an in-memory tree
        let encoded = canonical.to_string();

        let mut hasher = Sha256::new();
        hasher.update(encoded.as_bytes());
        let digest = hex::encode(hasher.finalize());

        CacheKey(format!("{report_type}:{digest}"))
    }

    pub fn key_for(&self, params: &QueryParameters) -> CacheKey {
        self.generate_key(params.report_type(), &params.parameter_bag())
    }
}

/// Rebuild the value with every object's keys in sorted order.
///
/// `Null` and empty objects both stand for an absent bag, so they hash the same.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Null => Value::Object(Map::new()),
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize_nested(v));
            }
            Value::Object(sorted)
        }
        other => canonicalize_nested(other),
    }
}

fn canonicalize_nested(value: &Value) -> Value {
    match value {
        Value::Object(_) => canonicalize(value),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_nested).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateRange;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_key_format() {
        let key = KeyGenerator::new().generate_key(ReportType::Report, &json!({"a": 1}));
        let (prefix, hash) = key.as_str().split_once(':').unwrap();

        assert_eq!(prefix, "report");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_insertion_order_is_irrelevant() {
        let generator = KeyGenerator::new();
        let a = json!({"metrics": ["sessions"], "dimensions": ["country"], "options": {"limit": 5, "offset": 0}});
        let b = json!({"options": {"offset": 0, "limit": 5}, "dimensions": ["country"], "metrics": ["sessions"]});

        assert_eq!(
            generator.generate_key(ReportType::Report, &a),
            generator.generate_key(ReportType::Report, &b)
        );
    }

    #[test]
    fn test_sequence_order_and_values_matter() {
        let generator = KeyGenerator::new();
        let a = json!({"dimensions": ["country", "city"]});
        let b = json!({"dimensions": ["city", "country"]});
        let c = json!({"dimensions": ["country", "town"]});

        let ka = generator.generate_key(ReportType::Report, &a);
        assert_ne!(ka, generator.generate_key(ReportType::Report, &b));
        assert_ne!(ka, generator.generate_key(ReportType::Report, &c));
    }

    #[test]
    fn test_report_type_is_part_of_key() {
        let generator = KeyGenerator::new();
        let params = json!({"dimensions": ["country"]});

        assert_ne!(
            generator.generate_key(ReportType::Report, &params),
            generator.generate_key(ReportType::Realtime, &params)
        );
    }

    #[test]
    fn test_empty_params_hash_to_fixed_value() {
        let generator = KeyGenerator::new();
        let empty = generator.generate_key(ReportType::Dimension, &json!({}));

        assert_eq!(empty, generator.generate_key(ReportType::Dimension, &Value::Null));
        // sha256("{}")
        assert_eq!(
            empty.as_str(),
            "dimension:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn test_key_for_query_parameters() {
        let generator = KeyGenerator::new();
        let first = QueryParameters::report(DateRange::new("7daysAgo", "today"), ["country"], ["sessions"])
            .with_option("limit", 10)
            .with_option("keepEmptyRows", true);
        let second = QueryParameters::report(DateRange::new("7daysAgo", "today"), ["country"], ["sessions"])
            .with_option("keepEmptyRows", true)
            .with_option("limit", 10);

        assert_eq!(generator.key_for(&first), generator.key_for(&second));
        assert!(generator.key_for(&first).as_str().starts_with("report:"));
    }

    fn shuffled_object(entries: &[(String, i64)], rotate: usize) -> Value {
        let mut map = Map::new();
        let n = entries.len().max(1);
        for i in 0..entries.len() {
            let (k, v) = &entries[(i + rotate) % n];
            map.insert(k.clone(), json!({"value": v, "nested": {"z": 1, "a": k}}));
        }
        Value::Object(map)
    }

    proptest! {
        #[test]
        fn prop_key_is_insertion_order_independent(
            entries in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..12),
            rotate in 0usize..12,
        ) {
            let entries: Vec<(String, i64)> = entries.into_iter().collect();
            let generator = KeyGenerator::new();

            let original = shuffled_object(&entries, 0);
            let rotated = shuffled_object(&entries, rotate);

            prop_assert_eq!(
                generator.generate_key(ReportType::Report, &original),
                generator.generate_key(ReportType::Report, &rotated)
            );
        }
    }
}
