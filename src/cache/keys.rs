//! Cache key derivation.
//!
//! A key fingerprints one `(category, params, caller identity)` triple.
//! Params are rendered canonically (recursively key-sorted) before
//! hashing, so semantically identical requests issued with
//! differently-ordered parameters collide to the same key.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::CacheKey;

/// Field separator inside the digest input; cannot occur in JSON output.
const SEP: &[u8] = &[0x1f];

/// Derive the cache key for a request on behalf of one caller.
///
/// Pure and deterministic. The digest keeps key length fixed and keeps
/// parameter values out of anything that prints keys.
pub fn derive_key(category: &str, params: &Map<String, Value>, caller_identity: &str) -> CacheKey {
    let mut canonical = String::new();
    write_canonical_object(params, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(category.as_bytes());
    hasher.update(SEP);
    hasher.update(canonical.as_bytes());
    hasher.update(SEP);
    hasher.update(caller_identity.as_bytes());

    CacheKey::from_digest(hex::encode(hasher.finalize()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars already have a single JSON rendering.
        other => out.push_str(&other.to_string()),
    }
}

fn write_canonical_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_unstable();

    out.push('{');
    for (index, key) in keys.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(&map[key], out);
    }
    out.push('}');
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn key_is_fixed_length_hex() {
        let key = derive_key("list-identities", &Map::new(), "alice@example.com");
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let mut first = Map::new();
        first.insert("filter".to_string(), json!("active"));
        first.insert("top".to_string(), json!(50));

        let mut second = Map::new();
        second.insert("top".to_string(), json!(50));
        second.insert("filter".to_string(), json!("active"));

        assert_eq!(
            derive_key("list-identities", &first, "alice"),
            derive_key("list-identities", &second, "alice"),
        );
    }

    #[test]
    fn nested_objects_are_canonicalized() {
        let first = params(json!({"filter": {"status": "active", "system": 7}}));
        let second = params(json!({"filter": {"system": 7, "status": "active"}}));

        assert_eq!(
            derive_key("resources", &first, "alice"),
            derive_key("resources", &second, "alice"),
        );
    }

    #[test]
    fn caller_identity_separates_keys() {
        let p = params(json!({"top": 10}));
        assert_ne!(
            derive_key("list-identities", &p, "alice"),
            derive_key("list-identities", &p, "bob"),
        );
    }

    #[test]
    fn category_separates_keys() {
        let p = Map::new();
        assert_ne!(
            derive_key("resources", &p, "alice"),
            derive_key("roles", &p, "alice"),
        );
    }

    #[test]
    fn parameter_values_separate_keys() {
        let first = params(json!({"top": 10}));
        let second = params(json!({"top": 11}));
        assert_ne!(
            derive_key("resources", &first, "alice"),
            derive_key("resources", &second, "alice"),
        );
    }

    #[test]
    fn array_order_is_preserved() {
        let first = params(json!({"ids": [1, 2]}));
        let second = params(json!({"ids": [2, 1]}));
        assert_ne!(
            derive_key("resources", &first, "alice"),
            derive_key("resources", &second, "alice"),
        );
    }
}
