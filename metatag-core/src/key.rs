//! Cache key canonicalization.
//!
//! A cache key is the tuple `(namespace, params)`. Its identity is a string
//! produced by serializing the tuple to JSON with every object's fields sorted
//! lexicographically, so field order never affects identity while sequence
//! order always does.

use serde::Serialize;
use serde_json::{Map, Value};
use std::rc::Rc;

/// Canonical string identity of any serializable value.
///
/// Values that cannot be represented as JSON (maps with non-string keys, for
/// instance) hash to a marker string carrying the serializer error; every such
/// value collides, so key parameters should stay JSON-representable.
pub fn hash_key<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(value) => canonical_string(&canonicalize(value)),
        Err(e) => {
            tracing::warn!(error = %e, "cache key is not JSON-representable");
            format!("!unhashable:{}", e)
        }
    }
}

/// Rebuild a JSON value with every object's fields in sorted order.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

fn canonical_string(value: &Value) -> String {
    // Serializing a `Value` cannot fail.
    serde_json::to_string(value).unwrap_or_default()
}

/// A namespaced cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey<P> {
    namespace: String,
    params: P,
}

impl<P: Serialize> CacheKey<P> {
    /// Create a key in `namespace` for `params`.
    pub fn new(namespace: impl Into<String>, params: P) -> Self {
        Self {
            namespace: namespace.into(),
            params,
        }
    }

    /// The namespace this key belongs to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The parameters of this key.
    pub fn params(&self) -> &P {
        &self.params
    }

    /// Consume the key, returning its parameters.
    pub fn into_params(self) -> P {
        self.params
    }

    /// Canonical hash: JSON of `[namespace, params]` with sorted object fields.
    pub fn hash(&self) -> String {
        hash_key(&(&self.namespace, &self.params))
    }
}

/// Split a canonical hash back into its namespace and parameter value.
///
/// Returns `None` for strings not produced by [`CacheKey::hash`].
pub fn decode_key(hash: &str) -> Option<(String, Value)> {
    let value: Value = serde_json::from_str(hash).ok()?;
    let Value::Array(mut parts) = value else {
        return None;
    };
    if parts.len() != 2 {
        return None;
    }
    let params = parts.pop()?;
    let namespace = parts.pop()?.as_str()?.to_string();
    Some((namespace, params))
}

/// Compare two parameter lists position by position.
///
/// Elements at the same position are equal when they are the same allocation
/// or when their canonical hashes match.
pub fn compare_params_list<P: Serialize>(old: &[P], new: &[P]) -> bool {
    if std::ptr::eq(old, new) {
        return true;
    }
    if old.len() != new.len() {
        return false;
    }
    old.iter()
        .zip(new.iter())
        .all(|(a, b)| std::ptr::eq(a, b) || hash_key(a) == hash_key(b))
}

/// Shallow comparison: same length and the same allocation at every position.
pub fn compare_slices_by_ref<T>(old: &[Rc<T>], new: &[Rc<T>]) -> bool {
    old.len() == new.len() && old.iter().zip(new).all(|(a, b)| Rc::ptr_eq(a, b))
}
