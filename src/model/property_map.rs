//! PropertyMap — the key-value store on nodes and relationships.

use std::collections::HashMap;
use super::Value;

/// A map of property names to values.
pub type PropertyMap = HashMap<String, Value>;

/// Build a PropertyMap from `(key, value)` pairs.
pub fn props<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> PropertyMap
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Typed accessors over a PropertyMap. Absent keys and NULL read as `None`.
pub trait PropertyMapExt {
    fn get_str(&self, key: &str) -> Option<&str>;
    fn get_f64(&self, key: &str) -> Option<f64>;
    fn has(&self, key: &str) -> bool;

    /// Apply a partial update: NULL values remove the key, everything else
    /// overwrites.
    fn merge_delta(&mut self, delta: &PropertyMap);
}

impl PropertyMapExt for PropertyMap {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_float)
    }

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_null())
    }

    fn merge_delta(&mut self, delta: &PropertyMap) {
        for (key, value) in delta {
            if value.is_null() {
                self.remove(key);
            } else {
                self.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_delta_removes_nulls() {
        let mut base = props([("name", Value::from("Heat")), ("description", Value::from("warm"))]);
        let delta = props([("description", Value::Null), ("quality", Value::from("Reality"))]);
        base.merge_delta(&delta);

        assert_eq!(base.get_str("name"), Some("Heat"));
        assert!(!base.has("description"));
        assert_eq!(base.get_str("quality"), Some("Reality"));
    }

    #[test]
    fn test_null_is_absent() {
        let map = props([("distance", Value::Null)]);
        assert!(!map.has("distance"));
        assert_eq!(map.get_f64("distance"), None);
    }
}
