// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Values attached to log events and contexts before they become JSON.
//!
//! Auxiliary data does not have to be plain JSON: maps can be shared (and
//! therefore cyclic) and arbitrary objects can be attached for their debug
//! representation. [`FieldValue::to_json`] turns any of it into a
//! `serde_json::Value` without failing:
//!
//! - an opaque value becomes its `Debug` string
//! - a value whose `Serialize` impl fails becomes `<unserializable: ...>`
//! - a map that refers back to one of its ancestors becomes
//!   [`CIRCULAR_REFERENCE_PLACEHOLDER`]
//!
//! The cycle check is per branch: the same map reached through two sibling
//! keys is serialized twice, only a map nested inside itself is cut.

use crate::constants::CIRCULAR_REFERENCE_PLACEHOLDER;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Debug)]
pub enum FieldValue {
    /// Plain JSON data.
    Json(Value),
    /// A map that may be shared with other values, including its own descendants.
    Map(SharedMap),
    List(Vec<FieldValue>),
    /// Anything else, rendered through its `Debug` impl.
    Opaque(Arc<dyn fmt::Debug + Send + Sync>),
}

impl FieldValue {
    #[must_use]
    pub fn opaque<T>(value: T) -> Self
    where
        T: fmt::Debug + Send + Sync + 'static,
    {
        FieldValue::Opaque(Arc::new(value))
    }

    /// Serializes `value` right away; a failing `Serialize` impl yields a
    /// placeholder string instead of an error.
    #[must_use]
    pub fn serialized<T>(value: &T) -> Self
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_value(value) {
            Ok(json) => FieldValue::Json(json),
            Err(e) => FieldValue::Json(Value::String(format!("<unserializable: {e}>"))),
        }
    }

    /// Whether this value is a mapping (only mappings are valid contexts).
    #[must_use]
    pub fn is_mapping(&self) -> bool {
        matches!(self, FieldValue::Map(_) | FieldValue::Json(Value::Object(_)))
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut ancestors = Vec::new();
        self.sanitize(&mut ancestors)
    }

    fn sanitize(&self, ancestors: &mut Vec<usize>) -> Value {
        match self {
            FieldValue::Json(value) => value.clone(),
            FieldValue::Opaque(value) => Value::String(format!("{value:?}")),
            FieldValue::List(items) => {
                Value::Array(items.iter().map(|item| item.sanitize(ancestors)).collect())
            }
            FieldValue::Map(map) => {
                let id = map.id();
                if ancestors.contains(&id) {
                    return Value::String(CIRCULAR_REFERENCE_PLACEHOLDER.to_string());
                }

                ancestors.push(id);
                // Entries are cloned out so no lock is held while descending.
                let object: Map<String, Value> = map
                    .entries()
                    .into_iter()
                    .map(|(key, value)| (key, value.sanitize(ancestors)))
                    .collect();
                ancestors.pop();

                Value::Object(object)
            }
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

impl From<Map<String, Value>> for FieldValue {
    fn from(map: Map<String, Value>) -> Self {
        FieldValue::Json(Value::Object(map))
    }
}

impl From<SharedMap> for FieldValue {
    fn from(map: SharedMap) -> Self {
        FieldValue::Map(map)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(items: Vec<FieldValue>) -> Self {
        FieldValue::List(items)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Json(Value::String(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Json(Value::String(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Json(Value::Bool(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        // JSON has no NaN or infinities
        match Number::from_f64(value) {
            Some(number) => FieldValue::Json(Value::Number(number)),
            None => FieldValue::Json(Value::String(value.to_string())),
        }
    }
}

/// A reference-counted map that several values can point at.
#[derive(Clone, Default)]
pub struct SharedMap(Arc<Mutex<BTreeMap<String, FieldValue>>>);

impl SharedMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, FieldValue>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.lock().insert(key.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<FieldValue> {
        self.lock().get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn entries(&self) -> Vec<(String, FieldValue)> {
        self.lock()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl<K, V> FromIterator<(K, V)> for SharedMap
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = SharedMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

// Printing the entries could recurse forever on a cycle.
impl fmt::Debug for SharedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMap")
            .field("id", &format_args!("{:#x}", self.id()))
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::{Error as _, Serializer};
    use serde_json::json;

    struct UnserializableObject;

    impl Serialize for UnserializableObject {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("no serializer for this type"))
        }
    }

    #[derive(Debug)]
    #[allow(dead_code)]
    struct Request {
        path: &'static str,
    }

    #[test]
    fn test_circular_reference_is_replaced() {
        let circular = SharedMap::new();
        let egg = SharedMap::new();
        circular.insert("egg", egg.clone());
        egg.insert("chicken", circular.clone());

        let json = FieldValue::from(circular).to_json();
        assert_eq!(json["egg"]["chicken"], json!(CIRCULAR_REFERENCE_PLACEHOLDER));
    }

    #[test]
    fn test_self_reference_is_replaced() {
        let map = SharedMap::new();
        map.insert("me", map.clone());
        map.insert("name", "loop");

        let json = FieldValue::from(map).to_json();
        assert_eq!(json, json!({"me": CIRCULAR_REFERENCE_PLACEHOLDER, "name": "loop"}));
    }

    #[test]
    fn test_shared_siblings_are_not_circular() {
        let shared: SharedMap = [("name", "Test Test")].into_iter().collect();
        let parent = SharedMap::new();
        parent.insert("first", shared.clone());
        parent.insert("second", shared.clone());
        parent.insert(
            "list",
            vec![FieldValue::from(shared.clone()), FieldValue::from(shared)],
        );

        let json = FieldValue::from(parent).to_json();
        assert_eq!(json["first"], json!({"name": "Test Test"}));
        assert_eq!(json["second"], json!({"name": "Test Test"}));
        assert_eq!(json["list"], json!([{"name": "Test Test"}, {"name": "Test Test"}]));
    }

    #[test]
    fn test_cycle_through_list_is_replaced() {
        let map = SharedMap::new();
        map.insert("items", vec![FieldValue::from(map.clone()), FieldValue::from(1)]);

        let json = FieldValue::from(map).to_json();
        assert_eq!(json["items"], json!([CIRCULAR_REFERENCE_PLACEHOLDER, 1]));
    }

    #[test]
    fn test_opaque_value_uses_debug_repr() {
        let value = FieldValue::opaque(Request { path: "/orders" });
        assert_eq!(value.to_json(), json!("Request { path: \"/orders\" }"));
    }

    #[test]
    fn test_unserializable_value_becomes_placeholder() {
        let value = FieldValue::serialized(&UnserializableObject);
        let json = value.to_json();
        let text = json.as_str().expect("placeholder should be a string");
        assert!(text.starts_with("<unserializable: "));
        assert!(text.contains("no serializer for this type"));
    }

    #[test]
    fn test_serialized_value_keeps_structure() {
        let value = FieldValue::serialized(&json!({"id": "1234", "amount": 200}));
        assert!(value.is_mapping());
        assert_eq!(value.to_json(), json!({"id": "1234", "amount": 200}));
    }

    #[test]
    fn test_non_finite_float_becomes_string() {
        assert_eq!(FieldValue::from(f64::NAN).to_json(), json!("NaN"));
        assert_eq!(FieldValue::from(1.5).to_json(), json!(1.5));
    }

    #[test]
    fn test_is_mapping() {
        assert!(FieldValue::from(SharedMap::new()).is_mapping());
        assert!(FieldValue::from(json!({})).is_mapping());
        assert!(!FieldValue::from(json!([])).is_mapping());
        assert!(!FieldValue::from("x").is_mapping());
        assert!(!FieldValue::from(1).is_mapping());
    }

    #[test]
    fn test_debug_of_cyclic_map_terminates() {
        let map = SharedMap::new();
        map.insert("me", map.clone());
        let debug_str = format!("{:?}", FieldValue::from(map));
        assert!(debug_str.contains("SharedMap"));
    }
}
