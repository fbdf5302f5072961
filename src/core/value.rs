use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Ordered mapping from index to element. Indices are not required to be
/// contiguous: removing an entry leaves a hole, and a configured append
/// counter may assign indices that skip values entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Container(BTreeMap<u64, Json>);

impl Container {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, index: u64, element: Json) {
        self.0.insert(index, element);
    }

    pub fn remove(&mut self, index: u64) -> Option<Json> {
        self.0.remove(&index)
    }

    pub fn get(&self, index: u64) -> Option<&Json> {
        self.0.get(&index)
    }

    pub fn contains(&self, index: u64) -> bool {
        self.0.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &Json)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    /// Index the next plain append lands on: one past the highest existing
    /// index, or 0 for an empty container.
    pub fn next_index(&self) -> u64 {
        self.0
            .keys()
            .next_back()
            .map(|last| last + 1)
            .unwrap_or(0)
    }

    /// Contiguous sub-range in iteration order, original indices preserved.
    pub fn slice(&self, offset: usize, count: usize) -> Container {
        Container(
            self.0
                .iter()
                .skip(offset)
                .take(count)
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        )
    }
}

impl FromIterator<Json> for Container {
    fn from_iter<T: IntoIterator<Item = Json>>(iter: T) -> Self {
        Container(
            iter.into_iter()
                .enumerate()
                .map(|(i, v)| (i as u64, v))
                .collect(),
        )
    }
}

/// A stored value: either an opaque scalar payload or a container that the
/// composite operations (append/remove/pull/fetch) may address by index.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Json),
    Container(Container),
}

impl Value {
    /// Classify an incoming JSON payload. Arrays and objects whose keys all
    /// parse as indices become containers; everything else is a scalar.
    pub fn from_json(json: Json) -> Value {
        match json {
            Json::Array(items) => Value::Container(items.into_iter().collect()),
            Json::Object(map) => match numeric_keyed(&map) {
                Some(container) => Value::Container(container),
                None => Value::Scalar(Json::Object(map)),
            },
            other => Value::Scalar(other),
        }
    }

    /// Decode a stored payload. The stored shape is narrower than
    /// [`Value::from_json`] accepts: containers are always written as
    /// objects, so arrays read back from a foreign writer stay scalars.
    pub fn from_payload(payload: &[u8]) -> Result<Value, serde_json::Error> {
        let json: Json = serde_json::from_slice(payload)?;
        Ok(match json {
            Json::Object(map) => match numeric_keyed(&map) {
                Some(container) => Value::Container(container),
                None => Value::Scalar(Json::Object(map)),
            },
            other => Value::Scalar(other),
        })
    }

    pub fn to_payload(&self) -> Vec<u8> {
        match self {
            // Both arms serialize infallibly: Json and BTreeMap<u64, Json>
            // have no non-string-keyed intermediate maps.
            Value::Scalar(json) => serde_json::to_vec(json).unwrap_or_default(),
            Value::Container(container) => serde_json::to_vec(container).unwrap_or_default(),
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Value::Container(c) => Some(c),
            Value::Scalar(_) => None,
        }
    }

    pub fn into_json(self) -> Json {
        match self {
            Value::Scalar(json) => json,
            Value::Container(container) => {
                Json::Object(container.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
            }
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::from_json(json)
    }
}

fn numeric_keyed(map: &serde_json::Map<String, Json>) -> Option<Container> {
    let mut entries = BTreeMap::new();
    for (k, v) in map {
        entries.insert(k.parse::<u64>().ok()?, v.clone());
    }
    Some(Container(entries))
}

/// Integer coercion used by the read-modify-write counter fallback.
///
/// WARNING: values outside the i64 range wrap or invert sign here; that
/// matches the historical adapter behavior and is deliberately not fixed.
pub fn coerce_i64(value: &Value) -> i64 {
    let json = match value {
        Value::Scalar(json) => json,
        Value::Container(_) => return 0,
    };
    match json {
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else if let Some(u) = n.as_u64() {
                u as i64
            } else {
                n.as_f64().unwrap_or(0.0) as i64
            }
        }
        Json::String(s) => s
            .trim()
            .parse::<i64>()
            .or_else(|_| s.trim().parse::<f64>().map(|f| f as i64))
            .unwrap_or(0),
        Json::Bool(b) => *b as i64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_becomes_container() {
        let value = Value::from_json(json!(["a", "b"]));
        let container = value.as_container().expect("array should be a container");
        assert_eq!(container.len(), 2);
        assert_eq!(container.get(0), Some(&json!("a")));
        assert_eq!(container.get(1), Some(&json!("b")));
    }

    #[test]
    fn test_empty_array_is_empty_container() {
        let value = Value::from_json(json!([]));
        assert!(value.as_container().is_some_and(Container::is_empty));
    }

    #[test]
    fn test_numeric_keyed_object_round_trips_as_container() {
        let value = Value::from_json(json!({"0": "x", "7": "y"}));
        let payload = value.to_payload();
        let back = Value::from_payload(&payload).unwrap();
        let container = back.as_container().unwrap();
        assert_eq!(container.get(7), Some(&json!("y")));
        assert!(!container.contains(1));
    }

    #[test]
    fn test_plain_object_stays_scalar() {
        let value = Value::from_json(json!({"name": "cart"}));
        assert!(value.as_container().is_none());
    }

    #[test]
    fn test_scalar_payload_round_trip() {
        let value = Value::from_json(json!("hello"));
        let back = Value::from_payload(&value.to_payload()).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_next_index_skips_holes() {
        let mut container: Container = vec![json!(1), json!(2), json!(3)].into_iter().collect();
        container.remove(1);
        assert_eq!(container.next_index(), 3);
        assert_eq!(Container::new().next_index(), 0);
    }

    #[test]
    fn test_slice_preserves_indices() {
        let container: Container = (0..5).map(|i| json!(i)).collect();
        let slice = container.slice(2, 2);
        assert_eq!(slice.len(), 2);
        assert_eq!(slice.get(2), Some(&json!(2)));
        assert_eq!(slice.get(3), Some(&json!(3)));
    }

    #[test]
    fn test_coerce_wraps_above_i64_range() {
        // u64 values past i64::MAX invert sign, as documented.
        let value = Value::Scalar(json!(u64::MAX));
        assert_eq!(coerce_i64(&value), -1);

        assert_eq!(coerce_i64(&Value::Scalar(json!("42"))), 42);
        assert_eq!(coerce_i64(&Value::Scalar(json!("not a number"))), 0);
        assert_eq!(coerce_i64(&Value::Scalar(Json::Null)), 0);
    }
}
