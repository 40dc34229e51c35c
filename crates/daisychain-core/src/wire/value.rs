//! Wire-safe values.
//!
//! [`WireValue`] is the JSON data model with references as their own tagged
//! variant. On the wire a reference is the mapping `{"type": .., "id": ..}`;
//! [`From<serde_json::Value>`] is the only place that shape is recognised,
//! and it only matches mappings with exactly those two string-valued keys.

use crate::reference::RemoteReference;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::BTreeMap;

/// A value as it travels between client and host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "JsonValue", into = "JsonValue")]
pub enum WireValue {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<WireValue>),
    Map(BTreeMap<String, WireValue>),
    Reference(RemoteReference),
}

impl WireValue {
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WireValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WireValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&RemoteReference> {
        match self {
            WireValue::Reference(reference) => Some(reference),
            _ => None,
        }
    }
}

fn reference_shape(map: &Map<String, JsonValue>) -> Option<RemoteReference> {
    if map.len() != 2 {
        return None;
    }
    let type_name = map.get("type")?.as_str()?;
    let id = map.get("id")?.as_str()?;
    Some(RemoteReference::new(type_name, id))
}

impl From<JsonValue> for WireValue {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => WireValue::Null,
            JsonValue::Bool(b) => WireValue::Bool(b),
            JsonValue::Number(n) => WireValue::Number(n),
            JsonValue::String(s) => WireValue::String(s),
            JsonValue::Array(items) => {
                WireValue::List(items.into_iter().map(WireValue::from).collect())
            }
            JsonValue::Object(map) => match reference_shape(&map) {
                Some(reference) => WireValue::Reference(reference),
                None => WireValue::Map(
                    map.into_iter()
                        .map(|(k, v)| (k, WireValue::from(v)))
                        .collect(),
                ),
            },
        }
    }
}

impl From<WireValue> for JsonValue {
    fn from(value: WireValue) -> Self {
        match value {
            WireValue::Null => JsonValue::Null,
            WireValue::Bool(b) => JsonValue::Bool(b),
            WireValue::Number(n) => JsonValue::Number(n),
            WireValue::String(s) => JsonValue::String(s),
            WireValue::List(items) => {
                JsonValue::Array(items.into_iter().map(JsonValue::from).collect())
            }
            WireValue::Map(map) => JsonValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, JsonValue::from(v)))
                    .collect(),
            ),
            WireValue::Reference(reference) => {
                let mut map = Map::new();
                map.insert("type".to_string(), JsonValue::String(reference.type_name));
                map.insert("id".to_string(), JsonValue::String(reference.id));
                JsonValue::Object(map)
            }
        }
    }
}

impl From<RemoteReference> for WireValue {
    fn from(reference: RemoteReference) -> Self {
        WireValue::Reference(reference)
    }
}

impl From<&RemoteReference> for WireValue {
    fn from(reference: &RemoteReference) -> Self {
        WireValue::Reference(reference.clone())
    }
}

impl From<bool> for WireValue {
    fn from(b: bool) -> Self {
        WireValue::Bool(b)
    }
}

impl From<i64> for WireValue {
    fn from(n: i64) -> Self {
        WireValue::Number(n.into())
    }
}

impl From<i32> for WireValue {
    fn from(n: i32) -> Self {
        WireValue::Number(n.into())
    }
}

impl From<f64> for WireValue {
    fn from(n: f64) -> Self {
        Number::from_f64(n)
            .map(WireValue::Number)
            .unwrap_or(WireValue::Null)
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        WireValue::String(s.to_string())
    }
}

impl From<String> for WireValue {
    fn from(s: String) -> Self {
        WireValue::String(s)
    }
}

impl<T: Into<WireValue>> From<Vec<T>> for WireValue {
    fn from(items: Vec<T>) -> Self {
        WireValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<WireValue>> From<Option<T>> for WireValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(WireValue::Null)
    }
}
