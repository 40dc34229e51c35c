//! Request and response envelopes.
//!
//! ```text
//! request:  {"root": {} | {"type": T, "id": ID}, "impl": NAME, "args": [..], "kwgs": {..}}
//! response: {"value": VALUE | null, "error": MESSAGE | null}
//! ```

use super::value::WireValue;
use crate::reference::RemoteReference;
use crate::{DaisyError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// What a request is addressed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(into = "JsonValue")]
pub enum CallTarget {
    /// The empty root `{}`, only valid for the bootstrap command.
    #[default]
    Unbound,
    Object(RemoteReference),
}

impl CallTarget {
    fn from_map(map: Map<String, JsonValue>) -> Result<Self> {
        if map.is_empty() {
            return Ok(CallTarget::Unbound);
        }
        let id = map.get("id").and_then(JsonValue::as_str).ok_or_else(|| {
            schema("root", "expected {} or a reference with a string 'id'")
        })?;
        let type_name = map.get("type").and_then(JsonValue::as_str).unwrap_or_default();
        Ok(CallTarget::Object(RemoteReference::new(type_name, id)))
    }

    pub fn reference(&self) -> Option<&RemoteReference> {
        match self {
            CallTarget::Unbound => None,
            CallTarget::Object(reference) => Some(reference),
        }
    }
}

impl From<CallTarget> for JsonValue {
    fn from(target: CallTarget) -> Self {
        match target {
            CallTarget::Unbound => JsonValue::Object(Map::new()),
            CallTarget::Object(reference) => WireValue::Reference(reference).into(),
        }
    }
}

/// A method call request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub root: CallTarget,
    #[serde(rename = "impl")]
    pub method: String,
    pub args: Vec<WireValue>,
    pub kwgs: BTreeMap<String, WireValue>,
}

impl Request {
    pub fn new(root: CallTarget, method: impl Into<String>) -> Self {
        Self {
            root,
            method: method.into(),
            args: Vec::new(),
            kwgs: BTreeMap::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<WireValue>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwgs(mut self, kwgs: BTreeMap<String, WireValue>) -> Self {
        self.kwgs = kwgs;
        self
    }

    /// Decode and validate raw request bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| schema("request", format!("payload is not valid UTF-8: {}", e)))?;
        let json: JsonValue = serde_json::from_str(text)
            .map_err(|e| schema("request", format!("payload is not valid JSON: {}", e)))?;
        Self::from_json(json)
    }

    /// Validate a decoded request.
    ///
    /// Fields are checked in the order `root`, `impl`, `args`, `kwgs`; the
    /// first violation is reported.
    pub fn from_json(json: JsonValue) -> Result<Self> {
        let JsonValue::Object(mut fields) = json else {
            return Err(schema(
                "request",
                format!("expected a JSON object, got {}", json_kind(&json)),
            ));
        };

        let root = match fields.remove("root") {
            Some(JsonValue::Object(map)) => CallTarget::from_map(map)?,
            Some(other) => return Err(mistyped("root", "a mapping", &other)),
            None => return Err(schema("root", "missing")),
        };

        let method = match fields.remove("impl") {
            Some(JsonValue::String(method)) => method,
            Some(other) => return Err(mistyped("impl", "a string", &other)),
            None => return Err(schema("impl", "missing")),
        };

        let args = match fields.remove("args") {
            Some(JsonValue::Array(items)) => items.into_iter().map(WireValue::from).collect(),
            Some(other) => return Err(mistyped("args", "a list", &other)),
            None => return Err(schema("args", "missing")),
        };

        let kwgs = match fields.remove("kwgs") {
            Some(JsonValue::Object(map)) => map
                .into_iter()
                .map(|(k, v)| (k, WireValue::from(v)))
                .collect(),
            Some(other) => return Err(mistyped("kwgs", "a mapping", &other)),
            None => return Err(schema("kwgs", "missing")),
        };

        Ok(Self {
            root,
            method,
            args,
            kwgs,
        })
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Result of one call. Exactly one of `value` / `error` is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub value: Option<WireValue>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Response {
    pub fn success(value: WireValue) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    pub fn failure(error: &DaisyError) -> Self {
        Self {
            value: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Turn an error response into [`DaisyError::Rpc`].
    pub fn into_result(self) -> Result<WireValue> {
        match self.error {
            Some(message) => Err(DaisyError::Rpc { message }),
            None => Ok(self.value.unwrap_or_default()),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

fn schema(field: &str, message: impl Into<String>) -> DaisyError {
    DaisyError::Schema {
        field: field.to_string(),
        message: message.into(),
    }
}

fn mistyped(field: &str, expected: &str, got: &JsonValue) -> DaisyError {
    schema(field, format!("expected {}, got {}", expected, json_kind(got)))
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field_of(err: DaisyError) -> String {
        match err {
            DaisyError::Schema { field, .. } => field,
            other => panic!("Expected SchemaError, got: {:?}", other),
        }
    }

    #[test]
    fn test_bootstrap_request_shape() {
        let request = Request::new(CallTarget::Unbound, "daisychain_init");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            json!({"root": {}, "impl": "daisychain_init", "args": [], "kwgs": {}})
        );
    }

    #[test]
    fn test_request_roundtrip_through_validation() {
        let request = Request::new(
            CallTarget::Object(RemoteReference::new("Project", "aa")),
            "SetName",
        )
        .with_args(vec![WireValue::from("Reel 2")]);
        let parsed = Request::from_slice(&request.to_vec().unwrap()).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_missing_fields_are_reported_in_order() {
        let err = Request::from_json(json!({})).unwrap_err();
        assert_eq!(field_of(err), "root");

        let err = Request::from_json(json!({"root": {}})).unwrap_err();
        assert_eq!(field_of(err), "impl");

        let err = Request::from_json(json!({"root": {}, "impl": "x"})).unwrap_err();
        assert_eq!(field_of(err), "args");

        let err = Request::from_json(json!({"root": {}, "impl": "x", "args": []})).unwrap_err();
        assert_eq!(field_of(err), "kwgs");
    }

    #[test]
    fn test_mistyped_fields_are_rejected() {
        let err = Request::from_json(json!({"root": [], "impl": 3, "args": {}, "kwgs": []}))
            .unwrap_err();
        assert_eq!(field_of(err), "root");

        let err = Request::from_json(json!({"root": {}, "impl": 3, "args": [], "kwgs": {}}))
            .unwrap_err();
        assert_eq!(field_of(err), "impl");

        let err = Request::from_json(json!({"root": {}, "impl": "x", "args": "a", "kwgs": {}}))
            .unwrap_err();
        assert!(err.to_string().contains("expected a list, got string"));

        let err = Request::from_json(json!({"root": {}, "impl": "x", "args": [], "kwgs": [1]}))
            .unwrap_err();
        assert_eq!(field_of(err), "kwgs");
    }

    #[test]
    fn test_root_without_id_is_rejected() {
        let err = Request::from_json(json!({"root": {"type": "Root"}, "impl": "x", "args": [], "kwgs": {}}))
            .unwrap_err();
        assert_eq!(field_of(err), "root");
    }

    #[test]
    fn test_non_json_payloads() {
        assert!(Request::from_slice(b"not json").is_err());
        assert!(Request::from_slice(&[0xff, 0xfe, 0x00]).is_err());
        let err = Request::from_slice(b"[1, 2]").unwrap_err();
        assert!(err.to_string().contains("expected a JSON object"));
    }

    #[test]
    fn test_response_always_carries_both_keys() {
        let ok = serde_json::to_value(Response::success(WireValue::from(1i64))).unwrap();
        assert_eq!(ok, json!({"value": 1, "error": null}));

        let err = Response::failure(&DaisyError::Lookup { id: "deadbeef".into() });
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["value"], JsonValue::Null);
        assert!(json["error"].as_str().unwrap().contains("deadbeef"));
    }

    #[test]
    fn test_error_response_into_result() {
        let response = Response::from_slice(br#"{"value": 5, "error": "InvocationError: boom"}"#)
            .unwrap();
        match response.into_result() {
            Err(DaisyError::Rpc { message }) => assert!(message.contains("boom")),
            other => panic!("Expected Rpc error, got: {:?}", other),
        }
    }
}
