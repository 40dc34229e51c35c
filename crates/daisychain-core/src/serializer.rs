//! Conversion between host values and wire values.
//!
//! Serializing registers every object it meets in the [`ReferenceCache`];
//! deserializing resolves every reference it meets. An unknown reference is
//! a `LookupError`, never a silent `null`.

use crate::reference::ReferenceCache;
use crate::value::Value;
use crate::wire::WireValue;
use crate::{DaisyError, Result};

/// Convert a host value for transmission.
pub fn serialize(cache: &mut ReferenceCache, value: Value) -> Result<WireValue> {
    Ok(match value {
        Value::Null => WireValue::Null,
        Value::Bool(b) => WireValue::Bool(b),
        Value::Number(n) => WireValue::Number(n),
        Value::String(s) => WireValue::String(s),
        Value::List(items) => WireValue::List(
            items
                .into_iter()
                .map(|item| serialize(cache, item))
                .collect::<Result<_>>()?,
        ),
        Value::Map(map) => WireValue::Map(
            map.into_iter()
                .map(|(k, v)| Ok((k, serialize(cache, v)?)))
                .collect::<Result<_>>()?,
        ),
        Value::Object(object) => WireValue::Reference(cache.register(&object)?),
    })
}

/// Convert a received wire value into a host value.
pub fn deserialize(cache: &ReferenceCache, value: WireValue) -> Result<Value> {
    Ok(match value {
        WireValue::Null => Value::Null,
        WireValue::Bool(b) => Value::Bool(b),
        WireValue::Number(n) => Value::Number(n),
        WireValue::String(s) => Value::String(s),
        WireValue::List(items) => Value::List(
            items
                .into_iter()
                .map(|item| deserialize(cache, item))
                .collect::<Result<_>>()?,
        ),
        WireValue::Map(map) => Value::Map(
            map.into_iter()
                .map(|(k, v)| Ok((k, deserialize(cache, v)?)))
                .collect::<Result<_>>()?,
        ),
        WireValue::Reference(reference) => match cache.resolve(&reference.id) {
            Some(entry) => Value::Object(entry.object().clone()),
            None => return Err(DaisyError::Lookup { id: reference.id }),
        },
    })
}
