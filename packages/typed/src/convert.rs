//! Conversions between Value, serde types and Atoms.

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use stowage_core::{Atom, Error, Format, Spec, Value};

/// Convert a Value to a Rust type via serde.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    // Bytes go in as integer arrays so `Vec<u8>` fields deserialize.
    let json = into_json(value, BytesAs::Array);
    serde_json::from_value(json).map_err(|e| Error::decode(Format::VALUE, e.to_string()))
}

/// Convert a Rust type to a Value via serde.
pub fn to_value<T: Serialize>(data: &T) -> Result<Value, Error> {
    let json =
        serde_json::to_value(data).map_err(|e| Error::encode(Format::VALUE, e.to_string()))?;
    Ok(json_to_value(json))
}

/// Decompose a record into an Atom under its Spec.
pub fn atomize<T: Serialize>(spec: &Spec, record: &T) -> Result<Atom, Error> {
    Atom::from_value(spec, to_value(record)?)
}

/// Reassemble a record from an Atom under its Spec.
pub fn deatomize<T: DeserializeOwned>(spec: &Spec, atom: &Atom) -> Result<T, Error> {
    from_value(atom.to_value(spec)?)
}

/// Convert our Value to serde_json::Value.
///
/// Bytes become base64 strings, since JSON has no binary type.
pub fn value_to_json(value: Value) -> serde_json::Value {
    into_json(value, BytesAs::Base64)
}

#[derive(Clone, Copy)]
enum BytesAs {
    Base64,
    Array,
}

fn into_json(value: Value, bytes_as: BytesAs) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(b),
        Value::Integer(i) => serde_json::Value::Number(i.into()),
        Value::UInteger(u) => serde_json::Value::Number(u.into()),
        Value::Float(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s),
        Value::Bytes(b) => match bytes_as {
            BytesAs::Base64 => {
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(&b))
            }
            BytesAs::Array => serde_json::Value::Array(
                b.into_iter()
                    .map(|x| serde_json::Value::Number(x.into()))
                    .collect(),
            ),
        },
        Value::Array(arr) => serde_json::Value::Array(
            arr.into_iter()
                .map(|v| into_json(v, bytes_as))
                .collect(),
        ),
        Value::Map(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, into_json(v, bytes_as)))
                .collect(),
        ),
    }
}

/// Convert serde_json::Value to our Value.
pub fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInteger(u)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::String(n.to_string())
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => {
            Value::Array(arr.into_iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(map) => Value::Map(
            map.into_iter()
                .map(|(k, v)| (k, json_to_value(v)))
                .collect(),
        ),
    }
}
