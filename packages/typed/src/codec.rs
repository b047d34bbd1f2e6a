//! The two standard codecs.

use bytes::Bytes;
use stowage_core::{Codec, Error, Format, Value};

use crate::convert::{json_to_value, value_to_json};

/// A codec that handles JSON encoding/decoding.
///
/// This is the default codec for most use cases. Binary values are written
/// as base64 strings.
///
/// # Example
///
/// ```rust
/// use stowage_typed::JsonCodec;
/// use stowage_core::{Codec, Value};
///
/// let codec = JsonCodec;
/// let value = Value::from("hello");
///
/// let bytes = codec.encode(&value).unwrap();
/// assert_eq!(codec.decode(&bytes).unwrap(), value);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn format(&self) -> Format {
        Format::JSON
    }

    fn encode(&self, value: &Value) -> Result<Bytes, Error> {
        let json = value_to_json(value.clone());
        let bytes =
            serde_json::to_vec(&json).map_err(|e| Error::encode(Format::JSON, e.to_string()))?;
        Ok(Bytes::from(bytes))
    }

    fn decode(&self, bytes: &Bytes) -> Result<Value, Error> {
        let json: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| Error::decode(Format::JSON, e.to_string()))?;
        Ok(json_to_value(json))
    }
}

/// MessagePack codec. Keeps binary values as binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgpackCodec;

impl Codec for MsgpackCodec {
    fn format(&self) -> Format {
        Format::MSGPACK
    }

    fn encode(&self, value: &Value) -> Result<Bytes, Error> {
        rmp_serde::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| Error::encode(Format::MSGPACK, e.to_string()))
    }

    fn decode(&self, bytes: &Bytes) -> Result<Value, Error> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::decode(Format::MSGPACK, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn nested() -> Value {
        let mut inner = BTreeMap::new();
        inner.insert("x".to_string(), Value::Float(1.5));
        inner.insert("ok".to_string(), Value::Bool(true));
        let mut map = BTreeMap::new();
        map.insert("id".to_string(), Value::from("a"));
        map.insert("n".to_string(), Value::Integer(-4));
        map.insert("inner".to_string(), Value::Map(inner));
        map.insert("none".to_string(), Value::Null);
        Value::Map(map)
    }

    #[test]
    fn json_codec_format() {
        assert_eq!(JsonCodec.format(), Format::JSON);
    }

    #[test]
    fn json_round_trip() {
        let bytes = JsonCodec.encode(&nested()).unwrap();
        assert_eq!(JsonCodec.decode(&bytes).unwrap(), nested());
    }

    #[test]
    fn json_rejects_garbage() {
        let err = JsonCodec.decode(&Bytes::from_static(b"{nope")).unwrap_err();
        assert!(matches!(err, Error::Decode { format, .. } if format == Format::JSON));
    }

    #[test]
    fn msgpack_round_trip_keeps_bytes() {
        let mut map = BTreeMap::new();
        map.insert("raw".to_string(), Value::Bytes(vec![0, 159, 146, 150]));
        let value = Value::Map(map);

        let bytes = MsgpackCodec.encode(&value).unwrap();
        assert_eq!(MsgpackCodec.decode(&bytes).unwrap(), value);
        assert_eq!(MsgpackCodec.decode(&MsgpackCodec.encode(&nested()).unwrap()).unwrap(), nested());
    }

    #[test]
    fn msgpack_rejects_truncated_input() {
        let bytes = MsgpackCodec.encode(&nested()).unwrap();
        let truncated = bytes.slice(..bytes.len() - 2);
        assert!(matches!(
            MsgpackCodec.decode(&truncated),
            Err(Error::Decode { .. })
        ));
    }
}
