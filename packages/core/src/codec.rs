//! The codec contract.

use bytes::Bytes;

use crate::{Error, Format, Value};

/// Codec for converting between Value and persisted bytes.
///
/// The typed facades never see a wire format: a record goes through
/// `Value` on its way into and out of a codec. A codec reports the format it
/// produces, which blob buckets use as the default content type.
///
/// # Implementing Custom Codecs
///
/// ```rust
/// use stowage_core::{Codec, Value, Format, Error};
/// use bytes::Bytes;
///
/// struct TextCodec;
///
/// impl Codec for TextCodec {
///     fn format(&self) -> Format {
///         Format::from_static("text/plain")
///     }
///
///     fn encode(&self, value: &Value) -> Result<Bytes, Error> {
///         match value {
///             Value::String(s) => Ok(Bytes::from(s.clone())),
///             other => Err(Error::encode(self.format(), format!("cannot encode {}", other.kind_name()))),
///         }
///     }
///
///     fn decode(&self, bytes: &Bytes) -> Result<Value, Error> {
///         std::str::from_utf8(bytes)
///             .map(Value::from)
///             .map_err(|e| Error::decode(self.format(), e.to_string()))
///     }
/// }
/// ```
pub trait Codec: Send + Sync {
    /// The format this codec reads and writes.
    fn format(&self) -> Format;

    /// Encode a Value into bytes.
    fn encode(&self, value: &Value) -> Result<Bytes, Error>;

    /// Decode bytes into a Value.
    fn decode(&self, bytes: &Bytes) -> Result<Value, Error>;
}

impl<T: Codec + ?Sized> Codec for Box<T> {
    fn format(&self) -> Format {
        self.as_ref().format()
    }

    fn encode(&self, value: &Value) -> Result<Bytes, Error> {
        self.as_ref().encode(value)
    }

    fn decode(&self, bytes: &Bytes) -> Result<Value, Error> {
        self.as_ref().decode(bytes)
    }
}

impl<T: Codec + ?Sized> Codec for std::sync::Arc<T> {
    fn format(&self) -> Format {
        self.as_ref().format()
    }

    fn encode(&self, value: &Value) -> Result<Bytes, Error> {
        self.as_ref().encode(value)
    }

    fn decode(&self, bytes: &Bytes) -> Result<Value, Error> {
        self.as_ref().decode(bytes)
    }
}
