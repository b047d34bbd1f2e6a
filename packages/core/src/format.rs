//! Format hints for persisted bytes.

use std::borrow::Cow;
use std::fmt;

/// The wire format of encoded bytes, as a MIME type.
///
/// Codecs report the format they produce; blob buckets use it as the default
/// content type, and decode/encode errors carry it for diagnosis.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Format(pub Cow<'static, str>);

impl Format {
    /// JSON format (`application/json`)
    pub const JSON: Format = Format(Cow::Borrowed("application/json"));

    /// MessagePack (`application/msgpack`)
    pub const MSGPACK: Format = Format(Cow::Borrowed("application/msgpack"));

    /// Opaque binary data (`application/octet-stream`)
    pub const OCTET_STREAM: Format = Format(Cow::Borrowed("application/octet-stream"));

    /// An in-memory `Value` or `Atom` that was never serialized.
    ///
    /// Used in errors raised while converting between records and values.
    pub const VALUE: Format = Format(Cow::Borrowed("application/x-stowage-value"));

    pub const fn from_static(s: &'static str) -> Self {
        Format(Cow::Borrowed(s))
    }

    pub fn new(s: impl Into<String>) -> Self {
        Format(Cow::Owned(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_json(&self) -> bool {
        self == &Self::JSON
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&'static str> for Format {
    fn from(s: &'static str) -> Self {
        Format(Cow::Borrowed(s))
    }
}

impl From<String> for Format {
    fn from(s: String) -> Self {
        Format(Cow::Owned(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_display_as_mime() {
        assert_eq!(Format::JSON.to_string(), "application/json");
        assert_eq!(Format::MSGPACK.as_str(), "application/msgpack");
    }

    #[test]
    fn owned_and_borrowed_compare_equal() {
        assert_eq!(Format::new("application/json"), Format::JSON);
        assert!(Format::from("application/json".to_string()).is_json());
    }
}
