//! The Atom - a type-partitioned dynamic record.
//!
//! An Atom holds one record's fields split by primitive kind, keyed by the
//! declared field name. Nullable fields live in parallel `*_ptrs` partitions
//! where every declared field has an entry and `None` means unset.
//!
//! Conversion between an Atom and the `Value` map a record serializes to is
//! driven by the record's [`Spec`]; the serde step between `Value` and the
//! concrete type lives in the typed layer.

use std::collections::BTreeMap;

use crate::{Error, FieldKind, FieldSpec, Format, Spec, Value};

/// A record, viewed without compile-time knowledge of its type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Atom {
    type_name: String,
    pub ints: BTreeMap<String, i64>,
    /// Integer fields holding values above `i64::MAX`.
    pub uints: BTreeMap<String, u64>,
    pub floats: BTreeMap<String, f64>,
    pub strings: BTreeMap<String, String>,
    pub bools: BTreeMap<String, bool>,
    pub bytes: BTreeMap<String, Vec<u8>>,
    pub composites: BTreeMap<String, Value>,
    pub int_ptrs: BTreeMap<String, Option<i64>>,
    pub uint_ptrs: BTreeMap<String, Option<u64>>,
    pub float_ptrs: BTreeMap<String, Option<f64>>,
    pub string_ptrs: BTreeMap<String, Option<String>>,
    pub bool_ptrs: BTreeMap<String, Option<bool>>,
    pub bytes_ptrs: BTreeMap<String, Option<Vec<u8>>>,
    pub composite_ptrs: BTreeMap<String, Option<Value>>,
}

macro_rules! partition_accessors {
    ($( $get:ident, $set:ident, $get_ptr:ident, $set_ptr:ident, $field:ident, $ptrs:ident, $ty:ty; )*) => {
        $(
            pub fn $get(&self, name: &str) -> Option<&$ty> {
                self.$field.get(name)
            }

            pub fn $set(&mut self, name: impl Into<String>, value: impl Into<$ty>) {
                self.$field.insert(name.into(), value.into());
            }

            /// `None` if the field is not in the nullable partition,
            /// `Some(None)` if it is there but unset.
            pub fn $get_ptr(&self, name: &str) -> Option<Option<&$ty>> {
                self.$ptrs.get(name).map(Option::as_ref)
            }

            pub fn $set_ptr(&mut self, name: impl Into<String>, value: Option<$ty>) {
                self.$ptrs.insert(name.into(), value);
            }
        )*
    };
}

impl Atom {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// Name of the record type this Atom was produced for.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    partition_accessors! {
        int, set_int, int_ptr, set_int_ptr, ints, int_ptrs, i64;
        uint, set_uint, uint_ptr, set_uint_ptr, uints, uint_ptrs, u64;
        float, set_float, float_ptr, set_float_ptr, floats, float_ptrs, f64;
        string, set_string, string_ptr, set_string_ptr, strings, string_ptrs, String;
        bool, set_bool, bool_ptr, set_bool_ptr, bools, bool_ptrs, bool;
        byte_field, set_bytes, bytes_ptr, set_bytes_ptr, bytes, bytes_ptrs, Vec<u8>;
        composite, set_composite, composite_ptr, set_composite_ptr, composites, composite_ptrs, Value;
    }

    /// All field names across every partition, sorted.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .ints
            .keys()
            .chain(self.uints.keys())
            .chain(self.floats.keys())
            .chain(self.strings.keys())
            .chain(self.bools.keys())
            .chain(self.bytes.keys())
            .chain(self.composites.keys())
            .chain(self.int_ptrs.keys())
            .chain(self.uint_ptrs.keys())
            .chain(self.float_ptrs.keys())
            .chain(self.string_ptrs.keys())
            .chain(self.bool_ptrs.keys())
            .chain(self.bytes_ptrs.keys())
            .chain(self.composite_ptrs.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.field_names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.partition_of(name).is_some()
    }

    /// Name of the partition holding `name`, if any.
    pub fn partition_of(&self, name: &str) -> Option<&'static str> {
        if self.ints.contains_key(name) {
            Some("ints")
        } else if self.uints.contains_key(name) {
            Some("uints")
        } else if self.floats.contains_key(name) {
            Some("floats")
        } else if self.strings.contains_key(name) {
            Some("strings")
        } else if self.bools.contains_key(name) {
            Some("bools")
        } else if self.bytes.contains_key(name) {
            Some("bytes")
        } else if self.composites.contains_key(name) {
            Some("composites")
        } else if self.int_ptrs.contains_key(name) {
            Some("int_ptrs")
        } else if self.uint_ptrs.contains_key(name) {
            Some("uint_ptrs")
        } else if self.float_ptrs.contains_key(name) {
            Some("float_ptrs")
        } else if self.string_ptrs.contains_key(name) {
            Some("string_ptrs")
        } else if self.bool_ptrs.contains_key(name) {
            Some("bool_ptrs")
        } else if self.bytes_ptrs.contains_key(name) {
            Some("bytes_ptrs")
        } else if self.composite_ptrs.contains_key(name) {
            Some("composite_ptrs")
        } else {
            None
        }
    }

    /// Partition a record's serialized map by the kinds its Spec declares.
    ///
    /// Fails with `Encode` if the map carries a field the Spec does not
    /// declare, misses a non-nullable field, or holds a value of the wrong
    /// kind.
    pub fn from_value(spec: &Spec, value: Value) -> Result<Atom, Error> {
        let encode_err = |message: String| Error::encode(Format::VALUE, message);

        let mut map = match value {
            Value::Map(map) => map,
            other => {
                return Err(encode_err(format!(
                    "{} serialized to {}, expected a map",
                    spec.type_name(),
                    other.kind_name()
                )))
            }
        };

        if let Some(extra) = map.keys().find(|k| spec.field(k).is_none()) {
            return Err(encode_err(format!(
                "field '{}' is not declared by {}",
                extra,
                spec.type_name()
            )));
        }

        let mut atom = Atom::new(spec.type_name());
        for field in spec.fields() {
            let value = map.remove(&field.name);
            match (value, field.nullable) {
                (None, false) | (Some(Value::Null), false) => {
                    return Err(encode_err(format!(
                        "non-nullable field '{}' has no value",
                        field.name
                    )));
                }
                (None, true) | (Some(Value::Null), true) => atom.insert_unset(field),
                (Some(value), nullable) => atom.insert_value(field, value, nullable)?,
            }
        }
        Ok(atom)
    }

    /// Reassemble the serialized map of a record from this Atom.
    ///
    /// Fails with `Decode` if a field sits in the wrong partition, a
    /// non-nullable field is absent, or the Atom carries an undeclared field.
    pub fn to_value(&self, spec: &Spec) -> Result<Value, Error> {
        let decode_err = |message: String| Error::decode(Format::VALUE, message);

        if let Some(extra) = self
            .field_names()
            .into_iter()
            .find(|name| spec.field(name).is_none())
        {
            return Err(decode_err(format!(
                "field '{}' is not declared by {}",
                extra,
                spec.type_name()
            )));
        }

        let mut map = BTreeMap::new();
        for field in spec.fields() {
            let value = match self.lookup(field) {
                Some(value) => value,
                None if field.nullable && !self.contains(&field.name) => Value::Null,
                None => {
                    return Err(match self.partition_of(&field.name) {
                        Some(found) => decode_err(format!(
                            "field '{}' is in the {} partition, expected {}{}",
                            field.name,
                            found,
                            if field.nullable { "nullable " } else { "" },
                            field.kind
                        )),
                        None => decode_err(format!(
                            "non-nullable field '{}' is absent",
                            field.name
                        )),
                    });
                }
            };
            map.insert(field.name.clone(), value);
        }
        Ok(Value::Map(map))
    }

    fn insert_unset(&mut self, field: &FieldSpec) {
        let name = field.name.clone();
        match field.kind {
            FieldKind::Integer => self.set_int_ptr(name, None),
            FieldKind::Float => self.set_float_ptr(name, None),
            FieldKind::String => self.set_string_ptr(name, None),
            FieldKind::Bool => self.set_bool_ptr(name, None),
            FieldKind::Bytes => self.set_bytes_ptr(name, None),
            FieldKind::Composite => self.set_composite_ptr(name, None),
        }
    }

    fn insert_value(&mut self, field: &FieldSpec, value: Value, nullable: bool) -> Result<(), Error> {
        let mismatch = |value: &Value| {
            Error::encode(
                Format::VALUE,
                format!(
                    "field '{}' is declared {} but holds {}",
                    field.name,
                    field.kind,
                    value.kind_name()
                ),
            )
        };
        let name = field.name.clone();

        match field.kind {
            FieldKind::Integer => match value {
                Value::Integer(v) if nullable => self.set_int_ptr(name, Some(v)),
                Value::Integer(v) => self.set_int(name, v),
                Value::UInteger(v) if nullable => self.set_uint_ptr(name, Some(v)),
                Value::UInteger(v) => self.set_uint(name, v),
                other => return Err(mismatch(&other)),
            },
            FieldKind::Float => {
                let v = value.as_f64().ok_or_else(|| mismatch(&value))?;
                if nullable {
                    self.set_float_ptr(name, Some(v));
                } else {
                    self.set_float(name, v);
                }
            }
            FieldKind::String => {
                let v = match value {
                    Value::String(v) => v,
                    other => return Err(mismatch(&other)),
                };
                if nullable {
                    self.set_string_ptr(name, Some(v));
                } else {
                    self.set_string(name, v);
                }
            }
            FieldKind::Bool => {
                let v = value.as_bool().ok_or_else(|| mismatch(&value))?;
                if nullable {
                    self.set_bool_ptr(name, Some(v));
                } else {
                    self.set_bool(name, v);
                }
            }
            FieldKind::Bytes => {
                let v = bytes_of(&value).ok_or_else(|| mismatch(&value))?;
                if nullable {
                    self.set_bytes_ptr(name, Some(v));
                } else {
                    self.set_bytes(name, v);
                }
            }
            FieldKind::Composite => {
                if nullable {
                    self.set_composite_ptr(name, Some(value));
                } else {
                    self.set_composite(name, value);
                }
            }
        }
        Ok(())
    }

    /// The value of `field` from the partition its Spec declares.
    fn lookup(&self, field: &FieldSpec) -> Option<Value> {
        let name = field.name.as_str();
        if field.nullable {
            let value = match field.kind {
                FieldKind::Integer => match (self.int_ptrs.get(name), self.uint_ptrs.get(name)) {
                    (Some(Some(i)), _) => Some(Value::Integer(*i)),
                    (_, Some(Some(u))) => Some(Value::UInteger(*u)),
                    (None, None) => return None,
                    _ => None,
                },
                FieldKind::Float => self.float_ptrs.get(name)?.map(Value::Float),
                FieldKind::String => self.string_ptrs.get(name)?.clone().map(Value::String),
                FieldKind::Bool => self.bool_ptrs.get(name)?.map(Value::Bool),
                FieldKind::Bytes => self.bytes_ptrs.get(name)?.as_deref().map(bytes_value),
                FieldKind::Composite => self.composite_ptrs.get(name)?.clone(),
            };
            return Some(value.unwrap_or(Value::Null));
        }
        match field.kind {
            FieldKind::Integer => self
                .ints
                .get(name)
                .copied()
                .map(Value::Integer)
                .or_else(|| self.uints.get(name).copied().map(Value::UInteger)),
            FieldKind::Float => self.floats.get(name).copied().map(Value::Float),
            FieldKind::String => self.strings.get(name).cloned().map(Value::String),
            FieldKind::Bool => self.bools.get(name).copied().map(Value::Bool),
            FieldKind::Bytes => self.bytes.get(name).map(|b| bytes_value(b)),
            FieldKind::Composite => self.composites.get(name).cloned(),
        }
    }
}

/// Byte strings serialize through serde as sequences of small integers.
fn bytes_of(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Bytes(b) => Some(b.clone()),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_i64().and_then(|i| u8::try_from(i).ok()))
            .collect(),
        _ => None,
    }
}

fn bytes_value(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|b| Value::Integer(*b as i64)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_spec() -> Spec {
        Spec::named("Profile")
            .field(FieldSpec::string("id").primary_key())
            .field(FieldSpec::integer("age").column("age_years"))
            .field(FieldSpec::float("score"))
            .field(FieldSpec::bool("active"))
            .field(FieldSpec::bytes("avatar"))
            .field(FieldSpec::composite("tags"))
            .field(FieldSpec::string("nickname").nullable())
            .field(FieldSpec::integer("referrer").nullable())
            .build()
            .unwrap()
    }

    fn profile_value() -> Value {
        let mut map = BTreeMap::new();
        map.insert("id".to_string(), Value::from("p1"));
        map.insert("age".to_string(), Value::Integer(41));
        map.insert("score".to_string(), Value::Float(0.5));
        map.insert("active".to_string(), Value::Bool(true));
        map.insert(
            "avatar".to_string(),
            Value::Array(vec![Value::Integer(1), Value::Integer(255)]),
        );
        map.insert(
            "tags".to_string(),
            Value::Array(vec![Value::from("a"), Value::from("b")]),
        );
        map.insert("nickname".to_string(), Value::Null);
        map.insert("referrer".to_string(), Value::Integer(7));
        Value::Map(map)
    }

    #[test]
    fn partitions_by_kind_and_nullability() {
        let atom = Atom::from_value(&profile_spec(), profile_value()).unwrap();

        assert_eq!(atom.type_name(), "Profile");
        assert_eq!(atom.string("id"), Some(&"p1".to_string()));
        assert_eq!(atom.int("age"), Some(&41));
        assert_eq!(atom.float("score"), Some(&0.5));
        assert_eq!(atom.bool("active"), Some(&true));
        assert_eq!(atom.byte_field("avatar"), Some(&vec![1u8, 255]));
        assert!(atom.composite("tags").is_some());
        assert_eq!(atom.string_ptr("nickname"), Some(None));
        assert_eq!(atom.int_ptr("referrer"), Some(Some(&7)));
    }

    #[test]
    fn keys_are_declared_names_not_columns() {
        let atom = Atom::from_value(&profile_spec(), profile_value()).unwrap();
        assert!(atom.contains("age"));
        assert!(!atom.contains("age_years"));
    }

    #[test]
    fn membership_matches_spec() {
        let spec = profile_spec();
        let atom = Atom::from_value(&spec, profile_value()).unwrap();
        let mut declared: Vec<&str> = spec.fields().iter().map(|f| f.name.as_str()).collect();
        declared.sort_unstable();
        assert_eq!(atom.field_names(), declared);
    }

    #[test]
    fn value_round_trip() {
        let spec = profile_spec();
        let atom = Atom::from_value(&spec, profile_value()).unwrap();
        assert_eq!(atom.to_value(&spec).unwrap(), profile_value());
    }

    #[test]
    fn large_unsigned_integers_round_trip() {
        let spec = profile_spec();
        let mut value = profile_value();
        if let Value::Map(map) = &mut value {
            map.insert("age".to_string(), Value::from(u64::MAX));
            map.insert("referrer".to_string(), Value::from(u64::MAX - 1));
        }
        let atom = Atom::from_value(&spec, value.clone()).unwrap();
        assert_eq!(atom.uint("age"), Some(&u64::MAX));
        assert_eq!(atom.uint_ptr("referrer"), Some(Some(&(u64::MAX - 1))));
        assert_eq!(atom.partition_of("age"), Some("uints"));
        assert_eq!(atom.to_value(&spec).unwrap(), value);
    }

    #[test]
    fn undeclared_field_is_encode_error() {
        let mut value = profile_value();
        if let Value::Map(map) = &mut value {
            map.insert("extra".to_string(), Value::Integer(1));
        }
        let err = Atom::from_value(&profile_spec(), value).unwrap_err();
        assert!(matches!(err, Error::Encode { .. }));
    }

    #[test]
    fn wrong_kind_is_encode_error() {
        let mut value = profile_value();
        if let Value::Map(map) = &mut value {
            map.insert("age".to_string(), Value::from("forty"));
        }
        let err = Atom::from_value(&profile_spec(), value).unwrap_err();
        assert!(matches!(err, Error::Encode { .. }));
    }

    #[test]
    fn field_in_wrong_partition_is_decode_error() {
        let spec = profile_spec();
        let mut atom = Atom::from_value(&spec, profile_value()).unwrap();
        atom.ints.remove("age");
        atom.set_string("age", "41");

        let err = atom.to_value(&spec).unwrap_err();
        match err {
            Error::Decode { message, .. } => assert!(message.contains("strings partition")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn absent_non_nullable_is_decode_error() {
        let spec = profile_spec();
        let mut atom = Atom::from_value(&spec, profile_value()).unwrap();
        atom.floats.remove("score");
        assert!(matches!(
            atom.to_value(&spec),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn absent_nullable_decodes_as_null() {
        let spec = profile_spec();
        let mut atom = Atom::from_value(&spec, profile_value()).unwrap();
        atom.string_ptrs.remove("nickname");
        let value = atom.to_value(&spec).unwrap();
        assert_eq!(value.field("nickname"), Some(&Value::Null));
    }

    #[test]
    fn integers_widen_into_float_fields() {
        let mut value = profile_value();
        if let Value::Map(map) = &mut value {
            map.insert("score".to_string(), Value::Integer(3));
        }
        let atom = Atom::from_value(&profile_spec(), value).unwrap();
        assert_eq!(atom.float("score"), Some(&3.0));
    }
}
