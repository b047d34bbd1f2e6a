//! Per-type schema fact sheets.
//!
//! A [`Spec`] is the contract the typed facades and the atomic bridges share:
//! both address fields through it and both agree on which field is the
//! primary key. Record types declare their Spec through [`crate::Model::spec`];
//! a [`Registry`] derives each one once at startup and hands out shared,
//! read-only copies.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{Error, Model};

/// The primitive partition a field belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Integer,
    Float,
    String,
    Bool,
    Bytes,
    /// Nested arrays or maps, carried as a `Value`.
    Composite,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::Bool => "bool",
            FieldKind::Bytes => "bytes",
            FieldKind::Composite => "composite",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One declared field of a record type.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    /// Declared field name. Atoms and filters address fields by this name.
    pub name: String,
    /// Storage column. Relational rows address fields by this name.
    pub column: String,
    pub kind: FieldKind,
    /// The field is optional and lands in the nullable partition of an Atom.
    pub nullable: bool,
    pub primary_key: bool,
    pub not_null: bool,
    pub unique: bool,
}

impl FieldSpec {
    /// A non-nullable field whose column defaults to its name.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            kind,
            nullable: false,
            primary_key: false,
            not_null: false,
            unique: false,
        }
    }

    /// Shorthand for `new(name, FieldKind::Integer)`; likewise for the other kinds.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub fn bytes(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bytes)
    }

    pub fn composite(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Composite)
    }

    /// Store the field under a different column name.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Allow absent values. Nullable fields read back as `None`.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark the record key. Exactly one field per Spec may carry it.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Reject null on write even if the field is nullable in the record type.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Relational stores reject a second row holding the same value.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Immutable schema of a record type.
#[derive(Clone, Debug, PartialEq)]
pub struct Spec {
    type_name: String,
    package: String,
    fields: Vec<FieldSpec>,
    primary_key: usize,
}

impl Spec {
    /// Start a Spec for `T`, named after its Rust type path.
    pub fn builder<T: ?Sized + 'static>() -> SpecBuilder {
        let full = std::any::type_name::<T>();
        let base = full.split('<').next().unwrap_or(full);
        let (package, type_name) = match base.rsplit_once("::") {
            Some((package, name)) => (package.to_string(), name.to_string()),
            None => (String::new(), base.to_string()),
        };
        SpecBuilder {
            type_name,
            package,
            fields: Vec::new(),
        }
    }

    /// Start a Spec with an explicit name.
    pub fn named(type_name: impl Into<String>) -> SpecBuilder {
        SpecBuilder {
            type_name: type_name.into(),
            package: String::new(),
            fields: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn qualified_name(&self) -> String {
        if self.package.is_empty() {
            self.type_name.clone()
        } else {
            format!("{}::{}", self.package, self.type_name)
        }
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_column(&self, column: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn primary_key(&self) -> &FieldSpec {
        &self.fields[self.primary_key]
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.column.as_str())
    }
}

/// Collects field declarations and validates them into a [`Spec`].
#[derive(Clone, Debug)]
pub struct SpecBuilder {
    type_name: String,
    package: String,
    fields: Vec<FieldSpec>,
}

impl SpecBuilder {
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Validate the declarations.
    ///
    /// Exactly one field must be the primary key, and it may not be nullable.
    /// Field names and columns must be unique and non-empty.
    pub fn build(self) -> Result<Spec, Error> {
        let type_name = self.type_name.clone();
        let invalid = |message: String| Error::InvalidSpec {
            type_name: type_name.clone(),
            message,
        };

        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() || field.column.is_empty() {
                return Err(invalid("field with empty name or column".to_string()));
            }
            if !names.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
            if !columns.insert(field.column.as_str()) {
                return Err(invalid(format!("duplicate column '{}'", field.column)));
            }
        }

        let keys: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .map(|(i, _)| i)
            .collect();

        let primary_key = match keys.as_slice() {
            [] => {
                return Err(Error::NoPrimaryKey {
                    type_name: type_name.clone(),
                })
            }
            [one] => *one,
            many => {
                return Err(Error::MultiplePrimaryKeys {
                    fields: many.iter().map(|i| self.fields[*i].name.clone()).collect(),
                    type_name: type_name.clone(),
                })
            }
        };

        if self.fields[primary_key].nullable {
            return Err(invalid(format!(
                "primary key '{}' cannot be nullable",
                self.fields[primary_key].name
            )));
        }

        Ok(Spec {
            type_name: self.type_name,
            package: self.package,
            fields: self.fields,
            primary_key,
        })
    }
}

/// Explicit per-type Spec registration.
///
/// Build one at startup, register every record type, then construct facades
/// from the cached Specs. Registering a type twice returns the cached Spec.
#[derive(Debug, Default)]
pub struct Registry {
    specs: HashMap<TypeId, Arc<Spec>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and cache `T`'s Spec. Fails if the declared schema is invalid.
    pub fn register<T: Model>(&mut self) -> Result<Arc<Spec>, Error> {
        if let Some(spec) = self.specs.get(&TypeId::of::<T>()) {
            return Ok(spec.clone());
        }
        let spec = Arc::new(T::spec()?);
        log::debug!("registered spec {}", spec.qualified_name());
        self.specs.insert(TypeId::of::<T>(), spec.clone());
        Ok(spec)
    }

    /// The cached Spec for `T`, if it was registered.
    pub fn spec<T: 'static>(&self) -> Option<Arc<Spec>> {
        self.specs.get(&TypeId::of::<T>()).cloned()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Account {
        id: i64,
        email: String,
    }

    impl Model for Account {
        fn spec() -> Result<Spec, Error> {
            Spec::builder::<Self>()
                .field(FieldSpec::integer("id").primary_key())
                .field(FieldSpec::string("email").column("email_address").unique())
                .build()
        }
    }

    #[test]
    fn builder_names_from_type_path() {
        let spec = Account::spec().unwrap();
        assert_eq!(spec.type_name(), "Account");
        assert!(spec.package().ends_with("spec::tests"));
        assert!(spec.qualified_name().ends_with("::Account"));
    }

    #[test]
    fn column_aliases_do_not_rename_fields() {
        let spec = Account::spec().unwrap();
        assert!(spec.field("email").is_some());
        assert!(spec.field("email_address").is_none());
        assert_eq!(spec.field_by_column("email_address").unwrap().name, "email");
        assert_eq!(spec.primary_key().name, "id");
    }

    #[test]
    fn no_primary_key_fails() {
        let err = Spec::named("Thing")
            .field(FieldSpec::string("name"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::NoPrimaryKey { .. }));
    }

    #[test]
    fn multiple_primary_keys_fail() {
        let err = Spec::named("Thing")
            .field(FieldSpec::string("a").primary_key())
            .field(FieldSpec::string("b").primary_key())
            .build()
            .unwrap_err();
        match err {
            Error::MultiplePrimaryKeys { fields, .. } => assert_eq!(fields, vec!["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_column_fails() {
        let err = Spec::named("Thing")
            .field(FieldSpec::string("a").primary_key())
            .field(FieldSpec::string("b").column("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSpec { .. }));
    }

    #[test]
    fn nullable_primary_key_fails() {
        let err = Spec::named("Thing")
            .field(FieldSpec::string("id").primary_key().nullable())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSpec { .. }));
    }

    #[test]
    fn registry_caches_per_type() {
        let mut registry = Registry::new();
        assert!(registry.spec::<Account>().is_none());

        let first = registry.register::<Account>().unwrap();
        let second = registry.register::<Account>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.spec::<Account>().unwrap(), &first));
    }
}
