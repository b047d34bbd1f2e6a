//! Stowage core: storage-agnostic contracts
//!
//! This layer defines what every backend and every typed facade agree on:
//! - `Value`: the codec-neutral data tree
//! - `Spec`: a per-type schema fact sheet, with exactly one primary key
//! - `Atom`: a record decomposed into per-kind partitions, keyed by field
//! - `Codec`: Value <-> bytes, tagged with a `Format`
//! - `Filter` and the relational statements, translated by providers
//! - the four provider traits under [`provider`]
//! - `Context` for cancellation and deadlines, and the shared `Error`
//!
//! Nothing here touches a backend. Providers live in their own crates and
//! depend on this one.
//!
//! # Example
//!
//! ```rust
//! use stowage_core::{Atom, FieldSpec, Spec, Value};
//!
//! let spec = Spec::named("Point")
//!     .field(FieldSpec::string("id").primary_key())
//!     .field(FieldSpec::float("x"))
//!     .build()
//!     .unwrap();
//!
//! let mut value = Value::map();
//! if let Value::Map(m) = &mut value {
//!     m.insert("id".into(), "p1".into());
//!     m.insert("x".into(), Value::Float(1.5));
//! }
//!
//! let atom = Atom::from_value(&spec, value).unwrap();
//! assert_eq!(atom.float("x"), Some(&1.5));
//! ```

pub use bytes::Bytes;

mod atom;
mod codec;
mod context;
mod distance;
mod error;
mod filter;
mod format;
mod model;
pub mod provider;
mod spec;
mod statement;
mod value;

pub use atom::Atom;
pub use codec::Codec;
pub use context::Context;
pub use distance::{validate_vector, Metric};
pub use error::{BoxError, Error};
pub use filter::{like_match, Filter, FilterVisitor, Operator, RangeOp};
pub use format::Format;
pub use model::{HookResult, Model, Role};
pub use spec::{FieldKind, FieldSpec, Registry, Spec, SpecBuilder};
pub use statement::{
    Aggregate, AggregateFn, BoundAggregate, BoundQuery, BoundUpdate, CompareOp, Condition,
    Direction, Order, Params, Predicate, Query, Row, Update,
};
pub use value::Value;
