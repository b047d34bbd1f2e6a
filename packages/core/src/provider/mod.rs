//! Provider contracts.
//!
//! One trait per storage category. A provider is the only component that
//! talks to a backend; it maps the backend's failures onto [`crate::Error`]
//! and reports capability gaps with dedicated errors instead of degrading.
//!
//! Every method takes a [`crate::Context`]. Providers check it before I/O
//! and on every step of an iteration over a result set.

mod blob;
mod kv;
mod relational;
mod vector;

pub use blob::{BlobProvider, ObjectInfo};
pub use kv::{KeyValueProvider, Page};
pub use relational::{Exec, RelationalExecutor, TableDef};
pub use vector::{SearchResult, VectorInfo, VectorProvider, VectorRecord};
