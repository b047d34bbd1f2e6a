//! Stowage: one typed CRUD surface over four kinds of storage.
//!
//! Application code describes a record type once (a serde type plus a
//! [`Model`] impl) and reads and writes it through a facade. The same facade
//! works against any provider of its category: key-value stores, blob
//! stores, relational databases or vector indexes.
//!
//! Contracts, errors, `Value`, `Atom`, `Spec` and filters are re-exported at
//! the top level.
//!
//! - [`typed`]: facades, atomic bridges and codecs
//! - [`memory`]: in-process providers for every category

pub use stowage_memory as memory;
pub use stowage_typed as typed;

pub use stowage_core::provider::{
    BlobProvider, Exec, KeyValueProvider, ObjectInfo, Page, RelationalExecutor, SearchResult,
    TableDef, VectorInfo, VectorProvider, VectorRecord,
};
pub use stowage_core::{
    Aggregate, Atom, Codec, Condition, Context, Direction, Error, FieldKind, FieldSpec, Filter,
    Format, HookResult, Metric, Model, Params, Query, Registry, Role, Spec, Update, Value,
};
pub use stowage_typed::{
    AtomicBucket, AtomicIndex, AtomicObject, AtomicStore, AtomicTable, AtomicVector, Bucket,
    ErasedBucket, ErasedIndex, ErasedStore, ErasedTable, Index, JsonCodec, MsgpackCodec, Object,
    Store, Table, Vector,
};
