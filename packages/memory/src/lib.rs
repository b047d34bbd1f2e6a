//! In-process providers.
//!
//! One provider per storage category, each honoring the full provider
//! contract, with switches that turn off optional capabilities so callers can
//! exercise the capability-gap errors:
//!
//! - [`MemoryKv`]: key-value with optional TTL support
//! - [`MemoryBlob`]: blob objects with content-hash etags
//! - [`MemoryIndex`]: brute-force vector index with a configurable metric and
//!   a configurable set of filter operators
//! - [`MemoryDb`]: tables with primary key, unique and not-null constraints
//!   and optimistic transactions
//!
//! State lives behind `parking_lot` locks; no lock is held across an await.

mod blob;
mod kv;
mod relational;
mod vector;

pub use blob::MemoryBlob;
pub use kv::{MemoryKv, MemoryKvConfig};
pub use relational::{MemoryDb, MemoryTx};
pub use vector::{FilterSupport, MemoryIndex, MemoryIndexConfig};
