//! Atomic bridges: the same providers, addressed with Atoms.
//!
//! A bridge converts between an Atom and the record type `T` it was built
//! for, then reuses the typed encoding path. Going through `T` means a stored
//! value that does not decode into `T` fails with `Decode`, and an Atom that
//! does not fit `T`'s Spec fails before anything is written. Bridges never
//! run lifecycle hooks.
//!
//! The `Erased*` traits are object safe, so callers can hold
//! `Arc<dyn ErasedStore>` and friends without naming `T`.

mod blob;
mod kv;
mod relational;
mod vector;

pub use blob::{AtomicBucket, AtomicObject, ErasedBucket};
pub use kv::{AtomicStore, ErasedStore};
pub use relational::{AtomicTable, ErasedTable};
pub use vector::{AtomicIndex, AtomicVector, ErasedIndex};
