//! Typed access to stowage providers.
//!
//! Two views over the same provider:
//! - the typed facades ([`Store`], [`Bucket`], [`Index`], [`Table`]) work in
//!   terms of a record type `T: Model` and run its lifecycle hooks;
//! - the atomic bridges ([`AtomicStore`], [`AtomicBucket`], [`AtomicIndex`],
//!   [`AtomicTable`]) work in terms of [`stowage_core::Atom`] and never run hooks.
//!
//! Both share one `Arc` of the provider and one codec, so whatever one view
//! writes the other can read. Every facade hands out its bridge through
//! `atomic()`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stowage_typed::{JsonCodec, Store};
//!
//! let users: Store<User> = Store::new(Arc::new(kv), Arc::new(JsonCodec))?;
//! users.set(&ctx, "users/1", &mut user, Duration::ZERO).await?;
//! let again = users.get(&ctx, "users/1").await?;
//! ```

mod atomic;
mod blob;
mod codec;
mod convert;
mod hooks;
mod kv;
mod relational;
mod vector;

pub use atomic::{
    AtomicBucket, AtomicIndex, AtomicObject, AtomicStore, AtomicTable, AtomicVector, ErasedBucket,
    ErasedIndex, ErasedStore, ErasedTable,
};
pub use blob::{Bucket, Object};
pub use codec::{JsonCodec, MsgpackCodec};
pub use convert::{atomize, deatomize, from_value, json_to_value, to_value, value_to_json};
pub use kv::Store;
pub use relational::Table;
pub use vector::{Index, Vector};

use stowage_core::{Error, Filter, Spec};

/// Reject keys no backend can address.
pub(crate) fn check_key(key: &str) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::invalid_key("key is empty"));
    }
    Ok(())
}

/// Structural filter checks plus "every field is declared by the Spec".
pub(crate) fn check_filter(spec: &Spec, filter: &Filter) -> Result<(), Error> {
    filter.validate()?;
    if let Some(field) = filter.fields().into_iter().find(|f| spec.field(f).is_none()) {
        return Err(Error::invalid_query(format!(
            "filter field '{}' is not declared by {}",
            field,
            spec.type_name()
        )));
    }
    Ok(())
}
