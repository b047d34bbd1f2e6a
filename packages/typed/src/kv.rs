//! Typed key-value facade.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use stowage_core::provider::{KeyValueProvider, Page};
use stowage_core::{Codec, Context, Error, Model, Spec};

use crate::atomic::AtomicStore;
use crate::convert::{from_value, to_value};
use crate::{check_key, hooks};

/// A key-value store of `T` records.
///
/// Values go `T -> Value -> codec bytes` on the way in and back on the way
/// out. Hooks run on `get`, `set` and `delete` (and their batch forms); the
/// listing operations are pure delegation.
pub struct Store<T> {
    provider: Arc<dyn KeyValueProvider>,
    codec: Arc<dyn Codec>,
    spec: Arc<Spec>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            codec: Arc::clone(&self.codec),
            spec: Arc::clone(&self.spec),
            _marker: PhantomData,
        }
    }
}

impl<T: Model> Store<T> {
    /// Derive `T`'s Spec and build the facade. Spec errors surface here.
    pub fn new(provider: Arc<dyn KeyValueProvider>, codec: Arc<dyn Codec>) -> Result<Self, Error> {
        Ok(Self::with_spec(provider, codec, Arc::new(T::spec()?)))
    }

    /// Build the facade from an already derived Spec, e.g. from a `Registry`.
    pub fn with_spec(
        provider: Arc<dyn KeyValueProvider>,
        codec: Arc<dyn Codec>,
        spec: Arc<Spec>,
    ) -> Self {
        Self {
            provider,
            codec,
            spec,
            _marker: PhantomData,
        }
    }

    pub fn spec(&self) -> &Arc<Spec> {
        &self.spec
    }

    /// The Atom view over the same provider and codec.
    pub fn atomic(&self) -> AtomicStore<T> {
        AtomicStore::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.codec),
            Arc::clone(&self.spec),
        )
    }

    fn encode(&self, record: &T) -> Result<Bytes, Error> {
        self.codec.encode(&to_value(record)?)
    }

    fn decode(&self, bytes: &Bytes) -> Result<T, Error> {
        from_value(self.codec.decode(bytes)?)
    }

    pub async fn get(&self, ctx: &Context, key: &str) -> Result<T, Error> {
        check_key(key)?;
        ctx.check()?;
        log::debug!("{}: get {}", self.spec.type_name(), key);

        let bytes = self.provider.get(ctx, key).await?;
        let mut record = self.decode(&bytes)?;
        hooks::after_load(ctx, key, &mut record)?;
        Ok(record)
    }

    /// Write a record. `ttl` of zero means no expiry.
    ///
    /// BeforeSave runs first and may modify the record; its failure aborts
    /// before the provider is called. An AfterSave failure is reported after
    /// the write has committed.
    pub async fn set(
        &self,
        ctx: &Context,
        key: &str,
        record: &mut T,
        ttl: Duration,
    ) -> Result<(), Error> {
        check_key(key)?;
        ctx.check()?;
        hooks::before_save(ctx, key, record)?;
        let bytes = self.encode(record)?;
        log::debug!(
            "{}: set {} ({} bytes, ttl {:?})",
            self.spec.type_name(),
            key,
            bytes.len(),
            ttl
        );

        self.provider.set(ctx, key, bytes, ttl).await?;
        hooks::after_save(ctx, key, record)
    }

    /// Remove a key. AfterDelete runs only when the provider deleted something.
    pub async fn delete(&self, ctx: &Context, key: &str) -> Result<(), Error> {
        check_key(key)?;
        ctx.check()?;
        hooks::before_delete::<T>(ctx, key)?;
        log::debug!("{}: delete {}", self.spec.type_name(), key);

        self.provider.delete(ctx, key).await?;
        hooks::after_delete::<T>(ctx, key)
    }

    pub async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, Error> {
        check_key(key)?;
        ctx.check()?;
        self.provider.exists(ctx, key).await
    }

    pub async fn count(&self, ctx: &Context, prefix: &str) -> Result<usize, Error> {
        ctx.check()?;
        self.provider.count(ctx, prefix).await
    }

    /// Keys under `prefix`. `limit == 0` returns all.
    pub async fn list(&self, ctx: &Context, prefix: &str, limit: usize) -> Result<Vec<String>, Error> {
        ctx.check()?;
        log::trace!("{}: list '{}' limit {}", self.spec.type_name(), prefix, limit);
        self.provider.list(ctx, prefix, limit).await
    }

    /// One page of keys under `prefix`, resuming after `cursor`.
    pub async fn scan(
        &self,
        ctx: &Context,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page, Error> {
        ctx.check()?;
        self.provider.scan(ctx, prefix, cursor, limit).await
    }

    /// Fetch many records. Absent keys are left out.
    pub async fn get_batch(&self, ctx: &Context, keys: &[String]) -> Result<BTreeMap<String, T>, Error> {
        for key in keys {
            check_key(key)?;
        }
        ctx.check()?;

        let raw = self.provider.get_batch(ctx, keys).await?;
        let mut out = BTreeMap::new();
        for (key, bytes) in raw {
            let mut record = self.decode(&bytes)?;
            hooks::after_load(ctx, &key, &mut record)?;
            out.insert(key, record);
        }
        Ok(out)
    }

    /// Write many records.
    ///
    /// Every BeforeSave runs before the provider is called, and any failure
    /// aborts the whole batch. AfterSave runs for every record; the first
    /// failure is returned.
    pub async fn set_batch(
        &self,
        ctx: &Context,
        items: &mut BTreeMap<String, T>,
        ttl: Duration,
    ) -> Result<(), Error> {
        ctx.check()?;
        let mut encoded = BTreeMap::new();
        for (key, record) in items.iter_mut() {
            check_key(key)?;
            hooks::before_save(ctx, key, record)?;
            encoded.insert(key.clone(), self.encode(record)?);
        }
        log::debug!("{}: set_batch {} items", self.spec.type_name(), encoded.len());

        self.provider.set_batch(ctx, encoded, ttl).await?;

        let mut first_err = None;
        for (key, record) in items.iter() {
            if let Err(e) = hooks::after_save(ctx, key, record) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Remove many keys; absent keys are skipped by the provider.
    ///
    /// The provider does not report which keys existed, so AfterDelete runs
    /// for every key once the batch succeeded.
    pub async fn delete_batch(&self, ctx: &Context, keys: &[String]) -> Result<(), Error> {
        ctx.check()?;
        for key in keys {
            check_key(key)?;
            hooks::before_delete::<T>(ctx, key)?;
        }

        self.provider.delete_batch(ctx, keys).await?;

        let mut first_err = None;
        for key in keys {
            if let Err(e) = hooks::after_delete::<T>(ctx, key) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
