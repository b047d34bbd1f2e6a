use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use stowage_core::provider::{KeyValueProvider, Page};
use stowage_core::{Atom, Codec, Context, Error, Model, Spec};

use crate::check_key;
use crate::convert::{atomize, deatomize, from_value, to_value};

/// Atom view of a key-value store of `T`.
pub struct AtomicStore<T> {
    provider: Arc<dyn KeyValueProvider>,
    codec: Arc<dyn Codec>,
    spec: Arc<Spec>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for AtomicStore<T> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            codec: Arc::clone(&self.codec),
            spec: Arc::clone(&self.spec),
            _marker: PhantomData,
        }
    }
}

impl<T: Model> AtomicStore<T> {
    pub fn new(provider: Arc<dyn KeyValueProvider>, codec: Arc<dyn Codec>, spec: Arc<Spec>) -> Self {
        Self {
            provider,
            codec,
            spec,
            _marker: PhantomData,
        }
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    fn encode(&self, atom: &Atom) -> Result<Bytes, Error> {
        let record: T = deatomize(&self.spec, atom)?;
        self.codec.encode(&to_value(&record)?)
    }

    fn decode(&self, bytes: &Bytes) -> Result<Atom, Error> {
        let record: T = from_value(self.codec.decode(bytes)?)?;
        atomize(&self.spec, &record)
    }

    pub async fn get(&self, ctx: &Context, key: &str) -> Result<Atom, Error> {
        check_key(key)?;
        ctx.check()?;
        log::debug!("{}: atomic get {}", self.spec.type_name(), key);
        let bytes = self.provider.get(ctx, key).await?;
        self.decode(&bytes)
    }

    pub async fn set(&self, ctx: &Context, key: &str, atom: &Atom, ttl: Duration) -> Result<(), Error> {
        check_key(key)?;
        ctx.check()?;
        let bytes = self.encode(atom)?;
        log::debug!("{}: atomic set {}", self.spec.type_name(), key);
        self.provider.set(ctx, key, bytes, ttl).await
    }

    pub async fn delete(&self, ctx: &Context, key: &str) -> Result<(), Error> {
        check_key(key)?;
        ctx.check()?;
        self.provider.delete(ctx, key).await
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

    pub async fn list(&self, ctx: &Context, prefix: &str, limit: usize) -> Result<Vec<String>, Error> {
        ctx.check()?;
        self.provider.list(ctx, prefix, limit).await
    }

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

    /// Absent keys are left out. The first undecodable value fails the call.
    pub async fn get_batch(&self, ctx: &Context, keys: &[String]) -> Result<BTreeMap<String, Atom>, Error> {
        for key in keys {
            check_key(key)?;
        }
        ctx.check()?;
        let raw = self.provider.get_batch(ctx, keys).await?;
        raw.into_iter()
            .map(|(key, bytes)| Ok((key, self.decode(&bytes)?)))
            .collect()
    }

    /// Every Atom is converted before the provider is called.
    pub async fn set_batch(
        &self,
        ctx: &Context,
        items: &BTreeMap<String, Atom>,
        ttl: Duration,
    ) -> Result<(), Error> {
        ctx.check()?;
        let mut encoded = BTreeMap::new();
        for (key, atom) in items {
            check_key(key)?;
            encoded.insert(key.clone(), self.encode(atom)?);
        }
        self.provider.set_batch(ctx, encoded, ttl).await
    }

    pub async fn delete_batch(&self, ctx: &Context, keys: &[String]) -> Result<(), Error> {
        for key in keys {
            check_key(key)?;
        }
        ctx.check()?;
        self.provider.delete_batch(ctx, keys).await
    }
}

/// Object-safe Atom access to a key-value store.
#[async_trait]
pub trait ErasedStore: Send + Sync {
    fn spec(&self) -> &Spec;

    async fn get(&self, ctx: &Context, key: &str) -> Result<Atom, Error>;

    async fn set(&self, ctx: &Context, key: &str, atom: &Atom, ttl: Duration) -> Result<(), Error>;

    async fn delete(&self, ctx: &Context, key: &str) -> Result<(), Error>;

    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, Error>;

    async fn list(&self, ctx: &Context, prefix: &str, limit: usize) -> Result<Vec<String>, Error>;
}

#[async_trait]
impl<T: Model> ErasedStore for AtomicStore<T> {
    fn spec(&self) -> &Spec {
        AtomicStore::spec(self)
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<Atom, Error> {
        AtomicStore::get(self, ctx, key).await
    }

    async fn set(&self, ctx: &Context, key: &str, atom: &Atom, ttl: Duration) -> Result<(), Error> {
        AtomicStore::set(self, ctx, key, atom, ttl).await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<(), Error> {
        AtomicStore::delete(self, ctx, key).await
    }

    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, Error> {
        AtomicStore::exists(self, ctx, key).await
    }

    async fn list(&self, ctx: &Context, prefix: &str, limit: usize) -> Result<Vec<String>, Error> {
        AtomicStore::list(self, ctx, prefix, limit).await
    }
}
