use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use stowage_core::provider::{BlobProvider, ObjectInfo};
use stowage_core::{Atom, Codec, Context, Error, Model, Spec};

use crate::check_key;
use crate::convert::{atomize, deatomize, from_value, to_value};

/// A stored object with its record as an Atom.
#[derive(Clone, Debug, PartialEq)]
pub struct AtomicObject {
    pub info: ObjectInfo,
    pub data: Atom,
}

/// Atom view of a bucket of `T`.
pub struct AtomicBucket<T> {
    provider: Arc<dyn BlobProvider>,
    codec: Arc<dyn Codec>,
    spec: Arc<Spec>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for AtomicBucket<T> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            codec: Arc::clone(&self.codec),
            spec: Arc::clone(&self.spec),
            _marker: PhantomData,
        }
    }
}

impl<T: Model> AtomicBucket<T> {
    pub fn new(provider: Arc<dyn BlobProvider>, codec: Arc<dyn Codec>, spec: Arc<Spec>) -> Self {
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

    pub async fn get(&self, ctx: &Context, key: &str) -> Result<AtomicObject, Error> {
        check_key(key)?;
        ctx.check()?;
        let (bytes, info) = self.provider.get(ctx, key).await?;
        let record: T = from_value(self.codec.decode(&bytes)?)?;
        Ok(AtomicObject {
            info,
            data: atomize(&self.spec, &record)?,
        })
    }

    /// Store `object` under `object.info.key`; `object.info` is replaced by
    /// what the backend recorded.
    pub async fn put(&self, ctx: &Context, object: &mut AtomicObject) -> Result<(), Error> {
        let key = object.info.key.clone();
        check_key(&key)?;
        ctx.check()?;
        let record: T = deatomize(&self.spec, &object.data)?;
        let bytes = self.codec.encode(&to_value(&record)?)?;
        if object.info.content_type.is_empty() {
            object.info.content_type = self.codec.format().to_string();
        }
        object.info.size = bytes.len() as u64;
        object.info = self.provider.put(ctx, &key, bytes, &object.info).await?;
        Ok(())
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

    pub async fn list(&self, ctx: &Context, prefix: &str, limit: usize) -> Result<Vec<ObjectInfo>, Error> {
        ctx.check()?;
        self.provider.list(ctx, prefix, limit).await
    }
}

/// Object-safe Atom access to a bucket.
#[async_trait]
pub trait ErasedBucket: Send + Sync {
    fn spec(&self) -> &Spec;

    async fn get(&self, ctx: &Context, key: &str) -> Result<AtomicObject, Error>;

    async fn put(&self, ctx: &Context, object: &mut AtomicObject) -> Result<(), Error>;

    async fn delete(&self, ctx: &Context, key: &str) -> Result<(), Error>;

    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, Error>;

    async fn list(&self, ctx: &Context, prefix: &str, limit: usize) -> Result<Vec<ObjectInfo>, Error>;
}

#[async_trait]
impl<T: Model> ErasedBucket for AtomicBucket<T> {
    fn spec(&self) -> &Spec {
        AtomicBucket::spec(self)
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<AtomicObject, Error> {
        AtomicBucket::get(self, ctx, key).await
    }

    async fn put(&self, ctx: &Context, object: &mut AtomicObject) -> Result<(), Error> {
        AtomicBucket::put(self, ctx, object).await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<(), Error> {
        AtomicBucket::delete(self, ctx, key).await
    }

    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, Error> {
        AtomicBucket::exists(self, ctx, key).await
    }

    async fn list(&self, ctx: &Context, prefix: &str, limit: usize) -> Result<Vec<ObjectInfo>, Error> {
        AtomicBucket::list(self, ctx, prefix, limit).await
    }
}
