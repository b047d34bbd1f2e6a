//! Typed blob facade.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use stowage_core::provider::{BlobProvider, ObjectInfo};
use stowage_core::{Codec, Context, Error, Model, Spec};

use crate::atomic::AtomicBucket;
use crate::convert::{from_value, to_value};
use crate::{check_key, hooks};

/// A stored object: backend attributes plus the decoded record.
#[derive(Clone, Debug, PartialEq)]
pub struct Object<T> {
    pub info: ObjectInfo,
    pub data: T,
}

impl<T> Object<T> {
    /// A new object to put under `key`.
    pub fn new(key: impl Into<String>, data: T) -> Self {
        Self {
            info: ObjectInfo {
                key: key.into(),
                ..ObjectInfo::default()
            },
            data,
        }
    }

    pub fn key(&self) -> &str {
        &self.info.key
    }
}

/// A bucket of `T` objects.
pub struct Bucket<T> {
    provider: Arc<dyn BlobProvider>,
    codec: Arc<dyn Codec>,
    spec: Arc<Spec>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Bucket<T> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            codec: Arc::clone(&self.codec),
            spec: Arc::clone(&self.spec),
            _marker: PhantomData,
        }
    }
}

impl<T: Model> Bucket<T> {
    pub fn new(provider: Arc<dyn BlobProvider>, codec: Arc<dyn Codec>) -> Result<Self, Error> {
        Ok(Self::with_spec(provider, codec, Arc::new(T::spec()?)))
    }

    pub fn with_spec(provider: Arc<dyn BlobProvider>, codec: Arc<dyn Codec>, spec: Arc<Spec>) -> Self {
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

    pub fn atomic(&self) -> AtomicBucket<T> {
        AtomicBucket::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.codec),
            Arc::clone(&self.spec),
        )
    }

    pub async fn get(&self, ctx: &Context, key: &str) -> Result<Object<T>, Error> {
        check_key(key)?;
        ctx.check()?;
        log::debug!("{}: get object {}", self.spec.type_name(), key);

        let (bytes, info) = self.provider.get(ctx, key).await?;
        let mut data: T = from_value(self.codec.decode(&bytes)?)?;
        hooks::after_load(ctx, key, &mut data)?;
        Ok(Object { info, data })
    }

    /// Store `object` under `object.info.key`.
    ///
    /// An empty content type defaults to the codec's format. On success
    /// `object.info` is replaced by what the backend recorded.
    pub async fn put(&self, ctx: &Context, object: &mut Object<T>) -> Result<(), Error> {
        let key = object.info.key.clone();
        check_key(&key)?;
        ctx.check()?;
        hooks::before_save(ctx, &key, &mut object.data)?;

        let bytes: Bytes = self.codec.encode(&to_value(&object.data)?)?;
        if object.info.content_type.is_empty() {
            object.info.content_type = self.codec.format().to_string();
        }
        object.info.size = bytes.len() as u64;
        log::debug!(
            "{}: put object {} ({} bytes, {})",
            self.spec.type_name(),
            key,
            object.info.size,
            object.info.content_type
        );

        object.info = self.provider.put(ctx, &key, bytes, &object.info).await?;
        hooks::after_save(ctx, &key, &object.data)
    }

    pub async fn delete(&self, ctx: &Context, key: &str) -> Result<(), Error> {
        check_key(key)?;
        ctx.check()?;
        hooks::before_delete::<T>(ctx, key)?;
        log::debug!("{}: delete object {}", self.spec.type_name(), key);

        self.provider.delete(ctx, key).await?;
        hooks::after_delete::<T>(ctx, key)
    }

    pub async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, Error> {
        check_key(key)?;
        ctx.check()?;
        self.provider.exists(ctx, key).await
    }

    /// Object attributes under `prefix`. `limit == 0` returns all.
    pub async fn list(&self, ctx: &Context, prefix: &str, limit: usize) -> Result<Vec<ObjectInfo>, Error> {
        ctx.check()?;
        self.provider.list(ctx, prefix, limit).await
    }
}
