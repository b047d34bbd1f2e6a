use std::collections::BTreeMap;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{Context, Error};

/// Backend-observed attributes of a stored object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub content_type: String,
    pub size: u64,
    /// Revision tag assigned by the backend on every write.
    pub etag: String,
    /// User metadata.
    pub metadata: BTreeMap<String, String>,
    pub last_modified: Option<SystemTime>,
}

/// Blob backend contract.
#[async_trait]
pub trait BlobProvider: Send + Sync {
    /// Fetch an object. `NotFound` if the key is absent.
    async fn get(&self, ctx: &Context, key: &str) -> Result<(Bytes, ObjectInfo), Error>;

    /// Store an object and return what the backend recorded for it.
    ///
    /// `info.content_type` and `info.metadata` are taken from the caller;
    /// `size`, `etag` and `last_modified` are the backend's.
    async fn put(
        &self,
        ctx: &Context,
        key: &str,
        data: Bytes,
        info: &ObjectInfo,
    ) -> Result<ObjectInfo, Error>;

    /// Remove an object. `NotFound` if the key is absent.
    async fn delete(&self, ctx: &Context, key: &str) -> Result<(), Error>;

    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, Error>;

    /// Objects whose key starts with `prefix`, in key order. `limit == 0`
    /// returns all.
    async fn list(&self, ctx: &Context, prefix: &str, limit: usize)
        -> Result<Vec<ObjectInfo>, Error>;
}
