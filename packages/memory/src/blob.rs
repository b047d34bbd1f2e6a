//! In-memory blob provider.

use std::collections::BTreeMap;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use stowage_core::provider::{BlobProvider, ObjectInfo};
use stowage_core::{Context, Error};
use xxhash_rust::xxh3::xxh3_64;

/// A blob provider over a sorted map.
///
/// Etags are the 64-bit xxh3 hash of the object bytes, so rewriting the same
/// content yields the same etag.
#[derive(Default)]
pub struct MemoryBlob {
    objects: RwLock<BTreeMap<String, (Bytes, ObjectInfo)>>,
}

impl MemoryBlob {
    pub fn new() -> Self {
        Self::default()
    }
}

fn etag(data: &[u8]) -> String {
    format!("\"{:016x}\"", xxh3_64(data))
}

#[async_trait]
impl BlobProvider for MemoryBlob {
    async fn get(&self, ctx: &Context, key: &str) -> Result<(Bytes, ObjectInfo), Error> {
        ctx.check()?;
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(key))
    }

    async fn put(
        &self,
        ctx: &Context,
        key: &str,
        data: Bytes,
        info: &ObjectInfo,
    ) -> Result<ObjectInfo, Error> {
        ctx.check()?;
        let stored = ObjectInfo {
            key: key.to_string(),
            content_type: info.content_type.clone(),
            size: data.len() as u64,
            etag: etag(&data),
            metadata: info.metadata.clone(),
            last_modified: Some(SystemTime::now()),
        };
        log::debug!("memory blob: put {} ({} bytes)", key, stored.size);
        self.objects
            .write()
            .insert(key.to_string(), (data, stored.clone()));
        Ok(stored)
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<(), Error> {
        ctx.check()?;
        self.objects
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(key))
    }

    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, Error> {
        ctx.check()?;
        Ok(self.objects.read().contains_key(key))
    }

    async fn list(&self, ctx: &Context, prefix: &str, limit: usize) -> Result<Vec<ObjectInfo>, Error> {
        ctx.check()?;
        let objects = self.objects.read();
        let mut out = Vec::new();
        for (key, (_, info)) in objects.range(prefix.to_string()..) {
            ctx.check()?;
            if !key.starts_with(prefix) || (limit > 0 && out.len() == limit) {
                break;
            }
            out.push(info.clone());
        }
        Ok(out)
    }
}
