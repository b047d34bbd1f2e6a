use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{Context, Error};

/// One page of a cursor listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub keys: Vec<String>,
    /// Opaque, provider-owned. `None` when the listing is exhausted.
    pub next_cursor: Option<String>,
}

/// Key-value backend contract.
///
/// A `ttl` of zero means "no expiry". Backends that cannot expire keys must
/// return `TtlNotSupported` for any positive `ttl`.
#[async_trait]
pub trait KeyValueProvider: Send + Sync {
    /// Fetch a value. `NotFound` if the key is absent.
    async fn get(&self, ctx: &Context, key: &str) -> Result<Bytes, Error>;

    async fn set(&self, ctx: &Context, key: &str, value: Bytes, ttl: Duration)
        -> Result<(), Error>;

    /// Remove a key. `NotFound` if the key is absent.
    async fn delete(&self, ctx: &Context, key: &str) -> Result<(), Error>;

    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, Error>;

    /// Keys starting with `prefix`, in key order. `limit == 0` returns all.
    async fn list(&self, ctx: &Context, prefix: &str, limit: usize)
        -> Result<Vec<String>, Error>;

    /// Fetch many keys. Absent keys are left out of the result.
    async fn get_batch(
        &self,
        ctx: &Context,
        keys: &[String],
    ) -> Result<BTreeMap<String, Bytes>, Error>;

    /// Write many keys. Not atomic unless the provider says otherwise.
    async fn set_batch(
        &self,
        ctx: &Context,
        items: BTreeMap<String, Bytes>,
        ttl: Duration,
    ) -> Result<(), Error>;

    /// Remove many keys; absent keys are skipped.
    async fn delete_batch(&self, ctx: &Context, keys: &[String]) -> Result<(), Error> {
        for key in keys {
            ctx.check()?;
            match self.delete(ctx, key).await {
                Ok(()) | Err(Error::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Forward-only cursor listing.
    ///
    /// The default implementation pages over [`KeyValueProvider::list`] and
    /// uses the last returned key as the cursor. Backends with native
    /// cursors should override it.
    async fn scan(
        &self,
        ctx: &Context,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page, Error> {
        let all = self.list(ctx, prefix, 0).await?;
        let mut remaining = Vec::new();
        for key in all {
            ctx.check()?;
            if cursor.map_or(true, |c| key.as_str() > c) {
                remaining.push(key);
            }
        }
        if limit == 0 || remaining.len() <= limit {
            return Ok(Page {
                keys: remaining,
                next_cursor: None,
            });
        }
        remaining.truncate(limit);
        let next_cursor = remaining.last().cloned();
        Ok(Page {
            keys: remaining,
            next_cursor,
        })
    }

    /// Number of keys starting with `prefix`.
    async fn count(&self, ctx: &Context, prefix: &str) -> Result<usize, Error> {
        Ok(self.list(ctx, prefix, 0).await?.len())
    }
}
