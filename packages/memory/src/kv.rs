//! In-memory key-value provider.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use stowage_core::provider::{KeyValueProvider, Page};
use stowage_core::{Context, Error};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryKvConfig {
    /// Whether keys may be written with an expiry.
    pub ttl: bool,
}

impl Default for MemoryKvConfig {
    fn default() -> Self {
        Self { ttl: true }
    }
}

struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// A key-value provider over a sorted map.
///
/// Expired keys behave as absent and are purged on the next write.
/// `set_batch` and `delete_batch` are applied under one lock, so other
/// callers see all of a batch or none of it.
pub struct MemoryKv {
    config: MemoryKvConfig,
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::with_config(MemoryKvConfig::default())
    }

    pub fn with_config(config: MemoryKvConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &MemoryKvConfig {
        &self.config
    }

    fn expiry(&self, ttl: Duration) -> Result<Option<Instant>, Error> {
        if ttl.is_zero() {
            return Ok(None);
        }
        if !self.config.ttl {
            log::debug!("memory kv: rejecting ttl {:?}, expiry disabled", ttl);
            return Err(Error::TtlNotSupported);
        }
        // A TTL too large to represent never expires.
        Ok(Instant::now().checked_add(ttl))
    }

    fn purge(entries: &mut BTreeMap<String, Entry>, now: Instant) {
        entries.retain(|_, e| e.live(now));
    }

    /// Live keys under `prefix`, starting after `after`.
    fn keys(
        &self,
        ctx: &Context,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, Error> {
        let now = Instant::now();
        let entries = self.entries.read();
        let start = match after {
            Some(cursor) if cursor >= prefix => Bound::Excluded(cursor.to_string()),
            _ => Bound::Included(prefix.to_string()),
        };
        let mut out = Vec::new();
        for (key, entry) in entries.range((start, Bound::Unbounded)) {
            ctx.check()?;
            if !key.starts_with(prefix) {
                break;
            }
            if !entry.live(now) {
                continue;
            }
            if limit > 0 && out.len() == limit {
                break;
            }
            out.push(key.clone());
        }
        Ok(out)
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueProvider for MemoryKv {
    async fn get(&self, ctx: &Context, key: &str) -> Result<Bytes, Error> {
        ctx.check()?;
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if entry.live(Instant::now()) => Ok(entry.value.clone()),
            _ => Err(Error::not_found(key)),
        }
    }

    async fn set(&self, ctx: &Context, key: &str, value: Bytes, ttl: Duration) -> Result<(), Error> {
        ctx.check()?;
        let expires_at = self.expiry(ttl)?;
        let mut entries = self.entries.write();
        Self::purge(&mut entries, Instant::now());
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<(), Error> {
        ctx.check()?;
        let mut entries = self.entries.write();
        Self::purge(&mut entries, Instant::now());
        entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(key))
    }

    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, Error> {
        ctx.check()?;
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .is_some_and(|e| e.live(Instant::now())))
    }

    async fn list(&self, ctx: &Context, prefix: &str, limit: usize) -> Result<Vec<String>, Error> {
        ctx.check()?;
        self.keys(ctx, prefix, None, limit)
    }

    async fn get_batch(&self, ctx: &Context, keys: &[String]) -> Result<BTreeMap<String, Bytes>, Error> {
        ctx.check()?;
        let now = Instant::now();
        let entries = self.entries.read();
        let mut out = BTreeMap::new();
        for key in keys {
            ctx.check()?;
            if let Some(entry) = entries.get(key).filter(|e| e.live(now)) {
                out.insert(key.clone(), entry.value.clone());
            }
        }
        Ok(out)
    }

    async fn set_batch(
        &self,
        ctx: &Context,
        items: BTreeMap<String, Bytes>,
        ttl: Duration,
    ) -> Result<(), Error> {
        ctx.check()?;
        let expires_at = self.expiry(ttl)?;
        let mut entries = self.entries.write();
        Self::purge(&mut entries, Instant::now());
        for (key, value) in items {
            entries.insert(key, Entry { value, expires_at });
        }
        Ok(())
    }

    async fn delete_batch(&self, ctx: &Context, keys: &[String]) -> Result<(), Error> {
        ctx.check()?;
        let mut entries = self.entries.write();
        for key in keys {
            entries.remove(key);
        }
        Self::purge(&mut entries, Instant::now());
        Ok(())
    }

    async fn scan(
        &self,
        ctx: &Context,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page, Error> {
        ctx.check()?;
        // One extra key tells us whether another page exists.
        let fetch = if limit == 0 { 0 } else { limit + 1 };
        let mut keys = self.keys(ctx, prefix, cursor, fetch)?;
        let next_cursor = if limit > 0 && keys.len() > limit {
            keys.truncate(limit);
            keys.last().cloned()
        } else {
            None
        };
        Ok(Page { keys, next_cursor })
    }

    async fn count(&self, ctx: &Context, prefix: &str) -> Result<usize, Error> {
        ctx.check()?;
        Ok(self.keys(ctx, prefix, None, 0)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv_with(keys: &[&str]) -> MemoryKv {
        let kv = MemoryKv::new();
        {
            let mut entries = kv.entries.write();
            for key in keys {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Bytes::from_static(b"1"),
                        expires_at: None,
                    },
                );
            }
        }
        kv
    }

    #[test]
    fn keys_respect_prefix_and_limit() {
        let kv = kv_with(&["a/1", "a/2", "a/3", "b/1"]);
        let ctx = Context::background();
        assert_eq!(kv.keys(&ctx, "a/", None, 0).unwrap(), vec!["a/1", "a/2", "a/3"]);
        assert_eq!(kv.keys(&ctx, "a/", None, 2).unwrap(), vec!["a/1", "a/2"]);
        assert_eq!(kv.keys(&ctx, "a/", Some("a/2"), 0).unwrap(), vec!["a/3"]);
        assert!(kv.keys(&ctx, "zzz", None, 0).unwrap().is_empty());
    }

    #[test]
    fn cursor_before_prefix_starts_at_prefix() {
        let kv = kv_with(&["a/1", "b/1", "b/2"]);
        let ctx = Context::background();
        assert_eq!(kv.keys(&ctx, "b/", Some("a/1"), 0).unwrap(), vec!["b/1", "b/2"]);
    }

    #[test]
    fn expired_entries_are_not_live() {
        let now = Instant::now();
        let entry = Entry {
            value: Bytes::new(),
            expires_at: Some(now),
        };
        assert!(!entry.live(now));
        assert!(entry.live(now - Duration::from_millis(1)));
    }

    #[test]
    fn zero_ttl_never_needs_support() {
        let kv = MemoryKv::with_config(MemoryKvConfig { ttl: false });
        assert_eq!(kv.expiry(Duration::ZERO).unwrap(), None);
        assert!(matches!(
            kv.expiry(Duration::from_secs(1)),
            Err(Error::TtlNotSupported)
        ));
    }

    #[test]
    fn unrepresentable_ttl_never_expires() {
        let kv = MemoryKv::new();
        assert_eq!(kv.expiry(Duration::MAX).unwrap(), None);
    }

    #[test]
    fn config_from_json() {
        let config: MemoryKvConfig = serde_json::from_str(r#"{"ttl": false}"#).unwrap();
        assert!(!config.ttl);
        let config: MemoryKvConfig = serde_json::from_str("{}").unwrap();
        assert!(config.ttl);
    }
}
