//! In-process remote cache.
//!
//! Used when no Redis URL is configured and as the cache fixture in tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::remote::RemoteCache;
use crate::Error;

/// Cached value with its deadline. `None` never expires.
struct CachedValue {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CachedValue {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory cache with per-key expiry.
///
/// Uses a HashMap behind a tokio RwLock. Expired entries are hidden on read
/// and reclaimed by [`MemoryCache::purge_expired`].
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CachedValue>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, cached| !cached.is_expired());
        before - entries.len()
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Cache("cache client is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        self.ensure_open()?;
        let entries = self.entries.read().await;
        Ok(entries.get(key).filter(|cached| !cached.is_expired()).map(|cached| cached.bytes.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), Error> {
        self.ensure_open()?;
        let mut entries = self.entries.write().await;
        // A TTL past what `Instant` can represent is kept until evicted.
        let expires_at = Instant::now().checked_add(ttl);
        entries.insert(key.to_string(), CachedValue { bytes: value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.ensure_open()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        self.ensure_open()?;
        let entries = self.entries.read().await;
        Ok(entries.get(key).is_some_and(|cached| !cached.is_expired()))
    }

    async fn ping(&self) -> Result<(), Error> {
        self.ensure_open()
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::Release);
        self.entries.write().await.clear();
        Ok(())
    }
}
