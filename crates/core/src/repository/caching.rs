//! Cache-aside reads and write-through writes over another repository.
//!
//! The wrapped repository is the source of truth. Cache failures are never
//! returned to the caller where the store can answer instead; they are
//! reported to the [`Observer`] and treated as misses.
//!
//! | operation | policy |
//! |-----------|--------|
//! | `create` | store, then populate cache |
//! | `get_by_code` | cache, else store then populate |
//! | `delete` | invalidate cache, then store |
//! | `increment_clicks` / `batch_increment_clicks` | store, then invalidate |
//! | `exists` | cached key answers `true`, else store |
//! | `get_by_id` / `delete_expired` | store only |
//! | `health_check` | cache, then store |

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::LinkRepository;
use crate::Error;
use crate::cache::{CacheLookup, RecordCache};
use crate::observe::{Observer, TracingObserver, sites};
use crate::record::{NewLink, ShortLinkRecord};

/// Counters for short-code reads.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn expired(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }
}

/// Caching decorator over a [`LinkRepository`].
pub struct CachingRepository<R> {
    inner: R,
    cache: RecordCache,
    observer: Arc<dyn Observer>,
    stats: CacheStats,
}

impl<R: LinkRepository> CachingRepository<R> {
    pub fn new(inner: R, cache: RecordCache) -> Self {
        Self::with_observer(inner, cache, Arc::new(TracingObserver))
    }

    pub fn with_observer(inner: R, cache: RecordCache, observer: Arc<dyn Observer>) -> Self {
        Self { inner, cache, observer, stats: CacheStats::default() }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    async fn populate(&self, record: &ShortLinkRecord) {
        if let Err(e) = self.cache.set(record).await {
            self.observer.report(sites::CACHE_POPULATE, &e);
        }
    }

    async fn invalidate(&self, code: &str) {
        if let Err(e) = self.cache.delete(code).await {
            self.observer.report(sites::CACHE_INVALIDATE, &e);
        }
    }
}

#[async_trait]
impl<R: LinkRepository> LinkRepository for CachingRepository<R> {
    async fn create(&self, link: NewLink) -> Result<ShortLinkRecord, Error> {
        let record = self.inner.create(link).await?;
        self.populate(&record).await;
        Ok(record)
    }

    async fn get_by_code(&self, code: &str) -> Result<ShortLinkRecord, Error> {
        match self.cache.get(code).await {
            Ok(CacheLookup::Hit(record)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("cache hit for {}", code);
                return Ok(record);
            }
            Ok(CacheLookup::Miss) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
            }
            Ok(CacheLookup::Expired) => {
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("cached record for {} has expired", code);
            }
            Err(e) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                self.observer.report(sites::CACHE_READ, &e);
            }
        }

        let record = self.inner.get_by_code(code).await?;
        self.populate(&record).await;
        Ok(record)
    }

    async fn get_by_id(&self, id: i64) -> Result<ShortLinkRecord, Error> {
        self.inner.get_by_id(id).await
    }

    async fn delete(&self, code: &str) -> Result<(), Error> {
        self.invalidate(code).await;
        self.inner.delete(code).await
    }

    async fn increment_clicks(&self, code: &str) -> Result<(), Error> {
        self.inner.increment_clicks(code).await?;
        self.invalidate(code).await;
        Ok(())
    }

    async fn batch_increment_clicks(&self, counts: &HashMap<String, u64>) -> Result<u64, Error> {
        // A partial failure still committed some shards, so invalidate either way.
        let result = self.inner.batch_increment_clicks(counts).await;
        for code in counts.keys() {
            self.invalidate(code).await;
        }
        result
    }

    async fn delete_expired(&self) -> Result<u64, Error> {
        self.inner.delete_expired().await
    }

    async fn exists(&self, code: &str) -> Result<bool, Error> {
        match self.cache.exists(code).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => self.observer.report(sites::CACHE_READ, &e),
        }
        self.inner.exists(code).await
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.cache.ping().await?;
        self.inner.health_check().await
    }
}
