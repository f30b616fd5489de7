//! Domain-typed cache for short link records.
//!
//! Entries are JSON snapshots of a [`ShortLinkRecord`] stored under
//! `{prefix}{short_code}`. No entry may outlive the record it copies:
//!
//! - on write the TTL is capped at the time left until the record expires,
//!   and records that have already expired are not cached at all
//! - on read an entry whose embedded expiry has passed is reported as
//!   [`CacheLookup::Expired`] and deleted, so the remote TTL is only a backstop

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::remote::RemoteCache;
use crate::Error;
use crate::record::ShortLinkRecord;

/// Default key namespace.
pub const DEFAULT_PREFIX: &str = "url:";

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Record cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCacheOptions {
    pub prefix: String,
    pub default_ttl: Duration,
}

impl Default for RecordCacheOptions {
    fn default() -> Self {
        Self { prefix: DEFAULT_PREFIX.to_string(), default_ttl: DEFAULT_TTL }
    }
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(ShortLinkRecord),
    Miss,
    /// The entry was present but its record had expired; it has been purged.
    Expired,
}

/// What is stored under a key.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    record: ShortLinkRecord,
    ttl_ms: u64,
}

/// Short link cache over a [`RemoteCache`].
#[derive(Clone)]
pub struct RecordCache {
    client: Arc<dyn RemoteCache>,
    options: RecordCacheOptions,
}

impl RecordCache {
    pub fn new(client: Arc<dyn RemoteCache>, options: RecordCacheOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &RecordCacheOptions {
        &self.options
    }

    fn key(&self, code: &str) -> String {
        format!("{}{}", self.options.prefix, code)
    }

    /// Read a record by short code.
    ///
    /// # Errors
    ///
    /// Returns the client's error, or `Error::Serialization` for an entry that
    /// does not decode. Undecodable entries are deleted before returning.
    pub async fn get(&self, code: &str) -> Result<CacheLookup, Error> {
        let key = self.key(code);
        let Some(bytes) = self.client.get(&key).await? else {
            return Ok(CacheLookup::Miss);
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                if let Err(purge_err) = self.client.delete(&key).await {
                    tracing::debug!("failed to purge undecodable cache entry {}: {}", key, purge_err);
                }
                return Err(e.into());
            }
        };

        if entry.record.is_expired_at(Utc::now()) {
            if let Err(e) = self.client.delete(&key).await {
                tracing::debug!("failed to purge expired cache entry {}: {}", key, e);
            }
            return Ok(CacheLookup::Expired);
        }

        Ok(CacheLookup::Hit(entry.record))
    }

    /// Cache a record with the default TTL.
    pub async fn set(&self, record: &ShortLinkRecord) -> Result<(), Error> {
        self.set_with_ttl(record, self.options.default_ttl).await
    }

    /// Cache a record for at most `ttl`, and never past its own expiry.
    ///
    /// Choosing not to cache an already expired record is a success.
    pub async fn set_with_ttl(&self, record: &ShortLinkRecord, ttl: Duration) -> Result<(), Error> {
        let ttl = match record.remaining_ttl(Utc::now()) {
            Some(remaining) => ttl.min(remaining),
            None => ttl,
        };
        if ttl.is_zero() {
            tracing::debug!("not caching {}: expired or zero ttl", record.short_code);
            return Ok(());
        }

        let entry = CacheEntry { record: record.clone(), ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX) };
        let bytes = serde_json::to_vec(&entry)?;
        self.client.set(&self.key(&record.short_code), bytes, ttl).await
    }

    /// Remove a record. Removing an absent key succeeds.
    pub async fn delete(&self, code: &str) -> Result<(), Error> {
        self.client.delete(&self.key(code)).await
    }

    pub async fn exists(&self, code: &str) -> Result<bool, Error> {
        self.client.exists(&self.key(code)).await
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.client.ping().await
    }
}
