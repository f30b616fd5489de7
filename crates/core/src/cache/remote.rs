//! Remote cache client contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::Error;

/// A flat byte-keyed cache with per-key TTL.
///
/// Implementations must be safe for concurrent use from many tasks.
#[async_trait]
pub trait RemoteCache: Send + Sync {
    /// Fetch a value, `None` on miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Store a value that the cache drops after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), Error>;

    /// Remove a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    async fn exists(&self, key: &str) -> Result<bool, Error>;

    async fn ping(&self) -> Result<(), Error>;

    async fn close(&self) -> Result<(), Error>;
}
