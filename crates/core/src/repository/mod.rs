//! The link repository contract and its decorators.
//!
//! [`LinkRepository`] is implemented three ways:
//!
//! - [`crate::store::PartitionStore`] talks SQL to a single partition
//! - [`ShardedRepository`] routes each call to the partition owning the
//!   short code, scattering where the code is unknown
//! - [`CachingRepository`] layers cache-aside reads and write-through writes
//!   over any other repository
//!
//! The decorators own the repository they wrap and implement the same trait,
//! so `CachingRepository<ShardedRepository<PartitionStore>>` is the usual
//! production stack.

pub mod caching;
pub mod sharded;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::Error;
use crate::record::{NewLink, ShortLinkRecord};

pub use caching::{CacheStats, CachingRepository};
pub use sharded::ShardedRepository;

/// Data access for short links.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Persist a new link and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for malformed input and
    /// `Error::AlreadyExists` if the short code is taken.
    async fn create(&self, link: NewLink) -> Result<ShortLinkRecord, Error>;

    /// Look up an unexpired link by short code.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no live record exists.
    async fn get_by_code(&self, code: &str) -> Result<ShortLinkRecord, Error>;

    /// Look up an unexpired link by its numeric id.
    async fn get_by_id(&self, id: i64) -> Result<ShortLinkRecord, Error>;

    /// Remove a link.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the code did not exist.
    async fn delete(&self, code: &str) -> Result<(), Error>;

    /// Add one to a link's click count.
    async fn increment_clicks(&self, code: &str) -> Result<(), Error>;

    /// Apply aggregated click deltas. Unknown codes are skipped.
    ///
    /// Returns the number of records updated.
    async fn batch_increment_clicks(&self, counts: &HashMap<String, u64>) -> Result<u64, Error>;

    /// Remove every record whose expiry has passed, returning how many went.
    async fn delete_expired(&self) -> Result<u64, Error>;

    /// Whether a live record exists for the code.
    async fn exists(&self, code: &str) -> Result<bool, Error>;

    async fn health_check(&self) -> Result<(), Error>;
}
