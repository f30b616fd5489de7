//! Core data access for shardlink.
//!
//! This crate provides:
//! - SQLite partition stores and a consistent-hash router over them
//! - Record caching over a remote cache (in-process or Redis)
//! - Caching and sharded repository decorators
//! - Batched click aggregation
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod clicks;
pub mod config;
pub mod error;
pub mod observe;
pub mod record;
pub mod repository;
pub mod router;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{MemoryCache, RecordCache, RedisCache, RemoteCache};
pub use clicks::{AggregatorOptions, ClickAggregator, ClickSink, RepositorySink};
pub use config::{AppConfig, PartitionConfig};
pub use error::{Error, ErrorKind};
pub use observe::{Observer, TracingObserver};
pub use record::{NewLink, ShortLinkRecord};
pub use repository::{CachingRepository, LinkRepository, ShardedRepository};
pub use router::{ShardRouter, hash_key};
pub use store::PartitionStore;
