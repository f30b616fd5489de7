//! Record caching over a remote key/value cache.
//!
//! This module provides:
//!
//! - The [`RemoteCache`] client contract
//! - An in-process client ([`MemoryCache`]) and a Redis client ([`RedisCache`])
//! - [`RecordCache`], which stores short link records with expiry reconciliation

pub mod memory;
pub mod record_cache;
pub mod redis;
pub mod remote;

pub use memory::MemoryCache;
pub use record_cache::{CacheLookup, RecordCache, RecordCacheOptions};
pub use redis::RedisCache;
pub use remote::RemoteCache;
