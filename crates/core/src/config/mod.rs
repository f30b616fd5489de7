//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SHARDLINK_*)
//! 2. TOML config file (if SHARDLINK_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::RecordCacheOptions;
use crate::clicks::AggregatorOptions;
use crate::router::{DEFAULT_VIRTUAL_NODES, RouterOptions};

mod validation;

pub use validation::ConfigError;

/// Path value that opens a partition in memory instead of on disk.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// One backing-store partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// SQLite database file, or `:memory:`.
    pub path: String,
}

impl PartitionConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_PATH)
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY_PATH
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHARDLINK_*)
/// 2. TOML config file (if SHARDLINK_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backing-store partitions, in shard index order.
    ///
    /// Order is part of the placement: reordering shards remaps keys.
    #[serde(default = "default_shards")]
    pub shards: Vec<PartitionConfig>,

    /// Ring points per shard.
    ///
    /// Set via SHARDLINK_VIRTUAL_NODES environment variable.
    #[serde(default = "default_virtual_nodes")]
    pub virtual_nodes: usize,

    /// Redis connection URL for the record cache.
    ///
    /// Set via SHARDLINK_REDIS_URL. When unset an in-process cache is used.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Key prefix for record cache entries.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Default record cache TTL in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Bounded click ingestion queue size.
    #[serde(default = "default_click_queue_capacity")]
    pub click_queue_capacity: usize,

    /// Pending increments that trigger an early flush.
    #[serde(default = "default_click_batch_size")]
    pub click_batch_size: usize,

    /// Click flush interval in milliseconds.
    #[serde(default = "default_click_flush_interval_ms")]
    pub click_flush_interval_ms: u64,

    /// Deadline for a single click flush in milliseconds.
    #[serde(default = "default_click_flush_timeout_ms")]
    pub click_flush_timeout_ms: u64,
}

fn default_shards() -> Vec<PartitionConfig> {
    vec![PartitionConfig::new("./shardlink-0.sqlite")]
}

fn default_virtual_nodes() -> usize {
    DEFAULT_VIRTUAL_NODES
}

fn default_cache_prefix() -> String {
    "url:".into()
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_click_queue_capacity() -> usize {
    10_000
}

fn default_click_batch_size() -> usize {
    1_000
}

fn default_click_flush_interval_ms() -> u64 {
    5_000
}

fn default_click_flush_timeout_ms() -> u64 {
    5_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            shards: default_shards(),
            virtual_nodes: default_virtual_nodes(),
            redis_url: None,
            cache_prefix: default_cache_prefix(),
            cache_ttl_secs: default_cache_ttl_secs(),
            click_queue_capacity: default_click_queue_capacity(),
            click_batch_size: default_click_batch_size(),
            click_flush_interval_ms: default_click_flush_interval_ms(),
            click_flush_timeout_ms: default_click_flush_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SHARDLINK_`
    /// 2. TOML file from `SHARDLINK_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SHARDLINK_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHARDLINK_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn router_options(&self) -> RouterOptions {
        RouterOptions { virtual_nodes: self.virtual_nodes }
    }

    pub fn record_cache_options(&self) -> RecordCacheOptions {
        RecordCacheOptions { prefix: self.cache_prefix.clone(), default_ttl: self.cache_ttl() }
    }

    pub fn aggregator_options(&self) -> AggregatorOptions {
        AggregatorOptions {
            queue_capacity: self.click_queue_capacity,
            batch_size: self.click_batch_size,
            flush_interval: Duration::from_millis(self.click_flush_interval_ms),
            flush_timeout: Duration::from_millis(self.click_flush_timeout_ms),
        }
    }
}
