//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Longest accepted record cache TTL (30 days).
pub const MAX_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err.to_string())
    }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no shards are configured, and
    /// `ConfigError::Invalid` if:
    /// - a shard path is empty or listed twice
    /// - `virtual_nodes`, `cache_ttl_secs`, `click_queue_capacity` or
    ///   `click_batch_size` is 0
    /// - `cache_ttl_secs` exceeds [`MAX_CACHE_TTL_SECS`]
    /// - `click_flush_interval_ms` is below 10ms
    /// - `click_flush_timeout_ms` is below 10ms or exceeds 60s
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards.is_empty() {
            return Err(ConfigError::Missing {
                field: "shards".into(),
                hint: "Configure at least one partition under [[shards]]".into(),
            });
        }
        for (i, shard) in self.shards.iter().enumerate() {
            if shard.path.is_empty() {
                return Err(ConfigError::Invalid { field: format!("shards[{i}].path"), reason: "must not be empty".into() });
            }
            if !shard.is_in_memory() && self.shards[..i].contains(shard) {
                return Err(ConfigError::Invalid {
                    field: format!("shards[{i}].path"),
                    reason: format!("{} is already used by another shard", shard.path),
                });
            }
        }

        if self.virtual_nodes == 0 {
            return Err(ConfigError::Invalid { field: "virtual_nodes".into(), reason: "must be greater than 0".into() });
        }

        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid { field: "cache_ttl_secs".into(), reason: "must be greater than 0".into() });
        }
        if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(ConfigError::Invalid {
                field: "cache_ttl_secs".into(),
                reason: format!("must not exceed {MAX_CACHE_TTL_SECS} seconds"),
            });
        }

        if self.click_queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "click_queue_capacity".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.click_batch_size == 0 {
            return Err(ConfigError::Invalid { field: "click_batch_size".into(), reason: "must be greater than 0".into() });
        }

        if self.click_flush_interval_ms < 10 {
            return Err(ConfigError::Invalid {
                field: "click_flush_interval_ms".into(),
                reason: "must be at least 10ms".into(),
            });
        }
        if self.click_flush_timeout_ms < 10 || self.click_flush_timeout_ms > 60_000 {
            return Err(ConfigError::Invalid {
                field: "click_flush_timeout_ms".into(),
                reason: "must be between 10ms and 60000ms".into(),
            });
        }

        if self.click_batch_size > self.click_queue_capacity {
            tracing::warn!(
                batch_size = self.click_batch_size,
                queue_capacity = self.click_queue_capacity,
                "click_batch_size exceeds click_queue_capacity; \
                 size-triggered flushes will rarely fire"
            );
        }

        Ok(())
    }
}
