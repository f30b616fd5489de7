//! Maintenance tools: expiry sweep and health check.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shardlink_core::{Error, LinkRepository};

use super::links::json_result;
use crate::state::AppState;

/// Output from the link_purge_expired tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PurgeExpiredOutput {
    /// Number of records deleted across all shards.
    pub deleted: u64,
}

/// Output from the health_check tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HealthOutput {
    pub healthy: bool,
    /// Shards in the deployment.
    pub shards: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub clicks_dropped: u64,
    pub click_batches_flushed: u64,
    pub click_flushes_failed: u64,
    /// Failure description when unhealthy.
    pub error: Option<String>,
}

/// Implementation of the link_purge_expired tool.
///
/// A sweep that fails partway still reports how many records it removed.
pub async fn purge_expired_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    match state.links.delete_expired().await {
        Ok(deleted) => {
            tracing::info!(deleted, "expired links purged");
            json_result(&PurgeExpiredOutput { deleted })
        }
        Err(e) => {
            if let Error::PartialFailure { shard, completed, .. } = &e {
                tracing::warn!(shard, completed, "expiry sweep aborted");
            }
            Err(e.into())
        }
    }
}

/// Implementation of the health_check tool.
pub async fn health_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let error = state.links.health_check().await.err().map(|e| e.to_string());
    let stats = state.links.stats();
    let output = HealthOutput {
        healthy: error.is_none(),
        shards: state.links.inner().router().partition_count(),
        cache_hits: stats.hits(),
        cache_misses: stats.misses(),
        clicks_dropped: state.clicks.dropped(),
        click_batches_flushed: state.clicks.flushed_batches(),
        click_flushes_failed: state.clicks.failed_flushes(),
        error,
    };
    json_result(&output)
}
