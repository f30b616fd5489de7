//! Short link tools: create, resolve, look up, delete, exists.

use chrono::{DateTime, Utc};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shardlink_core::{Error, LinkRepository, NewLink, ShortLinkRecord};

use crate::state::AppState;

/// Parameters for the link_create tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LinkCreateParams {
    /// Short code to register (1-32 characters of `[A-Za-z0-9_-]`).
    pub short_code: String,

    /// Absolute http(s) URL the code redirects to.
    pub target_url: String,

    /// Expire the link this many seconds from now.
    pub expires_in_secs: Option<u64>,
}

/// Parameters for tools addressing a link by short code.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LinkCodeParams {
    /// The short code.
    pub short_code: String,
}

/// Parameters for the link_lookup_id tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LinkIdParams {
    /// Numeric record id.
    pub id: i64,
}

/// A short link as returned by the tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LinkOutput {
    pub id: i64,
    pub short_code: String,
    pub target_url: String,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 expiry time, if any.
    pub expires_at: Option<String>,
    pub click_count: i64,
}

impl From<ShortLinkRecord> for LinkOutput {
    fn from(record: ShortLinkRecord) -> Self {
        Self {
            id: record.id,
            short_code: record.short_code,
            target_url: record.target_url,
            created_at: record.created_at.to_rfc3339(),
            expires_at: record.expires_at.map(|at| at.to_rfc3339()),
            click_count: record.click_count,
        }
    }
}

/// Output from the link_resolve tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LinkResolveOutput {
    pub short_code: String,
    pub target_url: String,
}

/// Output from the link_exists tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LinkExistsOutput {
    pub short_code: String,
    pub exists: bool,
}

/// Output from the link_delete tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LinkDeleteOutput {
    pub deleted: String,
}

pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(Error::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Implementation of the link_create tool.
pub async fn create_impl(state: &AppState, params: LinkCreateParams) -> Result<CallToolResult, McpError> {
    let mut link = NewLink::new(params.short_code, params.target_url);
    if let Some(secs) = params.expires_in_secs {
        let secs = i64::try_from(secs).map_err(|_| Error::Validation("expires_in_secs is too large".into()))?;
        let at: DateTime<Utc> = Utc::now()
            .checked_add_signed(chrono::Duration::seconds(secs))
            .ok_or_else(|| Error::Validation("expires_in_secs is too large".into()))?;
        link = link.expires_at(at);
    }

    let record = state.links.create(link).await?;
    tracing::info!(short_code = %record.short_code, "link created");
    json_result(&LinkOutput::from(record))
}

/// Implementation of the link_resolve tool.
///
/// Counts a click for every successful resolution.
pub async fn resolve_impl(state: &AppState, params: LinkCodeParams) -> Result<CallToolResult, McpError> {
    let record = state.links.get_by_code(&params.short_code).await?;
    state.clicks.record_click(&record.short_code);
    json_result(&LinkResolveOutput { short_code: record.short_code, target_url: record.target_url })
}

/// Implementation of the link_lookup_id tool.
pub async fn lookup_id_impl(state: &AppState, params: LinkIdParams) -> Result<CallToolResult, McpError> {
    let record = state.links.get_by_id(params.id).await?;
    json_result(&LinkOutput::from(record))
}

/// Implementation of the link_delete tool.
pub async fn delete_impl(state: &AppState, params: LinkCodeParams) -> Result<CallToolResult, McpError> {
    state.links.delete(&params.short_code).await?;
    tracing::info!(short_code = %params.short_code, "link deleted");
    json_result(&LinkDeleteOutput { deleted: params.short_code })
}

/// Implementation of the link_exists tool.
pub async fn exists_impl(state: &AppState, params: LinkCodeParams) -> Result<CallToolResult, McpError> {
    let exists = state.links.exists(&params.short_code).await?;
    json_result(&LinkExistsOutput { short_code: params.short_code, exists })
}
