//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::state::AppState;
use crate::tools::{
    LinkCodeParams, LinkCreateParams, LinkIdParams,
    links::{create_impl, delete_impl, exists_impl, lookup_id_impl, resolve_impl},
    maintenance::{health_impl, purge_expired_impl},
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for shardlink.
#[derive(Clone)]
pub struct ShortlinkServer {
    tool_router: ToolRouter<Self>,
    state: Arc<AppState>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl ShortlinkServer {
    /// Create a new server handler over shared state.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { tool_router: Self::tool_router(), state }
    }

    #[tool(description = "Create a short link. Fails if the short code is already taken.")]
    async fn link_create(&self, params: Parameters<LinkCreateParams>) -> Result<CallToolResult, McpError> {
        create_impl(&self.state, params.0).await
    }

    /// Resolve a short code to its target URL.
    ///
    /// Reads through the record cache and counts one click.
    #[tool(description = "Resolve a short code to its target URL and count a click.")]
    async fn link_resolve(&self, params: Parameters<LinkCodeParams>) -> Result<CallToolResult, McpError> {
        resolve_impl(&self.state, params.0).await
    }

    #[tool(description = "Look up a short link by numeric id across all shards.")]
    async fn link_lookup_id(&self, params: Parameters<LinkIdParams>) -> Result<CallToolResult, McpError> {
        lookup_id_impl(&self.state, params.0).await
    }

    #[tool(description = "Delete a short link by short code.")]
    async fn link_delete(&self, params: Parameters<LinkCodeParams>) -> Result<CallToolResult, McpError> {
        delete_impl(&self.state, params.0).await
    }

    #[tool(description = "Check whether a live short link exists for a short code.")]
    async fn link_exists(&self, params: Parameters<LinkCodeParams>) -> Result<CallToolResult, McpError> {
        exists_impl(&self.state, params.0).await
    }

    #[tool(description = "Delete every expired short link on every shard. Returns the number removed.")]
    async fn link_purge_expired(&self) -> Result<CallToolResult, McpError> {
        purge_expired_impl(&self.state).await
    }

    #[tool(description = "Report shard and cache health with cache and click pipeline counters.")]
    async fn health_check(&self) -> Result<CallToolResult, McpError> {
        health_impl(&self.state).await
    }
}

impl ServerHandler for ShortlinkServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "shardlink".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
