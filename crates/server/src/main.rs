//! shardlink server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use shardlink_core::AppConfig;
use tracing_subscriber::EnvFilter;

mod handler;
mod state;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(shards = config.shards.len(), "Starting shardlink server on stdio transport");

    let state = Arc::new(state::AppState::from_config(&config).await?);
    let handler = handler::ShortlinkServer::new(state.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    let quit = server.waiting().await;
    state.shutdown().await;
    quit?;

    Ok(())
}
