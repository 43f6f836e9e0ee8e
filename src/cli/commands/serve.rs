//! `openmemory serve`: run the MCP HTTP/SSE server until Ctrl-C.

use anyhow::{anyhow, Result};
use std::sync::Arc;

use super::AppContext;
use crate::adapters::mcp::{Dispatcher, McpHttpConfig, McpHttpServer};
use crate::services::SessionRegistry;

pub async fn handle_serve(ctx: AppContext, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut http_config = McpHttpConfig::from(&ctx.config);
    if let Some(host) = host {
        http_config.host = host;
    }
    if let Some(port) = port {
        http_config.port = port;
    }

    let registry = Arc::new(SessionRegistry::with_queue_capacity(
        ctx.config.server.session_queue_capacity,
    ));
    let dispatcher = Dispatcher::new(Arc::clone(&ctx.service));
    let server = McpHttpServer::new(dispatcher, registry, http_config);

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
        }
    };

    server
        .serve_with_shutdown(shutdown)
        .await
        .map_err(|e| anyhow!("MCP server failed: {}", e))?;

    ctx.pool.close().await;
    Ok(())
}
