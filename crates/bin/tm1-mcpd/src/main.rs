//! Daemon entry point for the TM1 MCP server.
//!
//! Loads configuration from the command line, environment and an optional
//! TOML file, connects the documentation index, and serves MCP over stdio or
//! streamable HTTP.

mod config;
mod docs;

use std::sync::Arc;

use tm1_core::{RestSessionFactory, Tm1ControlPlane};
use tm1_mcp::Tm1Mcp;
use tm1_mcp::server::{McpHttpServerConfig, serve_stdio, serve_streamable_http};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Tm1McpConfig;
use crate::docs::build_doc_index;

const LOG_ENV: &str = "TM1_MCP_LOG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config = Tm1McpConfig::from_args()?;
    info!(
        base_url = %config.connection.base_url,
        user = %config.connection.user,
        cam = config.connection.namespace.is_some(),
        "tm1-mcpd starting"
    );

    let docs = build_doc_index(&config.docs).await?;
    let control = Tm1ControlPlane::new(Arc::new(RestSessionFactory), config.connection);
    let service = Tm1Mcp::new(control, Arc::new(docs));

    if config.stdio {
        serve_stdio(service).await
    } else {
        let http = McpHttpServerConfig::new(config.http_addr)
            .with_stateful_mode(config.http_stateful)
            .with_sse_keep_alive(config.sse_keep_alive);
        serve_streamable_http(service, http).await
    }
}

/// Logs go to stderr; stdout carries the stdio transport.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
