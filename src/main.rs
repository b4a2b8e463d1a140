use anyhow::Context;
use mcp_vault::config::Config;
use mcp_vault::router::create_app_router;
use mcp_vault::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mcp_vault::logging::init();

    let config = Config::from_env().context("invalid MCP adapter configuration")?;

    // Initialize application state
    let state = Arc::new(AppState::new(config).context("failed to build vault-api client")?);
    let registry = Arc::clone(&state.registry);
    let port = state.config.port;

    info!(
        vault_url = %state.config.vault_url,
        json_response = state.config.json_response,
        include_raw_json = state.config.include_raw_json,
        "starting mcp-vault"
    );

    // Build application router with all routes and middleware
    let app = create_app_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("MCP server listening on http://{addr}/mcp");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!(sessions = registry.len(), "shutting down");
            registry.close_all();
        })
        .await
        .context("server error")?;

    Ok(())
}
