//! vault-api: serves the user-context document at `GET /v0/context`.

use anyhow::Context;
use mcp_vault::config::VaultConfig;
use mcp_vault::router::create_vault_router;
use mcp_vault::vault::VaultState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mcp_vault::logging::init();

    let config = VaultConfig::from_env().context("invalid vault-api configuration")?;
    let state = VaultState::load(config.context_file.as_deref())
        .await
        .context("failed to load context document")?;

    match &config.context_file {
        Some(path) => info!(path = %path.display(), "serving context document from file"),
        None => info!("serving built-in sample context document"),
    }

    let app = create_vault_router(Arc::new(state), config.log_http);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("vault-api listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutting down");
        })
        .await
        .context("server error")?;

    Ok(())
}
