//! Routing module for the MCP adapter and the vault-api provider

use crate::mcp::models::SESSION_ID_HEADER;
use crate::state::SharedState;
use crate::vault::SharedVaultState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderName,
    middleware::Next,
    response::Response,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Creates and configures the adapter router with all routes and middleware
pub fn create_app_router(state: SharedState) -> Router {
    let log_layer = axum::middleware::from_fn_with_state(state.clone(), log_adapter_requests);

    Router::new()
        .merge(crate::mcp::routes())
        .layer(log_layer)
        .layer(cors_layer())
        .with_state(state)
}

/// Creates the vault-api router
pub fn create_vault_router(state: SharedVaultState, log_http: bool) -> Router {
    let log_layer = axum::middleware::from_fn(move |req: Request<Body>, next: Next| async move {
        if log_http {
            log_request(req, next).await
        } else {
            next.run(req).await
        }
    });

    Router::new()
        .merge(crate::vault::routes())
        .layer(log_layer)
        .layer(cors_layer())
        .with_state(state)
}

async fn log_adapter_requests(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if state.config.log_http {
        log_request(req, next).await
    } else {
        next.run(req).await
    }
}

// Middleware: Log requests
async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let session_id = req
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    info!(target: "mcp_vault::http", %method, %uri, ?session_id, "request");
    let res = next.run(req).await;
    info!(target: "mcp_vault::http", %method, %uri, status = res.status().as_u16(), "response");
    res
}

// Middleware: CORS (Permissive for local dev)
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(SESSION_ID_HEADER)])
}
