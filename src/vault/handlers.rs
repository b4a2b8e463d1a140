//! REST API handlers for the vault-api provider

use super::state::SharedVaultState;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};

/// Creates routes for context-related operations
pub fn routes() -> Router<SharedVaultState> {
    Router::new().route("/v0/context", get(get_context))
}

/// Endpoint: GET /v0/context
/// Returns the UserContextV0 document.
async fn get_context(State(state): State<SharedVaultState>) -> impl IntoResponse {
    Json(state.context.clone())
}
