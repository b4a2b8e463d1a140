//! MCP (Model Context Protocol) route handlers
//!
//! Routes each request on `/mcp` to the session named by its
//! `mcp-session-id` header, creating a session for an `initialize` request
//! that carries none. `/mcp/stateless` serves each POST with a throwaway
//! server and transport.

use super::{helpers::*, models::*, registry::Session, transport::*};
use crate::state::SharedState;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Creates routes for MCP-related operations
pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/mcp", post(handle_post).get(handle_get).delete(handle_delete)) // Standard endpoint
        .route("/mcp/", post(handle_post).get(handle_get).delete(handle_delete)) // Trailing slash safety
        .route(
            "/mcp/stateless",
            post(handle_stateless_post)
                .get(stateless_method_not_allowed)
                .delete(stateless_method_not_allowed),
        )
}

/// Endpoint: POST /mcp
/// Client-to-server messages. Opens a session on `initialize`.
async fn handle_post(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session = match session_id_from(&headers) {
        Some(id) => state.registry.lookup(&id),
        None if is_initialize_body(&body) => match state.registry.create() {
            Ok(session) => Some(session),
            Err(e) => {
                error!(error = %e, "failed to create MCP session");
                return internal_error();
            }
        },
        None => None,
    };

    let Some(session) = session else {
        debug!("POST without a valid MCP session");
        return no_valid_session();
    };

    debug!(
        session_id = ?session.id(),
        client_initialized = session.server().is_initialized(),
        "MCP POST"
    );
    let result = session.transport().handle_post(&headers, body).await;
    delegate(&session, result)
}

/// Endpoint: GET /mcp
/// Opens the standalone event stream of an existing session.
async fn handle_get(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let Some(session) = session_id_from(&headers).and_then(|id| state.registry.lookup(&id)) else {
        return invalid_or_missing_session();
    };

    let result = session.transport().handle_get(&headers).await;
    match result {
        Err(TransportError::Closed) => invalid_or_missing_session(),
        other => delegate(&session, other),
    }
}

/// Endpoint: DELETE /mcp
/// Terminates a session.
async fn handle_delete(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if !accepts_any(&headers, &[JSON_MIME, EVENT_STREAM_MIME]) {
        return rpc_error_response(
            StatusCode::NOT_ACCEPTABLE,
            SERVER_ERROR,
            "Not Acceptable: Client must accept application/json or text/event-stream",
        );
    }

    match session_id_from(&headers) {
        Some(id) if state.registry.close(&id) => {
            debug!(session_id = %id, "MCP session terminated by client");
            StatusCode::OK.into_response()
        }
        _ => no_valid_session(),
    }
}

/// Endpoint: POST /mcp/stateless
async fn handle_stateless_post(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let server = Arc::new(state.factory.build());
    let transport = StreamableHttpTransport::new(TransportOptions::stateless());

    let result = match transport.connect(Arc::clone(&server)) {
        Ok(()) => transport.handle_post(&headers, body).await,
        Err(e) => Err(e),
    };

    transport.close();
    server.close();

    result.unwrap_or_else(|e| {
        error!(error = %e, "stateless MCP request failed");
        internal_error()
    })
}

/// Endpoint: GET|DELETE /mcp/stateless
async fn stateless_method_not_allowed() -> Response {
    rpc_error_response(StatusCode::METHOD_NOT_ALLOWED, SERVER_ERROR, "Method not allowed.")
}

/// Maps the outcome of a transport call to a response.
fn delegate(session: &Session, result: Result<Response, TransportError>) -> Response {
    match result {
        Ok(response) => response,
        Err(TransportError::Closed) => no_valid_session(),
        Err(e) => {
            error!(session_id = ?session.id(), error = %e, "MCP transport failed");
            if matches!(e, TransportError::RegistrationRejected(_)) {
                session.close();
            }
            internal_error()
        }
    }
}

fn no_valid_session() -> Response {
    rpc_error_response(
        StatusCode::BAD_REQUEST,
        SERVER_ERROR,
        "Bad Request: No valid session ID provided",
    )
}

fn invalid_or_missing_session() -> Response {
    warn!("GET without a valid MCP session");
    (
        StatusCode::BAD_REQUEST,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Bad Request: invalid or missing session ID",
    )
        .into_response()
}

fn internal_error() -> Response {
    rpc_error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_ERROR,
        "Internal server error",
    )
}
