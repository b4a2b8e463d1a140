//! MCP Protocol Helpers
//!
//! This module contains helper functions for JSON-RPC envelopes, header
//! negotiation and message parsing shared by the transport and the router.

use super::models::*;
use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{sse::Event, IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// Builds a JSON-RPC 2.0 success response.
///
/// # Arguments
///
/// * `id` – The request identifier that must be echoed back.
/// * `result` – The payload representing the successful outcome.
///
/// # Returns
///
/// A `serde_json::Value` shaped as a JSON-RPC success envelope.
pub fn rpc_success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

/// Builds a JSON-RPC 2.0 error response.
///
/// # Arguments
///
/// * `id` – The request identifier (or `null` if unavailable).
/// * `code` – The JSON-RPC error code (e.g., -32601 for method not found).
/// * `message` – Human-readable description of the error.
///
/// # Returns
///
/// A `serde_json::Value` shaped as a JSON-RPC error envelope.
pub fn rpc_error(id: Value, code: i32, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message.into(),
        }
    })
}

/// Builds a JSON-RPC 2.0 notification (no `id`).
pub fn rpc_notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
}

/// An HTTP response carrying a JSON-RPC error envelope with a `null` id.
pub fn rpc_error_response(status: StatusCode, code: i32, message: impl Into<String>) -> Response {
    (status, Json(rpc_error(Value::Null, code, message))).into_response()
}

/// Wraps a JSON-RPC message as an SSE `message` event.
pub fn sse_message(message: &Value) -> Event {
    Event::default().event("message").data(message.to_string())
}

/// Returns true when any `Accept` header lists `mime` (parameters ignored).
pub fn accepts(headers: &HeaderMap, mime: &str) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|part| part.split(';').next())
        .any(|media| media.trim().eq_ignore_ascii_case(mime))
}

/// Returns true when a media range of the `Accept` header (wildcards
/// included) covers one of `mimes`. A missing header covers nothing.
pub fn accepts_any(headers: &HeaderMap, mimes: &[&str]) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|part| part.split(';').next())
        .map(str::trim)
        .any(|range| mimes.iter().any(|mime| media_range_covers(range, mime)))
}

fn media_range_covers(range: &str, mime: &str) -> bool {
    if range == "*/*" || range.eq_ignore_ascii_case(mime) {
        return true;
    }
    match (range.strip_suffix("/*"), mime.split_once('/')) {
        (Some(kind), Some((mime_kind, _))) => kind.eq_ignore_ascii_case(mime_kind),
        _ => false,
    }
}

/// Returns true when the `Content-Type` header names `mime`.
pub fn has_content_type(headers: &HeaderMap, mime: &str) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(mime))
}

/// Extracts a non-empty session identifier from the request headers.
pub fn session_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Parses a POST body into messages.
///
/// Returns the messages and whether the body was a batch (JSON array).
pub fn parse_messages(body: &[u8]) -> Result<(Vec<IncomingMessage>, bool), serde_json::Error> {
    let value: Value = serde_json::from_slice(body)?;
    match value {
        Value::Array(items) => {
            let messages = items
                .into_iter()
                .map(IncomingMessage::from_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok((messages, true))
        }
        single => Ok((vec![IncomingMessage::from_value(single)?], false)),
    }
}

/// Cheap pre-check used by the router before any session exists: does this
/// body contain an `initialize` request?
pub fn is_initialize_body(body: &[u8]) -> bool {
    parse_messages(body)
        .map(|(messages, _)| messages.iter().any(IncomingMessage::is_initialize))
        .unwrap_or(false)
}

/// Echoes the client's protocol version when supported, else the latest.
pub fn negotiate_protocol_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|version| {
            SUPPORTED_PROTOCOL_VERSIONS
                .iter()
                .copied()
                .find(|supported| *supported == version)
        })
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}
