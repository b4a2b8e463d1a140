//! MCP Protocol Models and Constants
//!
//! This module contains the data structures and constants of the Model
//! Context Protocol (MCP) wire format used by this server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// MCP Constants
// =============================================================================

/// Server identifier reported in `serverInfo`
pub const SERVER_NAME: &str = "mcp-vault";
/// Server version reported in `serverInfo`
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Protocol version answered when the client asks for an unknown one
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";
/// Protocol versions this server speaks, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Name of the context tool
pub const GET_CONTEXT_TOOL: &str = "getContext";
/// Name of the liveness tool
pub const HEALTH_CHECK_TOOL: &str = "healthCheck";

/// Request/response header carrying the session identifier
pub const SESSION_ID_HEADER: &str = "mcp-session-id";
/// Request header carrying the negotiated protocol version
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

pub const JSON_MIME: &str = "application/json";
pub const EVENT_STREAM_MIME: &str = "text/event-stream";

// JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// Transport-level rejection (bad session, negotiation failure)
pub const SERVER_ERROR: i32 = -32000;
/// Session identifier did not match the transport's session
pub const SESSION_NOT_FOUND: i32 = -32001;

// =============================================================================
// MCP Protocol Models
// =============================================================================

/// Standard JSON-RPC 2.0 Request envelope
///
/// Also used for notifications, which carry no `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version (should be "2.0")
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,

    /// Method name to invoke
    pub method: String,

    /// Parameters for the method
    pub params: Option<Value>,

    /// Request identifier
    pub id: Option<Value>,
}

/// A single message received from a client.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Expects a response
    Request(JsonRpcRequest),
    /// Fire-and-forget
    Notification(JsonRpcRequest),
    /// Response or error to a server-initiated request
    Response(Value),
}

impl IncomingMessage {
    /// Classifies a raw JSON-RPC value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if value.get("method").is_none()
            && (value.get("result").is_some() || value.get("error").is_some())
        {
            return Ok(Self::Response(value));
        }
        let request: JsonRpcRequest = serde_json::from_value(value)?;
        Ok(if request.id.is_some() {
            Self::Request(request)
        } else {
            Self::Notification(request)
        })
    }

    pub fn is_initialize(&self) -> bool {
        matches!(self, Self::Request(req) if req.method == "initialize")
    }
}

/// Parameters of a `tools/call` request
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// One content item of a tool result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            Self::Text { text } => text,
        }
    }
}

/// Result of a `tools/call`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,

    /// Set when the tool reports a failure as data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    pub fn success(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: None,
        }
    }

    pub fn error(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: Some(true),
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}
