//! Protocol server and the per-session factory.
//!
//! A [`McpServer`] implements MCP method dispatch for one session. It is
//! built by [`ServerFactory`], connected to exactly one transport, and closed
//! together with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::helpers::{negotiate_protocol_version, rpc_error, rpc_notification, rpc_success};
use super::models::*;
use super::tools::{registered_tools, Tool, ToolContext};
use crate::config::Config;
use crate::provider::{ContextClient, ProviderError};

/// Decorator applied to every outbound message. Must return the message it
/// was given.
pub type OutboundHook = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Outbound hook that logs each message and passes it through unchanged.
pub fn logging_hook() -> OutboundHook {
    Arc::new(|message: Value| {
        info!(target: "mcp_vault::outbound", payload = %message, "outgoing MCP message");
        message
    })
}

/// MCP protocol server for a single session.
pub struct McpServer {
    tools: Vec<Tool>,
    outbound: Option<OutboundHook>,
    /// Sink for server-initiated messages, attached by the transport
    notifier: Mutex<Option<broadcast::Sender<Value>>>,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("tools", &self.tools)
            .field("logging", &self.outbound.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl McpServer {
    pub fn new(tools: Vec<Tool>, outbound: Option<OutboundHook>) -> Self {
        Self {
            tools,
            outbound,
            notifier: Mutex::new(None),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether the client has sent `notifications/initialized`.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Attaches the sink that carries notifications to the client.
    pub(crate) fn attach(&self, sink: broadcast::Sender<Value>) {
        *self.notifier.lock() = Some(sink);
    }

    /// Releases the notification sink. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notifier.lock().take();
        debug!("MCP server closed");
    }

    /// Dispatches a request and returns its (decorated) response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Value {
        let id = request.id.clone().unwrap_or(Value::Null);
        let params = request.params.unwrap_or(Value::Null);
        debug!(
            method = %request.method,
            id = %id,
            client_initialized = self.is_initialized(),
            "MCP request"
        );

        let response = if self.is_closed() {
            rpc_error(id, INTERNAL_ERROR, "Server closed")
        } else {
            match request.method.as_str() {
                "initialize" => rpc_success(id, self.handle_initialize(&params)),
                "ping" => rpc_success(id, json!({})),
                "tools/list" => rpc_success(id, self.handle_tools_list()),
                "tools/call" => self.handle_tools_call(id, params).await,
                other => rpc_error(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
            }
        };

        self.send(response)
    }

    /// Handles a client notification. Notifications never produce a response.
    pub fn handle_notification(&self, notification: &JsonRpcRequest) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                self.initialized.store(true, Ordering::SeqCst);
                debug!("MCP client initialized");
            }
            "notifications/cancelled" => debug!("MCP client cancelled a request"),
            other => debug!(method = %other, "ignoring MCP notification"),
        }
    }

    /// Pushes a server-initiated notification to the client's event stream.
    ///
    /// Returns false when no stream is listening.
    pub fn notify(&self, method: &str, params: Value) -> bool {
        let message = self.send(rpc_notification(method, params));
        match self.notifier.lock().as_ref() {
            Some(sink) => sink.send(message).is_ok(),
            None => false,
        }
    }

    /// Outbound path; every message leaving the server passes through here.
    fn send(&self, message: Value) -> Value {
        match &self.outbound {
            Some(hook) => hook(message),
            None => message,
        }
    }

    fn handle_initialize(&self, params: &Value) -> Value {
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        json!({
            "protocolVersion": negotiate_protocol_version(requested),
            "capabilities": {
                "tools": { "listChanged": false },
                "logging": {}
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            }
        })
    }

    fn handle_tools_list(&self) -> Value {
        let tools: Vec<Value> = self.tools.iter().map(Tool::descriptor).collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, id: Value, params: Value) -> Value {
        let call: ToolCallParams = match serde_json::from_value(params) {
            Ok(call) => call,
            Err(e) => return rpc_error(id, INVALID_PARAMS, format!("Invalid params: {e}")),
        };

        let Some(tool) = self.tools.iter().find(|tool| tool.name == call.name) else {
            return rpc_error(id, INVALID_PARAMS, format!("Tool {} not found", call.name));
        };

        match tool.call(call.arguments.unwrap_or(Value::Null)).await {
            Ok(result) => match serde_json::to_value(result) {
                Ok(result) => rpc_success(id, result),
                Err(e) => rpc_error(id, INTERNAL_ERROR, format!("Invalid tool result: {e}")),
            },
            Err(err) => {
                warn!(tool = tool.name, error = %err, "tool call failed");
                self.notify(
                    "notifications/message",
                    json!({ "level": "error", "logger": SERVER_NAME, "data": err.to_string() }),
                );
                rpc_error(id, INTERNAL_ERROR, err.to_string())
            }
        }
    }
}

/// Builds one [`McpServer`] per session, all sharing the provider client.
#[derive(Clone)]
pub struct ServerFactory {
    tool_context: ToolContext,
    outbound: Option<OutboundHook>,
}

impl ServerFactory {
    pub fn new(tool_context: ToolContext, outbound: Option<OutboundHook>) -> Self {
        Self {
            tool_context,
            outbound,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let client = ContextClient::new(&config.vault_url, config.vault_timeout)?;
        let outbound = config.log_messages.then(logging_hook);
        Ok(Self::new(
            ToolContext {
                client,
                include_raw_json: config.include_raw_json,
            },
            outbound,
        ))
    }

    pub fn build(&self) -> McpServer {
        McpServer::new(registered_tools(self.tool_context.clone()), self.outbound.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: Some("2.0".into()),
            method: method.into(),
            params: Some(params),
            id: Some(json!(id)),
        }
    }

    fn factory(outbound: Option<OutboundHook>) -> ServerFactory {
        // Port 9 (discard) is never serving HTTP.
        let client = ContextClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        ServerFactory::new(
            ToolContext {
                client,
                include_raw_json: false,
            },
            outbound,
        )
    }

    #[tokio::test]
    async fn initialize_echoes_supported_version() {
        let server = factory(None).build();

        let response = server
            .handle_request(request(1, "initialize", json!({ "protocolVersion": "2025-03-26" })))
            .await;

        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(response["result"]["serverInfo"]["name"], "mcp-vault");
        assert!(response["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn lists_exactly_two_tools() {
        let server = factory(None).build();

        let response = server.handle_request(request(2, "tools/list", json!({}))).await;

        let names: Vec<_> = response["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["getContext", "healthCheck"]);
    }

    #[tokio::test]
    async fn unknown_method_and_tool_are_rejected() {
        let server = factory(None).build();

        let response = server.handle_request(request(3, "resources/list", json!({}))).await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);

        let response = server
            .handle_request(request(4, "tools/call", json!({ "name": "deleteEverything" })))
            .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);

        let response = server.handle_request(request(5, "tools/call", json!("nope"))).await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn failing_get_context_is_an_error_and_a_notification() {
        let server = factory(None).build();
        let (tx, mut rx) = broadcast::channel(4);
        server.attach(tx);

        let response = server
            .handle_request(request(6, "tools/call", json!({ "name": "getContext" })))
            .await;

        assert_eq!(response["error"]["code"], INTERNAL_ERROR);
        let message = response["error"]["message"].as_str().unwrap();
        assert!(message.contains("http://127.0.0.1:9"), "{message}");

        let notification = rx.try_recv().unwrap();
        assert_eq!(notification["method"], "notifications/message");
        assert_eq!(notification["params"]["level"], "error");
    }

    #[tokio::test]
    async fn failing_health_check_is_a_result() {
        let server = factory(None).build();

        let response = server
            .handle_request(request(7, "tools/call", json!({ "name": "healthCheck" })))
            .await;

        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], true);
    }

    #[tokio::test]
    async fn outbound_hook_sees_every_message_unchanged() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let hook: OutboundHook = Arc::new(move |message| {
            counter.fetch_add(1, Ordering::SeqCst);
            message
        });

        let plain = factory(None).build();
        let decorated = factory(Some(hook)).build();

        let expected = plain.handle_request(request(8, "ping", json!({}))).await;
        let actual = decorated.handle_request(request(8, "ping", json!({}))).await;

        assert_eq!(expected, actual);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_server_refuses_requests() {
        let server = factory(None).build();
        server.close();
        server.close();

        let response = server.handle_request(request(9, "ping", json!({}))).await;

        assert_eq!(response["error"]["code"], INTERNAL_ERROR);
        assert!(!server.notify("notifications/message", json!({})));
    }

    #[test]
    fn initialized_notification_is_recorded() {
        let server = factory(None).build();
        server.handle_notification(&JsonRpcRequest {
            jsonrpc: Some("2.0".into()),
            method: "notifications/initialized".into(),
            params: None,
            id: None,
        });
        assert!(server.is_initialized());
    }
}
