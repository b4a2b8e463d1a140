//! Tool handlers exposed by every protocol server.
//!
//! Both tools read the context document through the shared
//! [`ContextClient`]. They differ in how failure is reported: `getContext`
//! fails the call, `healthCheck` reports an unhealthy provider as data.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use tracing::warn;

use super::models::{CallToolResult, Content, GET_CONTEXT_TOOL, HEALTH_CHECK_TOOL};
use crate::provider::{ContextClient, ProviderError};

/// Future returned by a tool handler.
pub type ToolFuture = BoxFuture<'static, Result<CallToolResult, ToolError>>;

/// Asynchronous tool handler, called with the `arguments` of `tools/call`.
pub type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// A failure that aborts a tool call.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to fetch context from {base_url}: {source}")]
    ContextUnavailable {
        base_url: String,
        #[source]
        source: ProviderError,
    },
}

/// Dependencies shared by the tool handlers of every session.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub client: ContextClient,
    /// Append the raw document as a second content item of `getContext`
    pub include_raw_json: bool,
}

/// A named tool registered on a protocol server.
#[derive(Clone)]
pub struct Tool {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    handler: ToolHandler,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool").field("name", &self.name).finish()
    }
}

impl Tool {
    pub fn new(
        name: &'static str,
        title: &'static str,
        description: &'static str,
        input_schema: Value,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name,
            title,
            description,
            input_schema,
            handler,
        }
    }

    /// Entry of the `tools/list` result.
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "title": self.title,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }

    pub async fn call(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
        (self.handler)(arguments).await
    }
}

/// The fixed tool set: `getContext` and `healthCheck`.
pub fn registered_tools(ctx: ToolContext) -> Vec<Tool> {
    let context_ctx = ctx.clone();
    let health_ctx = ctx;

    vec![
        Tool::new(
            GET_CONTEXT_TOOL,
            "Return UserContextV0 summary",
            "Fetch UserContextV0 from vault-api and summarize identity, timezone, tone and email.",
            json!({
                "type": "object",
                "properties": {
                    "scopes": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Requested context scopes (informational)"
                    }
                },
                "additionalProperties": false
            }),
            Arc::new(move |_args| {
                let ctx = context_ctx.clone();
                async move { get_context(&ctx).await }.boxed()
            }),
        ),
        Tool::new(
            HEALTH_CHECK_TOOL,
            "Check vault-api health",
            "Verify that vault-api is reachable and serving a context document.",
            json!({ "type": "object", "properties": {}, "additionalProperties": false }),
            Arc::new(move |_args| {
                let ctx = health_ctx.clone();
                async move { Ok(health_check(&ctx).await) }.boxed()
            }),
        ),
    ]
}

/// Handles `getContext`.
pub async fn get_context(ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
    let document = ctx
        .client
        .fetch_context()
        .await
        .map_err(|source| ToolError::ContextUnavailable {
            base_url: ctx.client.base_url().to_string(),
            source,
        })?;

    let mut content = vec![Content::text(summarize_context(&document.value))];
    if ctx.include_raw_json {
        content.push(Content::text(document.raw));
    }
    Ok(CallToolResult::success(content))
}

/// Handles `healthCheck`. Never fails the call.
pub async fn health_check(ctx: &ToolContext) -> CallToolResult {
    let base_url = ctx.client.base_url();
    match ctx.client.fetch_context().await {
        Ok(document) => CallToolResult::success(vec![Content::text(format!(
            "vault-api is healthy at {base_url}: context available for {}",
            full_name(&document.value)
        ))]),
        Err(err) => {
            warn!(%base_url, error = %err, "vault-api health check failed");
            CallToolResult::error(vec![Content::text(format!(
                "vault-api is unreachable at {base_url}: {err}"
            ))])
        }
    }
}

/// One-line summary of a context document.
///
/// `Fetched context for <name>[ (timezone: <tz>)][, tone: <tone>][, email: <email>]`
pub fn summarize_context(document: &Value) -> String {
    let mut summary = format!("Fetched context for {}", full_name(document));
    if let Some(timezone) = str_at(document, "/identity/timezone") {
        summary.push_str(&format!(" (timezone: {timezone})"));
    }
    if let Some(tone) = str_at(document, "/prefs/tone") {
        summary.push_str(&format!(", tone: {tone}"));
    }
    if let Some(email) = primary_email(document) {
        summary.push_str(&format!(", email: {email}"));
    }
    summary
}

fn full_name(document: &Value) -> &str {
    str_at(document, "/identity/fullName").unwrap_or("unknown")
}

fn primary_email(document: &Value) -> Option<&str> {
    str_at(document, "/comms/primaryEmail").or_else(|| str_at(document, "/identity/emails/0"))
}

/// Non-empty string at a JSON pointer; anything else counts as absent.
fn str_at<'a>(document: &'a Value, pointer: &str) -> Option<&'a str> {
    document
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}
