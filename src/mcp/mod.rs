//! Model Context Protocol (MCP) Module
//!
//! This module contains the MCP adapter, including:
//! - Protocol models (JsonRpcRequest, tool results, constants)
//! - RPC helpers (envelopes, header negotiation, message parsing)
//! - Tool handlers (getContext, healthCheck)
//! - The per-session protocol server and its factory
//! - The Streamable HTTP transport and the session registry
//! - Route handlers for `/mcp`

pub mod handlers;
pub mod helpers;
pub mod models;
pub mod registry;
pub mod server;
pub mod tools;
pub mod transport;

// Re-export commonly used types and functions
pub use handlers::routes;
pub use registry::{Session, SessionRegistry};
pub use server::{McpServer, ServerFactory};
pub use transport::{StreamableHttpTransport, TransportError, TransportOptions};
