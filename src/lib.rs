//! MCP Vault Library
//!
//! An MCP server that exposes a user-context document, fetched from the
//! vault-api provider, as tools over Streamable HTTP. The provider itself
//! ships in the same crate as the `vault_api` binary.

// Domain modules
pub mod mcp;
pub mod provider;
pub mod vault;

// Infrastructure
pub mod config;
pub mod logging;
pub mod router;
pub mod state;
