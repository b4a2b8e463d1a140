//! MCP Adapter State
//!
//! State shared by every route of the adapter: configuration, the session
//! registry and the factory that builds per-request servers for the
//! stateless endpoint.

use crate::config::Config;
use crate::mcp::{transport::uuid_session_ids, ServerFactory, SessionRegistry, TransportOptions};
use crate::provider::ProviderError;
use std::sync::Arc;

/// Shared application state that can be safely passed between threads
pub type SharedState = Arc<AppState>;

/// Core application state
pub struct AppState {
    pub config: Config,

    /// Live sessions, keyed by session id.
    pub registry: Arc<SessionRegistry>,

    pub factory: ServerFactory,
}

impl AppState {
    /// Creates the state for `config`. Fails only if the HTTP client for the
    /// context provider cannot be built.
    pub fn new(config: Config) -> Result<Self, ProviderError> {
        let factory = ServerFactory::from_config(&config)?;
        let options = TransportOptions::stateful(uuid_session_ids(), config.json_response);
        let registry = Arc::new(SessionRegistry::new(factory.clone(), options));

        Ok(Self {
            config,
            registry,
            factory,
        })
    }
}
