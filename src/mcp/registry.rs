//! Session registry.
//!
//! Maps session identifiers to live sessions. A session enters the registry
//! only once its transport has assigned an identifier on `initialize`, and
//! leaves it when the transport closes, whichever way that happens.

use std::sync::{Arc, Weak};

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::{debug, info, warn};

use super::server::{McpServer, ServerFactory};
use super::transport::{StreamableHttpTransport, TransportError, TransportOptions};

/// A transport together with the protocol server connected to it.
#[derive(Clone, Debug)]
pub struct Session {
    transport: Arc<StreamableHttpTransport>,
    server: Arc<McpServer>,
}

impl Session {
    pub fn id(&self) -> Option<&str> {
        self.transport.session_id()
    }

    pub fn transport(&self) -> &Arc<StreamableHttpTransport> {
        &self.transport
    }

    pub fn server(&self) -> &Arc<McpServer> {
        &self.server
    }

    /// Closes the transport; its close hook unregisters the session.
    pub fn close(&self) {
        self.transport.close();
    }
}

pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
    factory: ServerFactory,
    options: TransportOptions,
}

impl SessionRegistry {
    pub fn new(factory: ServerFactory, options: TransportOptions) -> Self {
        Self {
            sessions: DashMap::new(),
            factory,
            options,
        }
    }

    /// Returns a handle to the session, never a guard into the map.
    pub fn lookup(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Builds an unregistered session: fresh server, fresh transport, hooks
    /// wired so that `initialize` registers it and closing removes it.
    pub fn create(self: &Arc<Self>) -> Result<Session, TransportError> {
        let server = Arc::new(self.factory.build());
        let transport = Arc::new(StreamableHttpTransport::new(self.options.clone()));
        transport.connect(Arc::clone(&server))?;

        let registry: Weak<Self> = Arc::downgrade(self);
        let owner = Arc::downgrade(&transport);
        let owned_server = Arc::clone(&server);
        transport.on_session_initialized(Box::new(move |id: &str| {
            match (registry.upgrade(), owner.upgrade()) {
                (Some(registry), Some(transport)) => registry.register(
                    id,
                    Session {
                        transport,
                        server: owned_server,
                    },
                ),
                _ => false,
            }
        }));

        let registry: Weak<Self> = Arc::downgrade(self);
        let owner = Arc::downgrade(&transport);
        transport.on_close(Box::new(move |id: Option<&str>| {
            if let (Some(id), Some(registry)) = (id, registry.upgrade()) {
                registry.unregister(id, &owner);
            }
        }));

        let session = Session { transport, server };
        Ok(session)
    }

    /// Inserts the session under `id`. Refuses an identifier already in use.
    fn register(&self, id: &str, session: Session) -> bool {
        let inserted = match self.sessions.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
        };
        if inserted {
            info!(session_id = %id, active = self.sessions.len(), "MCP session registered");
        } else {
            warn!(session_id = %id, "refusing duplicate MCP session id");
        }
        inserted
    }

    /// Removes `id` only while it still maps to `owner`. A transport whose
    /// registration was refused shares the id but must not evict the holder.
    fn unregister(&self, id: &str, owner: &Weak<StreamableHttpTransport>) {
        let owned = self
            .sessions
            .get(id)
            .is_some_and(|entry| std::ptr::eq(Arc::as_ptr(&entry.transport), owner.as_ptr()));
        if owned {
            self.remove(id);
        }
    }

    /// Drops the session and closes its server. Idempotent.
    pub fn remove(&self, id: &str) -> Option<Session> {
        let (_, session) = self.sessions.remove(id)?;
        session.server.close();
        info!(session_id = %id, active = self.sessions.len(), "MCP session removed");
        Some(session)
    }

    /// Closes the session's transport, which removes it. Returns false when
    /// no such session exists.
    pub fn close(&self, id: &str) -> bool {
        match self.lookup(id) {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Closes every registered session.
    pub fn close_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        debug!(count = ids.len(), "closing all MCP sessions");
        for id in ids {
            self.close(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::ToolContext;
    use crate::mcp::transport::SessionIdGenerator;
    use crate::provider::ContextClient;
    use axum::{
        body::Bytes,
        http::{header, HeaderMap, HeaderValue, StatusCode},
    };
    use std::time::Duration;

    fn factory() -> ServerFactory {
        let client = ContextClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        ServerFactory::new(
            ToolContext {
                client,
                include_raw_json: false,
            },
            None,
        )
    }

    fn registry(generator: SessionIdGenerator) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            factory(),
            TransportOptions::stateful(generator, true),
        ))
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn initialize() -> Bytes {
        Bytes::from_static(br#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
    }

    async fn initialized(registry: &Arc<SessionRegistry>) -> Session {
        let session = registry.create().unwrap();
        let response = session
            .transport()
            .handle_post(&headers(), initialize())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        session
    }

    #[tokio::test]
    async fn registered_only_after_initialize() {
        let registry = registry(crate::mcp::transport::uuid_session_ids());

        let session = registry.create().unwrap();
        assert!(registry.is_empty());
        assert!(session.id().is_none());

        session
            .transport()
            .handle_post(&headers(), initialize())
            .await
            .unwrap();

        let id = session.id().unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(id));
        assert!(Arc::ptr_eq(
            registry.lookup(id).unwrap().transport(),
            session.transport()
        ));
    }

    #[tokio::test]
    async fn close_unregisters_and_closes_server() {
        let registry = registry(crate::mcp::transport::uuid_session_ids());
        let session = initialized(&registry).await;
        let id = session.id().unwrap().to_string();

        assert!(registry.close(&id));

        assert!(registry.lookup(&id).is_none());
        assert!(session.transport().is_closed());
        assert!(session.server().is_closed());
        assert!(!registry.close(&id));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = registry(crate::mcp::transport::uuid_session_ids());
        let session = initialized(&registry).await;
        let id = session.id().unwrap().to_string();

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.remove("never-existed").is_none());
    }

    #[tokio::test]
    async fn duplicate_id_is_refused() {
        let registry = registry(Arc::new(|| "fixed".to_string()));
        let first = initialized(&registry).await;

        let second = registry.create().unwrap();
        let result = second.transport().handle_post(&headers(), initialize()).await;

        assert!(matches!(result, Err(TransportError::RegistrationRejected(_))));
        second.close();
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(
            registry.lookup("fixed").unwrap().transport(),
            first.transport()
        ));
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        let registry = registry(crate::mcp::transport::uuid_session_ids());
        let a = initialized(&registry).await;
        let b = initialized(&registry).await;
        assert_eq!(registry.len(), 2);

        registry.close_all();

        assert!(registry.is_empty());
        assert!(a.transport().is_closed());
        assert!(b.transport().is_closed());
    }

    #[tokio::test]
    async fn uninitialized_session_closes_quietly() {
        let registry = registry(crate::mcp::transport::uuid_session_ids());
        let session = registry.create().unwrap();

        session.close();

        assert!(registry.is_empty());
    }
}
