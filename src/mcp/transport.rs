//! Streamable HTTP transport.
//!
//! One [`StreamableHttpTransport`] carries the messages of one session. It is
//! constructed without an identity; the identifier is generated when the
//! `initialize` request arrives, at which point the establishment hook runs.
//! Closing the transport runs the close hook exactly once.
//!
//! In stateless mode (no identifier generator) every request is accepted
//! without session validation and no hooks fire on initialize.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::{
    body::Bytes,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use super::helpers::*;
use super::models::*;
use super::server::McpServer;

/// Produces session identifiers. Must never return the same value twice.
pub type SessionIdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Runs once the transport has assigned its session identifier. Returning
/// false refuses the session.
pub type SessionInitializedHook = Box<dyn FnOnce(&str) -> bool + Send>;

/// Runs once when the transport closes, with its identifier if it had one.
pub type CloseHook = Box<dyn FnOnce(Option<&str>) + Send>;

/// Capacity of the standalone notification stream.
const EVENT_CHANNEL_CAPACITY: usize = 64;
/// Capacity of a per-request response stream.
const RESPONSE_CHANNEL_CAPACITY: usize = 16;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Random UUID v4 identifiers.
pub fn uuid_session_ids() -> SessionIdGenerator {
    Arc::new(|| uuid::Uuid::new_v4().to_string())
}

/// Transport behaviour switches.
#[derive(Clone, Default)]
pub struct TransportOptions {
    /// `None` selects stateless mode
    pub session_id_generator: Option<SessionIdGenerator>,
    /// Answer POSTs with a JSON body instead of an event stream
    pub json_response: bool,
}

impl TransportOptions {
    pub fn stateful(generator: SessionIdGenerator, json_response: bool) -> Self {
        Self {
            session_id_generator: Some(generator),
            json_response,
        }
    }

    /// No session identifiers, JSON responses.
    pub fn stateless() -> Self {
        Self {
            session_id_generator: None,
            json_response: true,
        }
    }
}

/// Faults raised while delegating a request to a transport.
///
/// Protocol-level rejections (bad headers, bad session) are ordinary
/// responses; these are internal failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not connected to a protocol server")]
    NotConnected,

    #[error("transport is already connected to a protocol server")]
    AlreadyConnected,

    #[error("transport is closed")]
    Closed,

    #[error("session {0} could not be registered")]
    RegistrationRejected(String),

    #[error("request handler failed: {0}")]
    Dispatch(#[from] tokio::task::JoinError),
}

pub struct StreamableHttpTransport {
    options: TransportOptions,
    session_id: OnceLock<String>,
    server: OnceLock<Arc<McpServer>>,
    events: Mutex<Option<broadcast::Sender<Value>>>,
    standalone_open: AtomicBool,
    closed: AtomicBool,
    on_initialized: Mutex<Option<SessionInitializedHook>>,
    on_close: Mutex<Option<CloseHook>>,
}

impl std::fmt::Debug for StreamableHttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpTransport")
            .field("session_id", &self.session_id.get())
            .field("stateful", &self.is_stateful())
            .field("json_response", &self.options.json_response)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl StreamableHttpTransport {
    pub fn new(options: TransportOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            options,
            session_id: OnceLock::new(),
            server: OnceLock::new(),
            events: Mutex::new(Some(events)),
            standalone_open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            on_initialized: Mutex::new(None),
            on_close: Mutex::new(None),
        }
    }

    /// The identifier assigned on `initialize`, if any yet.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.get().map(String::as_str)
    }

    pub fn is_stateful(&self) -> bool {
        self.options.session_id_generator.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn on_session_initialized(&self, hook: SessionInitializedHook) {
        *self.on_initialized.lock() = Some(hook);
    }

    pub fn on_close(&self, hook: CloseHook) {
        *self.on_close.lock() = Some(hook);
    }

    /// Binds the protocol server that will handle this transport's messages.
    pub fn connect(&self, server: Arc<McpServer>) -> Result<(), TransportError> {
        let sink = self
            .events
            .lock()
            .as_ref()
            .cloned()
            .ok_or(TransportError::Closed)?;
        self.server
            .set(Arc::clone(&server))
            .map_err(|_| TransportError::AlreadyConnected)?;
        server.attach(sink);
        Ok(())
    }

    /// Closes the transport: ends its streams and runs the close hook.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.events.lock().take();

        let hook = self.on_close.lock().take();
        if let Some(hook) = hook {
            hook(self.session_id());
        }
        debug!(session_id = ?self.session_id(), "MCP transport closed");
    }

    /// Handles a POST carrying one message or a batch.
    pub async fn handle_post(
        &self,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        if !accepts(headers, JSON_MIME) || !accepts(headers, EVENT_STREAM_MIME) {
            return Ok(rpc_error_response(
                StatusCode::NOT_ACCEPTABLE,
                SERVER_ERROR,
                "Not Acceptable: Client must accept both application/json and text/event-stream",
            ));
        }

        if !has_content_type(headers, JSON_MIME) {
            return Ok(rpc_error_response(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                SERVER_ERROR,
                "Unsupported Media Type: Content-Type must be application/json",
            ));
        }

        let (messages, batch) = match parse_messages(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "unparseable MCP message");
                return Ok(rpc_error_response(
                    StatusCode::BAD_REQUEST,
                    PARSE_ERROR,
                    "Parse error: Invalid JSON-RPC message",
                ));
            }
        };

        if messages.iter().any(IncomingMessage::is_initialize) {
            if let Some(rejection) = self.initialize_session(messages.len())? {
                return Ok(rejection);
            }
        } else if let Some(rejection) = self.validate_session(headers) {
            return Ok(rejection);
        } else if let Some(rejection) = validate_protocol_version(headers) {
            return Ok(rejection);
        }

        let server = self.server.get().cloned().ok_or(TransportError::NotConnected)?;

        let mut requests = Vec::new();
        for message in messages {
            match message {
                IncomingMessage::Request(request) => requests.push(request),
                IncomingMessage::Notification(notification) => {
                    server.handle_notification(&notification)
                }
                IncomingMessage::Response(_) => debug!("ignoring client response"),
            }
        }

        if requests.is_empty() {
            return Ok(self.with_session_header(StatusCode::ACCEPTED.into_response()));
        }

        if self.options.json_response {
            let responses = tokio::spawn(async move {
                let mut responses = Vec::with_capacity(requests.len());
                for request in requests {
                    responses.push(server.handle_request(request).await);
                }
                responses
            })
            .await?;

            let body = if batch {
                Value::Array(responses)
            } else {
                responses.into_iter().next().unwrap_or(Value::Null)
            };
            return Ok(self.with_session_header((StatusCode::OK, Json(body)).into_response()));
        }

        let (tx, rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let session_id = self.session_id.get().cloned();
        let worker = tokio::spawn(async move {
            for request in requests {
                let response = server.handle_request(request).await;
                if tx.send(response).await.is_err() {
                    warn!(?session_id, "client went away before all responses were streamed");
                    break;
                }
            }
        });
        tokio::spawn(async move {
            // Headers are already sent at this point; the failure can only be logged.
            if let Err(e) = worker.await {
                error!(error = %e, "MCP request handler failed mid-stream");
            }
        });

        let stream =
            ReceiverStream::new(rx).map(|message| Ok::<_, Infallible>(sse_message(&message)));
        Ok(self.with_session_header(Sse::new(stream).into_response()))
    }

    /// Opens the standalone event stream for server-initiated messages.
    ///
    /// Dropping the stream (client disconnect) closes the transport.
    pub async fn handle_get(self: &Arc<Self>, headers: &HeaderMap) -> Result<Response, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        if !accepts(headers, EVENT_STREAM_MIME) {
            return Ok(rpc_error_response(
                StatusCode::NOT_ACCEPTABLE,
                SERVER_ERROR,
                "Not Acceptable: Client must accept text/event-stream",
            ));
        }

        if let Some(rejection) = self
            .validate_session(headers)
            .or_else(|| validate_protocol_version(headers))
        {
            return Ok(rejection);
        }

        let receiver = self
            .events
            .lock()
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(TransportError::Closed)?;

        if self.standalone_open.swap(true, Ordering::SeqCst) {
            return Ok(rpc_error_response(
                StatusCode::CONFLICT,
                SERVER_ERROR,
                "Conflict: Only one SSE stream is allowed per session",
            ));
        }

        info!(session_id = ?self.session_id(), "MCP standalone SSE stream opened");

        let guard = StandaloneStreamGuard {
            transport: Arc::clone(self),
        };
        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            let _guard = &guard;
            match item {
                Ok(message) => Some(Ok::<_, Infallible>(sse_message(&message))),
                Err(lagged) => {
                    warn!(error = %lagged, "SSE subscriber lagged; notifications dropped");
                    None
                }
            }
        });

        Ok(self.with_session_header(
            Sse::new(stream)
                .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
                .into_response(),
        ))
    }

    /// Assigns the session identifier and runs the establishment hook.
    ///
    /// `Ok(Some(response))` is a protocol rejection.
    fn initialize_session(&self, message_count: usize) -> Result<Option<Response>, TransportError> {
        if message_count > 1 {
            return Ok(Some(rpc_error_response(
                StatusCode::BAD_REQUEST,
                INVALID_REQUEST,
                "Invalid Request: Only one initialization request is allowed",
            )));
        }

        let Some(generator) = &self.options.session_id_generator else {
            return Ok(None);
        };

        let already_initialized = || {
            rpc_error_response(
                StatusCode::BAD_REQUEST,
                INVALID_REQUEST,
                "Invalid Request: Server already initialized",
            )
        };
        if self.session_id.get().is_some() {
            return Ok(Some(already_initialized()));
        }

        let id = generator();
        if self.session_id.set(id.clone()).is_err() {
            return Ok(Some(already_initialized()));
        }

        let hook = self.on_initialized.lock().take();
        if let Some(hook) = hook {
            if !hook(&id) {
                return Err(TransportError::RegistrationRejected(id));
            }
        }
        info!(session_id = %id, "MCP session initialized");
        Ok(None)
    }

    /// Session checks for every non-initialize request in stateful mode.
    fn validate_session(&self, headers: &HeaderMap) -> Option<Response> {
        if !self.is_stateful() {
            return None;
        }

        let Some(expected) = self.session_id() else {
            return Some(rpc_error_response(
                StatusCode::BAD_REQUEST,
                SERVER_ERROR,
                "Bad Request: Server not initialized",
            ));
        };

        match session_id_from(headers) {
            None => Some(rpc_error_response(
                StatusCode::BAD_REQUEST,
                SERVER_ERROR,
                "Bad Request: Mcp-Session-Id header is required",
            )),
            Some(provided) if provided != expected => Some(rpc_error_response(
                StatusCode::NOT_FOUND,
                SESSION_NOT_FOUND,
                "Session not found",
            )),
            Some(_) => None,
        }
    }

    fn with_session_header(&self, mut response: Response) -> Response {
        if let Some(id) = self.session_id() {
            if let Ok(value) = HeaderValue::from_str(id) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(SESSION_ID_HEADER), value);
            }
        }
        response
    }
}

/// Rejects an explicitly unsupported `mcp-protocol-version`; absence is fine.
fn validate_protocol_version(headers: &HeaderMap) -> Option<Response> {
    let version = headers.get(PROTOCOL_VERSION_HEADER)?.to_str().ok()?;
    if SUPPORTED_PROTOCOL_VERSIONS.contains(&version) {
        return None;
    }
    Some(rpc_error_response(
        StatusCode::BAD_REQUEST,
        SERVER_ERROR,
        format!(
            "Bad Request: Unsupported protocol version (supported versions: {})",
            SUPPORTED_PROTOCOL_VERSIONS.join(", ")
        ),
    ))
}

/// Lives inside the standalone stream; dropping it closes the transport.
struct StandaloneStreamGuard {
    transport: Arc<StreamableHttpTransport>,
}

impl Drop for StandaloneStreamGuard {
    fn drop(&mut self) {
        self.transport.standalone_open.store(false, Ordering::SeqCst);
        if !self.transport.is_closed() {
            info!(session_id = ?self.transport.session_id(), "MCP standalone SSE stream disconnected");
            self.transport.close();
        }
    }
}
