//! HTTP+SSE Server Transport
//!
//! Two routes on one listener: a POST route accepting JSON-RPC messages and
//! an SSE route streaming server-to-client events. Single-client model: at
//! most one SSE consumer at a time.
//!
//! A POST carrying a request resolves in exactly one of two ways:
//!
//! - **inline reply** — the dispatched handler produced its response before
//!   `message_received` returned, so the response travels back as the POST's
//!   own `application/json` body (status 200);
//! - **202 Accepted** — the response, when it arrives, is delivered through
//!   the SSE channel as an `event: message` frame.
//!
//! When no SSE client is attached the transport still works in "streamable
//! HTTP" mode: the first POST mints a session id, returned (and thereafter
//! required) via the `Mcp-Session-Id` header.

// Layer 1: Standard library imports
use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use futures::Stream;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::CorsLayer;
use tracing::{debug, trace, warn};
use uuid::Uuid;

// Layer 3: Internal module imports
use super::{
    check_connectable, check_sendable, lock, StateCell, StateSnapshot, Transport,
    TransportBuilder, TransportError, TransportEvents, TransportState,
};
use crate::protocol::JsonRpcMessage;

/// The session header exchanged on both routes
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Configuration for the HTTP+SSE server transport
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Interface to bind (default: all interfaces)
    pub host: String,
    /// Port to bind; 0 asks the OS for a free port
    pub port: u16,
    /// Route accepting JSON-RPC POSTs
    pub post_path: String,
    /// Route serving the SSE stream
    pub sse_path: String,
    /// Whether Bearer-token authentication is required
    pub require_auth: bool,
    /// The expected Bearer token when auth is enabled
    pub auth_token: Option<String>,
    /// Whether a permissive CORS layer is installed
    pub cors_enabled: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            post_path: "/".to_string(),
            sse_path: "/sse".to_string(),
            require_auth: false,
            auth_token: None,
            cors_enabled: true,
        }
    }
}

impl HttpServerConfig {
    /// Bind to localhost on an OS-assigned port (the common test setup)
    pub fn localhost() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            ..Default::default()
        }
    }

    /// Require `Authorization: Bearer <token>` on every request
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.require_auth = true;
        self.auth_token = Some(token.into());
        self
    }
}

/// The attached SSE consumer, if any
struct SseClient {
    session_id: String,
    frames: mpsc::UnboundedSender<String>,
    next_event_id: AtomicU64,
}

/// State shared between the transport handle and the axum handlers
struct HttpShared {
    config: HttpServerConfig,
    state: Arc<StateCell>,
    snapshot: StateSnapshot,
    sse: Mutex<Option<SseClient>>,
    /// Inline-reply slot; holds at most one armed POST at a time
    inline: Mutex<Option<oneshot::Sender<JsonRpcMessage>>>,
    /// Session id minted in streamable mode (no SSE client attached)
    streamable_session: Mutex<Option<String>>,
}

impl HttpShared {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        if !self.config.require_auth {
            return true;
        }
        let Some(expected) = self.config.auth_token.as_deref() else {
            return false;
        };
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == format!("Bearer {expected}"))
    }

    /// The session id POSTs must present, if a session exists yet
    fn current_session(&self) -> Option<String> {
        if let Some(client) = lock(&self.sse).as_ref() {
            return Some(client.session_id.clone());
        }
        lock(&self.streamable_session).clone()
    }

    /// Session id for the POST response header, minting one if needed
    fn ensure_session(&self) -> String {
        if let Some(existing) = self.current_session() {
            return existing;
        }
        let mut slot = lock(&self.streamable_session);
        match slot.as_ref() {
            Some(existing) => existing.clone(),
            None => {
                let minted = Uuid::new_v4().to_string();
                *slot = Some(minted.clone());
                minted
            }
        }
    }

    /// Push a frame to the SSE client, clearing the slot if it went away
    fn sse_send(&self, frame: String) -> Result<(), TransportError> {
        let mut guard = lock(&self.sse);
        match guard.as_ref() {
            Some(client) => {
                if client.frames.send(frame).is_err() {
                    *guard = None;
                    Err(TransportError::closed("SSE client went away"))
                } else {
                    Ok(())
                }
            }
            None => Err(TransportError::closed(
                "no client connected to deliver message",
            )),
        }
    }

    fn next_event_id(&self) -> Option<u64> {
        lock(&self.sse)
            .as_ref()
            .map(|client| client.next_event_id.fetch_add(1, Ordering::SeqCst))
    }
}

/// Format one `event: message` SSE frame
fn message_frame(event_id: u64, json: &str) -> String {
    format!("id: {event_id}\nevent: message\ndata: {json}\n\n")
}

/// Format the initial `event: endpoint` SSE frame
fn endpoint_frame(post_path: &str, session_id: &str) -> String {
    format!("event: endpoint\ndata: {post_path}?sessionId={session_id}\n\n")
}

/// HTTP+SSE server transport
pub struct HttpServerTransport {
    shared: Arc<HttpShared>,
    server_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl HttpServerTransport {
    /// Builder carrying the given configuration
    pub fn builder(config: HttpServerConfig) -> HttpServerTransportBuilder {
        HttpServerTransportBuilder {
            config,
            handler: None,
        }
    }

    async fn transition(&self, state: TransportState) {
        self.shared.snapshot.store(state);
        self.shared.state.set(state).await;
    }
}

/// Builder for [`HttpServerTransport`]
pub struct HttpServerTransportBuilder {
    config: HttpServerConfig,
    handler: Option<Arc<dyn TransportEvents>>,
}

impl TransportBuilder for HttpServerTransportBuilder {
    type Transport = HttpServerTransport;

    fn with_event_handler(mut self, handler: Arc<dyn TransportEvents>) -> Self {
        self.handler = Some(handler);
        self
    }

    fn build(self) -> Result<HttpServerTransport, TransportError> {
        let handler = self.handler.ok_or_else(|| {
            TransportError::connection("no event handler configured for HTTP transport")
        })?;
        if !self.config.post_path.starts_with('/') || !self.config.sse_path.starts_with('/') {
            return Err(TransportError::connection(
                "HTTP route paths must start with '/'",
            ));
        }
        let snapshot = StateSnapshot::new();
        Ok(HttpServerTransport {
            shared: Arc::new(HttpShared {
                config: self.config,
                state: Arc::new(StateCell::new(handler, "http-sse")),
                snapshot,
                sse: Mutex::new(None),
                inline: Mutex::new(None),
                streamable_session: Mutex::new(None),
            }),
            server_task: None,
            local_addr: None,
        })
    }
}

#[async_trait]
impl Transport for HttpServerTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        check_connectable(self.shared.snapshot.load())?;
        self.transition(TransportState::Connecting).await;

        let bind_addr = format!(
            "{host}:{port}",
            host = self.shared.config.host,
            port = self.shared.config.port
        );
        let listener = match TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.transition(TransportState::Failed).await;
                return Err(TransportError::connection(format!(
                    "failed to bind {bind_addr}: {e}"
                )));
            }
        };
        self.local_addr = listener.local_addr().ok();

        let mut router = Router::new()
            .route(&self.shared.config.post_path, post(handle_post))
            .route(&self.shared.config.sse_path, get(handle_sse));
        if self.shared.config.cors_enabled {
            router = router.layer(CorsLayer::very_permissive());
        }
        let router = router.with_state(Arc::clone(&self.shared));

        self.server_task = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                warn!(error = %e, "HTTP server terminated");
            }
        }));

        self.transition(TransportState::Connected).await;
        debug!(addr = ?self.local_addr, "HTTP+SSE transport listening");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.shared.snapshot.load() == TransportState::Disconnected {
            return Ok(());
        }
        self.transition(TransportState::Disconnecting).await;

        if let Some(task) = self.server_task.take() {
            task.abort();
            let _ = task.await;
        }
        *lock(&self.shared.sse) = None;
        *lock(&self.shared.inline) = None;
        *lock(&self.shared.streamable_session) = None;
        self.local_addr = None;

        self.transition(TransportState::Disconnected).await;
        debug!("HTTP+SSE transport stopped");
        Ok(())
    }

    async fn send(&mut self, message: JsonRpcMessage) -> Result<(), TransportError> {
        check_sendable(self.shared.snapshot.load())?;

        let mut message = message;
        // Replies may resolve an armed POST inline; everything else flows
        // through the SSE channel.
        if message.is_reply() {
            let slot = lock(&self.shared.inline).take();
            if let Some(tx) = slot {
                match tx.send(message) {
                    Ok(()) => return Ok(()),
                    // The POST already resolved; deliver over SSE instead.
                    Err(returned) => message = returned,
                }
            }
        }

        let json = serde_json::to_string(&message)?;
        let event_id = self
            .shared
            .next_event_id()
            .ok_or_else(|| TransportError::closed("no client connected to deliver message"))?;
        self.shared.sse_send(message_frame(event_id, &json))
    }

    fn state(&self) -> TransportState {
        self.shared.snapshot.load()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn transport_type(&self) -> &'static str {
        "http-sse"
    }
}

/// Plain-status response with a short text body
fn status_response(status: StatusCode, body: &'static str) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(body))
        .unwrap_or_default()
}

/// Extract the session id from the header or the `sessionId` query parameter
fn session_from_request(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(value) = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        return Some(value.to_string());
    }
    let query = query?;
    let params: Vec<(String, String)> = serde_urlencoded::from_str(query).ok()?;
    params
        .into_iter()
        .find(|(key, _)| key == "sessionId")
        .map(|(_, value)| value)
}

/// POST route: one JSON-RPC message in, inline reply or 202 out
async fn handle_post(
    State(shared): State<Arc<HttpShared>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    if !shared.authorized(&headers) {
        return status_response(StatusCode::UNAUTHORIZED, "missing or invalid bearer token");
    }

    let content_type_ok = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if !content_type_ok {
        return status_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Content-Type must be application/json",
        );
    }

    // With an SSE client attached, the POST must prove it belongs to that
    // session, via header or query parameter.
    let sse_session = lock(&shared.sse)
        .as_ref()
        .map(|client| client.session_id.clone());
    if let Some(expected) = sse_session {
        let provided = session_from_request(&headers, query.as_deref());
        if provided.as_deref() != Some(expected.as_str()) {
            return status_response(StatusCode::FORBIDDEN, "session id mismatch");
        }
    }

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            shared
                .state
                .handler()
                .error(TransportError::Serialization { source: e })
                .await;
            return status_response(StatusCode::BAD_REQUEST, "request body is not valid JSON");
        }
    };

    let session_id = shared.ensure_session();

    // Arm the inline-reply slot only for request-bearing messages in
    // streamable mode (no SSE client attached — with one attached, replies
    // belong on the SSE channel), and only if no other POST currently holds
    // the slot (inline-reply mode is serial).
    let is_request = value.get("method").is_some()
        && value.get("id").is_some_and(|id| !id.is_null());
    let inline_rx = if is_request && lock(&shared.sse).is_none() {
        let mut slot = lock(&shared.inline);
        if slot.is_none() {
            let (tx, rx) = oneshot::channel();
            *slot = Some(tx);
            Some(rx)
        } else {
            None
        }
    } else {
        None
    };

    trace!(session = %session_id, "HTTP POST message received");
    shared.state.handler().message_received(value).await;

    if let Some(mut rx) = inline_rx {
        // Disarm before inspecting so a late async send flows to SSE.
        lock(&shared.inline).take();
        if let Ok(reply) = rx.try_recv() {
            let body = serde_json::to_vec(&reply).unwrap_or_default();
            return Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .header(SESSION_HEADER, &session_id)
                .body(Body::from(body))
                .unwrap_or_default();
        }
    }

    Response::builder()
        .status(StatusCode::ACCEPTED)
        .header(SESSION_HEADER, &session_id)
        .body(Body::empty())
        .unwrap_or_default()
}

/// SSE route: open the single event stream for this transport
async fn handle_sse(State(shared): State<Arc<HttpShared>>, headers: HeaderMap) -> Response {
    if !shared.authorized(&headers) {
        return status_response(StatusCode::UNAUTHORIZED, "missing or invalid bearer token");
    }

    let accept_ok = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"));
    if !accept_ok {
        return status_response(StatusCode::NOT_ACCEPTABLE, "Accept must be text/event-stream");
    }

    let session_id = Uuid::new_v4().to_string();
    let (frames, rx) = mpsc::unbounded_channel::<String>();
    {
        let mut guard = lock(&shared.sse);
        if guard.is_some() {
            return status_response(StatusCode::CONFLICT, "an SSE client is already connected");
        }
        // Tell the client where to POST before anything else can flow.
        let _ = frames.send(endpoint_frame(&shared.config.post_path, &session_id));
        *guard = Some(SseClient {
            session_id: session_id.clone(),
            frames,
            next_event_id: AtomicU64::new(1),
        });
    }
    debug!(session = %session_id, "SSE client attached");

    let stream = SseStream {
        frames: UnboundedReceiverStream::new(rx),
        shared: Arc::clone(&shared),
        session_id: session_id.clone(),
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header(SESSION_HEADER, &session_id)
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(stream))
        .unwrap_or_default()
}

/// Frame stream feeding the SSE response body
///
/// Dropping the stream (client disconnect) clears the transport's SSE slot
/// so a new client can attach.
struct SseStream {
    frames: UnboundedReceiverStream<String>,
    shared: Arc<HttpShared>,
    session_id: String,
}

impl Stream for SseStream {
    type Item = Result<String, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.frames)
            .poll_next(cx)
            .map(|frame| frame.map(Ok))
    }
}

impl Drop for SseStream {
    fn drop(&mut self) {
        let mut guard = lock(&self.shared.sse);
        if guard
            .as_ref()
            .is_some_and(|client| client.session_id == self.session_id)
        {
            *guard = None;
            debug!(session = %self.session_id, "SSE client detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;

    struct NullEvents;

    #[async_trait]
    impl TransportEvents for NullEvents {
        async fn state_changed(&self, _old: TransportState, _new: TransportState) {}
        async fn message_received(&self, _value: Value) {}
        async fn error(&self, _error: TransportError) {}
    }

    fn shared_for_tests(config: HttpServerConfig) -> Arc<HttpShared> {
        Arc::new(HttpShared {
            config,
            state: Arc::new(StateCell::new(Arc::new(NullEvents), "http-sse")),
            snapshot: StateSnapshot::new(),
            sse: Mutex::new(None),
            inline: Mutex::new(None),
            streamable_session: Mutex::new(None),
        })
    }

    #[test]
    fn frame_formats() {
        assert_eq!(
            endpoint_frame("/", "abc-123"),
            "event: endpoint\ndata: /?sessionId=abc-123\n\n"
        );
        assert_eq!(
            message_frame(7, r#"{"jsonrpc":"2.0","method":"m"}"#),
            "id: 7\nevent: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"m\"}\n\n"
        );
    }

    #[test]
    fn bearer_auth_checks() {
        let shared = shared_for_tests(HttpServerConfig::localhost().with_auth_token("secret"));

        let mut headers = HeaderMap::new();
        assert!(!shared.authorized(&headers));

        headers.insert(header::AUTHORIZATION, "Bearer wrong".parse().unwrap());
        assert!(!shared.authorized(&headers));

        headers.insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        assert!(shared.authorized(&headers));

        let open = shared_for_tests(HttpServerConfig::localhost());
        assert!(open.authorized(&HeaderMap::new()));
    }

    #[test]
    fn session_extraction_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, "from-header".parse().unwrap());
        assert_eq!(
            session_from_request(&headers, Some("sessionId=from-query")),
            Some("from-header".to_string())
        );
        assert_eq!(
            session_from_request(&HeaderMap::new(), Some("sessionId=from-query")),
            Some("from-query".to_string())
        );
        assert_eq!(session_from_request(&HeaderMap::new(), None), None);
    }

    #[test]
    fn streamable_session_is_stable() {
        let shared = shared_for_tests(HttpServerConfig::localhost());
        let first = shared.ensure_session();
        let second = shared.ensure_session();
        assert_eq!(first, second);
        assert_eq!(shared.current_session(), Some(first));
    }

    #[test]
    fn event_ids_start_at_one() {
        let shared = shared_for_tests(HttpServerConfig::localhost());
        let (tx, _rx) = mpsc::unbounded_channel();
        *lock(&shared.sse) = Some(SseClient {
            session_id: "s".to_string(),
            frames: tx,
            next_event_id: AtomicU64::new(1),
        });
        assert_eq!(shared.next_event_id(), Some(1));
        assert_eq!(shared.next_event_id(), Some(2));
        assert_eq!(shared.next_event_id(), Some(3));
    }

    #[test]
    fn sse_send_clears_dead_client() {
        let shared = shared_for_tests(HttpServerConfig::localhost());
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&shared.sse) = Some(SseClient {
            session_id: "s".to_string(),
            frames: tx,
            next_event_id: AtomicU64::new(1),
        });
        drop(rx);
        assert!(shared.sse_send("frame".to_string()).is_err());
        assert!(lock(&shared.sse).is_none());
    }

    #[tokio::test]
    async fn builder_rejects_bad_paths() {
        let config = HttpServerConfig {
            post_path: "no-slash".to_string(),
            ..HttpServerConfig::localhost()
        };
        let result = HttpServerTransport::builder(config)
            .with_event_handler(Arc::new(NullEvents))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn send_without_client_fails_closed() {
        let mut transport = HttpServerTransport::builder(HttpServerConfig::localhost())
            .with_event_handler(Arc::new(NullEvents))
            .build()
            .unwrap();
        transport.connect().await.unwrap();

        let err = transport
            .send(JsonRpcMessage::notification("x", None))
            .await
            .unwrap_err();
        assert!(err.is_closed());

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn port_zero_yields_bound_addr() {
        let mut transport = HttpServerTransport::builder(HttpServerConfig::localhost())
            .with_event_handler(Arc::new(NullEvents))
            .build()
            .unwrap();
        assert!(transport.local_addr().is_none());
        transport.connect().await.unwrap();
        let addr = transport.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        transport.disconnect().await.unwrap();
        assert!(transport.local_addr().is_none());
    }

    #[tokio::test]
    async fn inline_slot_captures_reply() {
        let shared = shared_for_tests(HttpServerConfig::localhost());
        shared.snapshot.store(TransportState::Connected);
        let mut transport = HttpServerTransport {
            shared: Arc::clone(&shared),
            server_task: None,
            local_addr: None,
        };

        let (tx, mut rx) = oneshot::channel();
        *lock(&shared.inline) = Some(tx);

        let reply = JsonRpcMessage::response(serde_json::json!({"ok": true}), RequestId::new_number(1));
        transport.send(reply.clone()).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), reply);
        assert!(lock(&shared.inline).is_none());
    }
}
