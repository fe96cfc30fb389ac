//! WebSocket Server Transport
//!
//! One JSON-RPC message per text frame, single-client model. Optional
//! Bearer-token auth and origin allow-list are enforced during the HTTP
//! upgrade handshake; a subprotocol allow-list is forwarded to the
//! negotiation. Binary frames are not part of the protocol and only produce
//! an `error` event.
//!
//! Keepalive uses protocol ping/pong: while a client is attached the
//! transport pings every `keepalive_interval` seconds, and a ping that is
//! still unanswered at the next tick closes the connection with
//! `ConnectionClosed`.

// Layer 1: Standard library imports
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

// Layer 3: Internal module imports
use super::{
    check_connectable, check_sendable, lock, StateCell, StateSnapshot, Transport,
    TransportBuilder, TransportError, TransportEvents, TransportState,
};
use crate::protocol::JsonRpcMessage;

/// Configuration for the WebSocket server transport
#[derive(Debug, Clone)]
pub struct WebSocketServerConfig {
    /// Interface to bind (default: all interfaces)
    pub host: String,
    /// Port to bind; 0 asks the OS for a free port
    pub port: u16,
    /// Route accepting upgrade requests
    pub path: String,
    /// Subprotocol allow-list offered during negotiation (empty = any)
    pub protocols: Vec<String>,
    /// Origin allow-list checked exactly (empty = any origin)
    pub origins: Vec<String>,
    /// Whether Bearer-token authentication is required
    pub require_auth: bool,
    /// The expected Bearer token when auth is enabled
    pub auth_token: Option<String>,
    /// Seconds between keepalive pings; 0 disables keepalive
    pub keepalive_interval: u64,
}

impl Default for WebSocketServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            path: "/".to_string(),
            protocols: Vec::new(),
            origins: Vec::new(),
            require_auth: false,
            auth_token: None,
            keepalive_interval: 30,
        }
    }
}

impl WebSocketServerConfig {
    /// Bind to localhost on an OS-assigned port (the common test setup)
    pub fn localhost() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            ..Default::default()
        }
    }

    /// Require `Authorization: Bearer <token>` on the upgrade request
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.require_auth = true;
        self.auth_token = Some(token.into());
        self
    }

    /// Restrict connections to the given origin
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origins.push(origin.into());
        self
    }
}

/// The attached WebSocket client, if any
struct WsClient {
    id: u64,
    outbound: mpsc::UnboundedSender<Message>,
    closed: CancellationToken,
}

/// State shared between the transport handle and the axum handlers
struct WsShared {
    config: WebSocketServerConfig,
    state: Arc<StateCell>,
    snapshot: StateSnapshot,
    client: Mutex<Option<WsClient>>,
    next_client_id: AtomicU64,
}

impl WsShared {
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

    fn origin_allowed(&self, headers: &HeaderMap) -> bool {
        if self.config.origins.is_empty() {
            return true;
        }
        headers
            .get(header::ORIGIN)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|origin| self.config.origins.iter().any(|allowed| allowed == origin))
    }

    /// Claim the single client slot; `None` if another client holds it
    fn try_claim(
        &self,
        outbound: mpsc::UnboundedSender<Message>,
    ) -> Option<(u64, CancellationToken)> {
        let mut guard = lock(&self.client);
        if guard.is_some() {
            return None;
        }
        let id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        let closed = CancellationToken::new();
        *guard = Some(WsClient {
            id,
            outbound,
            closed: closed.clone(),
        });
        Some((id, closed))
    }

    /// Clear the slot, but only if the given connection still owns it
    fn release(&self, id: u64) {
        let mut guard = lock(&self.client);
        if guard.as_ref().is_some_and(|client| client.id == id) {
            *guard = None;
        }
    }
}

/// WebSocket server transport
pub struct WebSocketServerTransport {
    shared: Arc<WsShared>,
    server_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl WebSocketServerTransport {
    /// Builder carrying the given configuration
    pub fn builder(config: WebSocketServerConfig) -> WebSocketServerTransportBuilder {
        WebSocketServerTransportBuilder {
            config,
            handler: None,
        }
    }

    async fn transition(&self, state: TransportState) {
        self.shared.snapshot.store(state);
        self.shared.state.set(state).await;
    }
}

/// Builder for [`WebSocketServerTransport`]
pub struct WebSocketServerTransportBuilder {
    config: WebSocketServerConfig,
    handler: Option<Arc<dyn TransportEvents>>,
}

impl TransportBuilder for WebSocketServerTransportBuilder {
    type Transport = WebSocketServerTransport;

    fn with_event_handler(mut self, handler: Arc<dyn TransportEvents>) -> Self {
        self.handler = Some(handler);
        self
    }

    fn build(self) -> Result<WebSocketServerTransport, TransportError> {
        let handler = self.handler.ok_or_else(|| {
            TransportError::connection("no event handler configured for WebSocket transport")
        })?;
        if !self.config.path.starts_with('/') {
            return Err(TransportError::connection(
                "WebSocket route path must start with '/'",
            ));
        }
        let snapshot = StateSnapshot::new();
        Ok(WebSocketServerTransport {
            shared: Arc::new(WsShared {
                config: self.config,
                state: Arc::new(StateCell::new(handler, "websocket")),
                snapshot,
                client: Mutex::new(None),
                next_client_id: AtomicU64::new(1),
            }),
            server_task: None,
            local_addr: None,
        })
    }
}

#[async_trait]
impl Transport for WebSocketServerTransport {
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

        let router = Router::new()
            .route(&self.shared.config.path, get(handle_upgrade))
            .with_state(Arc::clone(&self.shared));

        self.server_task = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                warn!(error = %e, "WebSocket server terminated");
            }
        }));

        self.transition(TransportState::Connected).await;
        debug!(addr = ?self.local_addr, "WebSocket transport listening");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.shared.snapshot.load() == TransportState::Disconnected {
            return Ok(());
        }
        self.transition(TransportState::Disconnecting).await;

        if let Some(client) = lock(&self.shared.client).take() {
            client.closed.cancel();
        }
        if let Some(task) = self.server_task.take() {
            task.abort();
            let _ = task.await;
        }
        self.local_addr = None;

        self.transition(TransportState::Disconnected).await;
        debug!("WebSocket transport stopped");
        Ok(())
    }

    async fn send(&mut self, message: JsonRpcMessage) -> Result<(), TransportError> {
        check_sendable(self.shared.snapshot.load())?;
        let json = serde_json::to_string(&message)?;

        let guard = lock(&self.shared.client);
        let client = guard
            .as_ref()
            .ok_or_else(|| TransportError::closed("no client connected to deliver message"))?;
        client
            .outbound
            .send(Message::Text(json.into()))
            .map_err(|_| TransportError::closed("WebSocket client went away"))
    }

    fn state(&self) -> TransportState {
        self.shared.snapshot.load()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn transport_type(&self) -> &'static str {
        "websocket"
    }
}

/// Upgrade route: auth and origin are checked before the handshake completes
async fn handle_upgrade(
    State(shared): State<Arc<WsShared>>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
) -> Response {
    if !shared.authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing or invalid bearer token").into_response();
    }
    if !shared.origin_allowed(&headers) {
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }
    if lock(&shared.client).is_some() {
        return (StatusCode::CONFLICT, "a client is already connected").into_response();
    }

    let mut ws = ws;
    if !shared.config.protocols.is_empty() {
        ws = ws.protocols(shared.config.protocols.clone());
    }
    ws.on_upgrade(move |socket| serve_socket(shared, socket))
}

/// Per-connection loop: read frames, run keepalive, drain outbound queue
async fn serve_socket(shared: Arc<WsShared>, socket: WebSocket) {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let Some((client_id, closed)) = shared.try_claim(outbound_tx.clone()) else {
        // Lost the race against another upgrade
        drop(socket);
        return;
    };
    debug!("WebSocket client attached");

    let (mut sink, mut stream) = socket.split();
    let last_pong = Arc::new(Mutex::new(Instant::now()));

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let keepalive = if shared.config.keepalive_interval > 0 {
        Some(tokio::spawn(keepalive_loop(
            outbound_tx,
            Arc::clone(&last_pong),
            Duration::from_secs(shared.config.keepalive_interval),
            closed.clone(),
        )))
    } else {
        None
    };

    let handler = Arc::clone(shared.state.handler());
    loop {
        tokio::select! {
            _ = closed.cancelled() => {
                // Keepalive missed a pong, or the transport is shutting down
                handler
                    .error(TransportError::closed("connection closed"))
                    .await;
                break;
            }
            frame = stream.next() => {
                match frame {
                    None | Some(Ok(Message::Close(_))) => {
                        handler
                            .error(TransportError::closed("client disconnected"))
                            .await;
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Value>(text.as_str()) {
                            Ok(value) => {
                                trace!("WebSocket frame received");
                                handler.message_received(value).await;
                            }
                            Err(e) => {
                                handler
                                    .error(TransportError::Serialization { source: e })
                                    .await;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        handler
                            .error(TransportError::other("binary frames are not supported"))
                            .await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        *lock(&last_pong) = Instant::now();
                    }
                    // Client pings are answered by the protocol layer
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Err(e)) => {
                        handler
                            .error(TransportError::other(format!("WebSocket error: {e}")))
                            .await;
                        break;
                    }
                }
            }
        }
    }

    closed.cancel();
    if let Some(task) = keepalive {
        let _ = task.await;
    }
    writer.abort();
    let _ = writer.await;
    shared.release(client_id);
    debug!("WebSocket client detached");
}

/// Ping on every tick; a ping still unanswered at the next tick is fatal
async fn keepalive_loop(
    outbound: mpsc::UnboundedSender<Message>,
    last_pong: Arc<Mutex<Instant>>,
    interval: Duration,
    closed: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // immediate first tick carries no information
    let mut last_ping: Option<Instant> = None;
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            _ = ticker.tick() => {
                if let Some(ping_at) = last_ping {
                    if *lock(&last_pong) < ping_at {
                        closed.cancel();
                        break;
                    }
                }
                if outbound.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                last_ping = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullEvents;

    #[async_trait]
    impl TransportEvents for NullEvents {
        async fn state_changed(&self, _old: TransportState, _new: TransportState) {}
        async fn message_received(&self, _value: Value) {}
        async fn error(&self, _error: TransportError) {}
    }

    fn shared_for_tests(config: WebSocketServerConfig) -> Arc<WsShared> {
        Arc::new(WsShared {
            config,
            state: Arc::new(StateCell::new(Arc::new(NullEvents), "websocket")),
            snapshot: StateSnapshot::new(),
            client: Mutex::new(None),
            next_client_id: AtomicU64::new(1),
        })
    }

    #[test]
    fn origin_allow_list() {
        let open = shared_for_tests(WebSocketServerConfig::localhost());
        assert!(open.origin_allowed(&HeaderMap::new()));

        let restricted = shared_for_tests(
            WebSocketServerConfig::localhost().with_origin("https://app.example"),
        );
        assert!(!restricted.origin_allowed(&HeaderMap::new()));

        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, "https://evil.example".parse().unwrap());
        assert!(!restricted.origin_allowed(&headers));

        headers.insert(header::ORIGIN, "https://app.example".parse().unwrap());
        assert!(restricted.origin_allowed(&headers));
    }

    #[test]
    fn bearer_auth_checks() {
        let shared =
            shared_for_tests(WebSocketServerConfig::localhost().with_auth_token("secret"));
        let mut headers = HeaderMap::new();
        assert!(!shared.authorized(&headers));
        headers.insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        assert!(shared.authorized(&headers));
    }

    #[test]
    fn single_client_slot() {
        let shared = shared_for_tests(WebSocketServerConfig::localhost());
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let (first_id, _token) = shared.try_claim(tx1).unwrap();
        assert!(shared.try_claim(tx2).is_none());

        // A stale connection id cannot clear the slot
        shared.release(first_id + 1);
        let (tx3, _rx3) = mpsc::unbounded_channel();
        assert!(shared.try_claim(tx3).is_none());

        shared.release(first_id);
        let (tx4, _rx4) = mpsc::unbounded_channel();
        assert!(shared.try_claim(tx4).is_some());
    }

    #[tokio::test]
    async fn send_without_client_fails_closed() {
        let mut transport = WebSocketServerTransport::builder(WebSocketServerConfig::localhost())
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
    async fn keepalive_detects_missing_pong() {
        tokio::time::pause();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let last_pong = Arc::new(Mutex::new(Instant::now()));
        let closed = CancellationToken::new();
        let task = tokio::spawn(keepalive_loop(
            tx,
            last_pong,
            Duration::from_secs(5),
            closed.clone(),
        ));

        // First tick pings, second tick notices the silence
        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert!(matches!(rx.recv().await, Some(Message::Ping(_))));
        tokio::time::advance(Duration::from_secs(5)).await;

        task.await.unwrap();
        assert!(closed.is_cancelled());
    }

    #[tokio::test]
    async fn keepalive_survives_when_pongs_arrive() {
        tokio::time::pause();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let last_pong = Arc::new(Mutex::new(Instant::now()));
        let closed = CancellationToken::new();
        let task = tokio::spawn(keepalive_loop(
            tx,
            Arc::clone(&last_pong),
            Duration::from_secs(5),
            closed.clone(),
        ));

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(5)).await;
            tokio::task::yield_now().await;
            assert!(matches!(rx.recv().await, Some(Message::Ping(_))));
            *lock(&last_pong) = Instant::now();
        }
        assert!(!closed.is_cancelled());

        closed.cancel();
        task.await.unwrap();
    }
}
