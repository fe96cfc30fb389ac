//! Session Layer
//!
//! A [`Session`] is one client-server connection: it owns the transport,
//! allocates request ids, keeps the pending-request table, orchestrates the
//! initialize handshake state, and demultiplexes inbound traffic.
//!
//! Inbound demultiplex on `message_received`:
//!
//! - **Request** (has id + method): routed through the role's
//!   [`InboundDispatcher`]; the produced response or error response is sent
//!   back through the transport.
//! - **Response / Error response**: resolves the matching pending entry.
//!   Unknown ids are logged and discarded.
//! - **Notification**: flips the session to `Initialized` on
//!   `notifications/initialized`, then reaches the dispatcher and the
//!   broadcast fan-out.
//!
//! Outbound requests are gated: before the session is `Initialized`, only
//! `initialize` may be sent, and a gated request writes no bytes.

// Layer 1: Standard library imports
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

// Layer 3: Internal module imports
use crate::correlation::{PendingRequests, RequestIdGenerator};
use crate::integration::error::{McpError, McpResult};
use crate::protocol::{
    methods, notifications, CancelledNotification, JsonRpcErrorResponse, JsonRpcMessage,
    JsonRpcNotification, JsonRpcRequest, RequestId,
};
use crate::transport::{
    Transport, TransportBuilder, TransportError, TransportEvents, TransportState,
};

/// Notification fan-out buffer; slow subscribers miss older entries
const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport attached or the transport is gone
    Disconnected,
    /// Transport connected, initialize handshake not yet complete
    Initializing,
    /// Handshake complete; normal traffic is permitted
    Initialized,
    /// Teardown in progress
    Disconnecting,
}

/// Role-specific inbound dispatch
///
/// The capability interface between the session and its role (server or
/// client): handle an inbound request, handle an inbound notification.
#[async_trait]
pub trait InboundDispatcher: Send + Sync {
    /// Handle an inbound request and produce its result value
    ///
    /// An `Err` becomes a JSON-RPC error response; it is never raised
    /// locally once the error response has been sent.
    async fn handle_request(&self, request: JsonRpcRequest) -> McpResult<Value>;

    /// Handle an inbound notification; no reply exists
    async fn handle_notification(&self, notification: JsonRpcNotification);
}

/// Atomic session-state flag
struct StateFlag(AtomicU8);

impl StateFlag {
    fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    fn store(&self, state: SessionState) {
        let code = match state {
            SessionState::Disconnected => 0,
            SessionState::Initializing => 1,
            SessionState::Initialized => 2,
            SessionState::Disconnecting => 3,
        };
        self.0.store(code, Ordering::SeqCst);
    }

    fn load(&self) -> SessionState {
        match self.0.load(Ordering::SeqCst) {
            1 => SessionState::Initializing,
            2 => SessionState::Initialized,
            3 => SessionState::Disconnecting,
            _ => SessionState::Disconnected,
        }
    }
}

struct SessionInner {
    /// The transport, serialized behind a lock so sends never interleave
    transport: Mutex<Option<Box<dyn Transport>>>,
    pending: PendingRequests,
    id_generator: RequestIdGenerator,
    state: StateFlag,
    dispatcher: Arc<dyn InboundDispatcher>,
    notifications_tx: broadcast::Sender<JsonRpcNotification>,
}

impl SessionInner {
    async fn send(&self, message: JsonRpcMessage) -> McpResult<()> {
        let mut guard = self.transport.lock().await;
        let transport = guard
            .as_mut()
            .ok_or_else(|| McpError::connection_closed("no transport attached"))?;
        transport.send(message).await.map_err(Into::into)
    }

    fn on_connection_lost(&self, reason: &str) {
        self.pending.fail_all(reason);
        self.state.store(SessionState::Disconnected);
    }

    /// Classify and route one inbound JSON value
    async fn demux(&self, value: Value) {
        // Salvage the id up front so classification failures can still be
        // answered with a correlated error response.
        let salvaged_id: Option<RequestId> = value
            .get("id")
            .and_then(|id| serde_json::from_value(id.clone()).ok());

        let message = match JsonRpcMessage::classify(value) {
            Ok(message) => message,
            Err(error) => {
                warn!(error = %error, "inbound message failed classification");
                let reply = JsonRpcErrorResponse::from_error(&error, salvaged_id);
                if let Err(e) = self.send(JsonRpcMessage::Error(reply)).await {
                    debug!(error = %e, "could not deliver classification error");
                }
                return;
            }
        };

        match message {
            JsonRpcMessage::Request(request) => {
                let id = request.id.clone();
                let method = request.method.clone();
                trace!(%id, method, "dispatching inbound request");
                let reply = match self.dispatcher.handle_request(request).await {
                    Ok(result) => JsonRpcMessage::response(result, id),
                    Err(error) => JsonRpcMessage::error(error.to_error_object(), Some(id)),
                };
                if let Err(e) = self.send(reply).await {
                    warn!(error = %e, method, "failed to deliver response");
                }
            }
            JsonRpcMessage::Response(response) => {
                self.pending.resolve(&response.id, Ok(response.result));
            }
            JsonRpcMessage::Error(error) => match error.id {
                Some(id) => {
                    self.pending
                        .resolve(&id, Err(McpError::from_error_object(error.error)));
                }
                None => {
                    warn!(code = error.error.code, "peer reported an uncorrelated error");
                }
            },
            JsonRpcMessage::Notification(notification) => {
                if notification.method == notifications::INITIALIZED {
                    debug!("peer completed the initialize handshake");
                    self.state.store(SessionState::Initialized);
                }
                self.dispatcher.handle_notification(notification.clone()).await;
                let _ = self.notifications_tx.send(notification);
            }
        }
    }
}

/// Transport event consumer bridging into the session
///
/// Holds a weak reference: once the session is dropped, late transport
/// events fall on the floor instead of keeping it alive.
struct SessionEventHandler {
    inner: Weak<SessionInner>,
}

#[async_trait]
impl TransportEvents for SessionEventHandler {
    async fn state_changed(&self, old: TransportState, new: TransportState) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        trace!(%old, %new, "session observed transport transition");
        if matches!(new, TransportState::Disconnected | TransportState::Failed)
            && inner.state.load() != SessionState::Disconnecting
        {
            inner.on_connection_lost("transport disconnected");
        }
    }

    async fn message_received(&self, value: Value) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        inner.demux(value).await;
    }

    async fn error(&self, error: TransportError) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if error.is_closed() && inner.state.load() != SessionState::Disconnecting {
            inner.on_connection_lost("transport closed");
        } else {
            debug!(error = %error, "transport reported a non-fatal error");
        }
    }
}

/// One initialized client-server connection
///
/// Cheap to clone; all clones share the same connection state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Build the transport, wire this session in as its event consumer,
    /// and connect
    pub async fn establish<B>(
        builder: B,
        dispatcher: Arc<dyn InboundDispatcher>,
    ) -> McpResult<Self>
    where
        B: TransportBuilder,
    {
        let (notifications_tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let inner = Arc::new(SessionInner {
            transport: Mutex::new(None),
            pending: PendingRequests::new(),
            id_generator: RequestIdGenerator::new(),
            state: StateFlag::new(),
            dispatcher,
            notifications_tx,
        });

        let handler: Arc<dyn TransportEvents> = Arc::new(SessionEventHandler {
            inner: Arc::downgrade(&inner),
        });
        let transport = builder.with_event_handler(handler).build()?;

        // Store before connecting so inbound dispatch always finds the
        // transport when it needs to reply.
        *inner.transport.lock().await = Some(Box::new(transport));
        {
            let mut guard = inner.transport.lock().await;
            if let Some(transport) = guard.as_mut() {
                transport.connect().await?;
            }
        }
        inner.state.store(SessionState::Initializing);

        Ok(Self { inner })
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.inner.state.load()
    }

    /// Mark the handshake complete (client role, after
    /// `notifications/initialized` has been sent)
    pub fn mark_initialized(&self) {
        self.inner.state.store(SessionState::Initialized);
    }

    /// The transport's locally bound address, if it is a listener
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .transport
            .lock()
            .await
            .as_ref()
            .and_then(|transport| transport.local_addr())
    }

    /// Issue a correlated request and await its result
    pub async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        self.request_with_options(method, params, None).await
    }

    /// Issue a correlated request with an optional cancellation token
    ///
    /// Cancellation removes the pending entry, emits
    /// `notifications/cancelled` with the request id, and resolves the
    /// caller with [`McpError::Cancelled`]; a late response for the id is
    /// discarded.
    pub async fn request_with_options(
        &self,
        method: &str,
        params: Option<Value>,
        cancel: Option<CancellationToken>,
    ) -> McpResult<Value> {
        let state = self.state();
        if method != methods::INITIALIZE && state != SessionState::Initialized {
            return Err(McpError::not_initialized(format!(
                "cannot send {method} before the session is initialized"
            )));
        }

        let id = self.inner.id_generator.next_id();
        let receiver = self.inner.pending.register(id.clone(), method);
        let request = JsonRpcMessage::request(method, params, id.clone());

        if let Err(error) = self.inner.send(request).await {
            self.inner.pending.remove(&id);
            return Err(error);
        }

        match cancel {
            None => receiver
                .await
                .map_err(|_| McpError::connection_closed("session closed"))?,
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        self.inner.pending.remove(&id);
                        let params = CancelledNotification {
                            request_id: id,
                            reason: Some("client cancelled".to_string()),
                        };
                        let _ = self
                            .notify(notifications::CANCELLED, serde_json::to_value(params).ok())
                            .await;
                        Err(McpError::cancelled(method))
                    }
                    outcome = receiver => outcome
                        .map_err(|_| McpError::connection_closed("session closed"))?,
                }
            }
        }
    }

    /// Send a one-way notification
    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.inner
            .send(JsonRpcMessage::notification(method, params))
            .await
    }

    /// Subscribe to inbound notifications
    pub fn notifications(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.inner.notifications_tx.subscribe()
    }

    /// Number of in-flight outbound requests
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Tear the session down
    ///
    /// Disconnects the transport and fails every pending request exactly
    /// once with `ConnectionClosed`.
    pub async fn disconnect(&self) -> McpResult<()> {
        self.inner.state.store(SessionState::Disconnecting);
        let result = {
            let mut guard = self.inner.transport.lock().await;
            match guard.as_mut() {
                Some(transport) => transport.disconnect().await.map_err(Into::into),
                None => Ok(()),
            }
        };
        self.inner.pending.fail_all("session disconnected");
        self.inner.state.store(SessionState::Disconnected);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StdioTransportBuilder;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// Dispatcher that echoes the method name back as the result
    struct EchoDispatcher;

    #[async_trait]
    impl InboundDispatcher for EchoDispatcher {
        async fn handle_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
            if request.method == "fail/always" {
                return Err(McpError::method_not_found(request.method));
            }
            Ok(json!({"echo": request.method}))
        }

        async fn handle_notification(&self, _notification: JsonRpcNotification) {}
    }

    struct Harness {
        session: Session,
        remote_read: BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>,
        remote_write: tokio::io::WriteHalf<tokio::io::DuplexStream>,
    }

    /// Session wired to an in-memory wire; the test drives the remote end
    async fn harness() -> Harness {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let (read, write) = tokio::io::split(local);
        let builder = StdioTransportBuilder::with_streams(BufReader::new(read), write);
        let session = Session::establish(builder, Arc::new(EchoDispatcher))
            .await
            .unwrap();
        let (remote_read, remote_write) = tokio::io::split(remote);
        Harness {
            session,
            remote_read: BufReader::new(remote_read),
            remote_write,
        }
    }

    async fn read_wire_value(
        reader: &mut BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>,
    ) -> Value {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(line.trim()).unwrap()
    }

    #[tokio::test]
    async fn gated_request_writes_no_bytes() {
        let mut h = harness().await;
        assert_eq!(h.session.state(), SessionState::Initializing);

        let err = h.session.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::NotInitialized { .. }));
        assert_eq!(h.session.pending_requests(), 0);

        // Prove the wire stayed silent: an initialize request is the first
        // thing the remote ever sees.
        let session = h.session.clone();
        tokio::spawn(async move {
            let _ = session.request(methods::INITIALIZE, Some(json!({}))).await;
        });
        let first = read_wire_value(&mut h.remote_read).await;
        assert_eq!(first["method"], "initialize");
    }

    #[tokio::test]
    async fn request_resolves_by_id() {
        let mut h = harness().await;
        h.session.mark_initialized();

        let session = h.session.clone();
        let pending = tokio::spawn(async move { session.request("tools/list", None).await });

        let request = read_wire_value(&mut h.remote_read).await;
        let id = request["id"].clone();
        let reply = json!({"jsonrpc": "2.0", "id": id, "result": {"tools": []}});
        h.remote_write
            .write_all(format!("{reply}\n").as_bytes())
            .await
            .unwrap();

        let result = pending.await.unwrap().unwrap();
        assert_eq!(result["tools"], json!([]));
        assert_eq!(h.session.pending_requests(), 0);
    }

    #[tokio::test]
    async fn error_response_resolves_with_typed_error() {
        let mut h = harness().await;
        h.session.mark_initialized();

        let session = h.session.clone();
        let pending = tokio::spawn(async move { session.request("tools/call", None).await });

        let request = read_wire_value(&mut h.remote_read).await;
        let reply = json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": -32601, "message": "no such tool"}
        });
        h.remote_write
            .write_all(format!("{reply}\n").as_bytes())
            .await
            .unwrap();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::MethodNotFound { .. }));
    }

    #[tokio::test]
    async fn inbound_request_is_dispatched_and_answered() {
        let mut h = harness().await;

        let request = json!({"jsonrpc": "2.0", "id": 7, "method": "anything"});
        h.remote_write
            .write_all(format!("{request}\n").as_bytes())
            .await
            .unwrap();

        let reply = read_wire_value(&mut h.remote_read).await;
        assert_eq!(reply["id"], 7);
        assert_eq!(reply["result"]["echo"], "anything");
    }

    #[tokio::test]
    async fn dispatcher_error_becomes_error_response() {
        let mut h = harness().await;

        let request = json!({"jsonrpc": "2.0", "id": 8, "method": "fail/always"});
        h.remote_write
            .write_all(format!("{request}\n").as_bytes())
            .await
            .unwrap();

        let reply = read_wire_value(&mut h.remote_read).await;
        assert_eq!(reply["id"], 8);
        assert_eq!(reply["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn invalid_message_gets_error_response() {
        let mut h = harness().await;

        // Valid JSON, invalid JSON-RPC: bare id with neither result nor error
        h.remote_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":3}\n")
            .await
            .unwrap();

        let reply = read_wire_value(&mut h.remote_read).await;
        assert_eq!(reply["error"]["code"], -32600);
        assert_eq!(reply["id"], 3);
    }

    #[tokio::test]
    async fn notifications_fan_out() {
        let mut h = harness().await;
        let mut subscriber = h.session.notifications();

        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notifications/resources/updated",
            "params": {"uri": "file:///x"}
        });
        h.remote_write
            .write_all(format!("{notification}\n").as_bytes())
            .await
            .unwrap();

        let received = subscriber.recv().await.unwrap();
        assert_eq!(received.method, "notifications/resources/updated");
    }

    #[tokio::test]
    async fn initialized_notification_flips_state() {
        let mut h = harness().await;
        assert_eq!(h.session.state(), SessionState::Initializing);

        let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        h.remote_write
            .write_all(format!("{notification}\n").as_bytes())
            .await
            .unwrap();

        // Wait for the demux to run
        let mut subscriber = h.session.notifications();
        h.remote_write
            .write_all(
                format!("{}\n", json!({"jsonrpc": "2.0", "method": "noop"})).as_bytes(),
            )
            .await
            .unwrap();
        let _ = subscriber.recv().await;
        assert_eq!(h.session.state(), SessionState::Initialized);
    }

    #[tokio::test]
    async fn cancellation_emits_cancelled_notification() {
        let mut h = harness().await;
        h.session.mark_initialized();

        let token = CancellationToken::new();
        let session = h.session.clone();
        let request_token = token.clone();
        let pending = tokio::spawn(async move {
            session
                .request_with_options("tools/call", None, Some(request_token))
                .await
        });

        let request = read_wire_value(&mut h.remote_read).await;
        let id = request["id"].clone();

        token.cancel();
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::Cancelled { .. }));
        assert_eq!(h.session.pending_requests(), 0);

        let cancelled = read_wire_value(&mut h.remote_read).await;
        assert_eq!(cancelled["method"], "notifications/cancelled");
        assert_eq!(cancelled["params"]["requestId"], id);

        // The late response for the cancelled id is discarded quietly
        let late = json!({"jsonrpc": "2.0", "id": id, "result": {}});
        h.remote_write
            .write_all(format!("{late}\n").as_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn disconnect_fails_pending_requests() {
        let mut h = harness().await;
        h.session.mark_initialized();

        let session = h.session.clone();
        let pending = tokio::spawn(async move { session.request("tools/list", None).await });

        // Make sure the request is on the wire before tearing down
        let _ = read_wire_value(&mut h.remote_read).await;
        h.session.disconnect().await.unwrap();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::ConnectionClosed { .. }));
        assert_eq!(h.session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn peer_eof_fails_pending_requests() {
        let mut h = harness().await;
        h.session.mark_initialized();

        let session = h.session.clone();
        let pending = tokio::spawn(async move { session.request("tools/list", None).await });
        let _ = read_wire_value(&mut h.remote_read).await;

        drop(h.remote_write);
        drop(h.remote_read);

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::ConnectionClosed { .. }));
    }
}
