//! Transport Layer
//!
//! The event-driven transport abstraction and its three implementations:
//! stdio (NDJSON), HTTP+SSE, and WebSocket.
//!
//! # Architecture
//!
//! A transport is a state machine over
//! `{Disconnected, Connecting, Connected, Disconnecting, Failed}` that moves
//! bytes and surfaces three observable events to a single consumer:
//!
//! - `state_changed(old, new)` on every (de-duplicated) transition
//! - `message_received(value)` for each framed JSON value, in arrival order
//! - `error(err)` for out-of-band failures
//!
//! Transports are constructed pre-wired to their consumer through
//! [`TransportBuilder::with_event_handler`]; the consumer is normally the
//! session, which classifies values into JSON-RPC messages and
//! demultiplexes them.
//!
//! Sends are serialized: given two overlapping `send` calls, their bytes on
//! the wire never interleave.

// Layer 1: Standard library imports
use std::fmt;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::trace;

// Layer 3: Internal module imports
use crate::protocol::JsonRpcMessage;

pub mod http;
pub mod stdio;
pub mod ws;

pub use http::{HttpServerConfig, HttpServerTransport};
pub use stdio::{StdioTransport, StdioTransportBuilder};
pub use ws::{WebSocketServerConfig, WebSocketServerTransport};

/// Transport connection states
///
/// Initial state is `Disconnected`. No state is terminal: `Failed` can
/// transition back through a new `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No underlying connection or listener
    Disconnected,
    /// `connect` in progress
    Connecting,
    /// Ready to send and receive
    Connected,
    /// `disconnect` in progress
    Disconnecting,
    /// A fatal error occurred; a new `connect` may recover
    Failed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Disconnected => "disconnected",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Disconnecting => "disconnecting",
            TransportState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection-related errors
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The connection was lost, or an operation ran after close
    #[error("Connection closed: {message}")]
    ConnectionClosed { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Message serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Authentication/authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Operation invalid in the current transport state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Generic transport errors
    #[error("Transport error: {message}")]
    Other { message: String },
}

impl TransportError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a connection-closed error
    pub fn closed(message: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a generic transport error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Whether this error means the connection is gone
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::ConnectionClosed { .. })
    }
}

/// Observer for transport events
///
/// A single consumer (the session) is sufficient for the core. Handlers run
/// on the transport's read path and must not block; anything long-running
/// belongs in a spawned task.
#[async_trait]
pub trait TransportEvents: Send + Sync {
    /// A state transition occurred (self-loops are never reported)
    async fn state_changed(&self, old: TransportState, new: TransportState);

    /// A framed JSON value arrived (not yet classified as JSON-RPC)
    async fn message_received(&self, value: Value);

    /// An out-of-band error occurred; the transport may still be usable
    async fn error(&self, error: TransportError);
}

/// Event-driven transport interface
///
/// Implementations own their underlying I/O resources and release them on
/// `disconnect`. All three concrete transports ship in this module; the
/// trait is public so embedders can bring their own.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the transport
    ///
    /// Transitions `Disconnected -> Connecting -> Connected` (or `Failed`).
    /// Calling in any state other than `Disconnected` or `Failed` is an
    /// `InvalidState` error.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Tear the transport down
    ///
    /// Transitions any state through `Disconnecting` to `Disconnected`.
    /// Idempotent: an already-disconnected transport returns `Ok` at once.
    /// Pending writes fail with `ConnectionClosed`.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Send a JSON-RPC message
    ///
    /// Permitted only in `Connected`. Returns once the message has been
    /// handed to the underlying framer, not after remote acknowledgement.
    async fn send(&mut self, message: JsonRpcMessage) -> Result<(), TransportError>;

    /// Current state of the transport FSM
    fn state(&self) -> TransportState;

    /// The locally bound address, for listener transports
    ///
    /// With `port` 0 in the configuration this is where the OS-assigned
    /// port shows up. Stream transports return `None`.
    fn local_addr(&self) -> Option<std::net::SocketAddr> {
        None
    }

    /// Static identifier for logging ("stdio", "http-sse", "websocket")
    fn transport_type(&self) -> &'static str;
}

/// Builder for creating pre-configured transports
///
/// The event handler must be attached before `build`; a built transport has
/// its consumer wired in and no post-hoc handler mutation exists.
pub trait TransportBuilder: Send {
    /// The transport type this builder creates
    type Transport: Transport + 'static;

    /// Attach the single event consumer
    fn with_event_handler(self, handler: Arc<dyn TransportEvents>) -> Self;

    /// Build the transport (not yet connected)
    fn build(self) -> Result<Self::Transport, TransportError>;
}

/// Shared state cell used by the concrete transports
///
/// Serializes transitions, suppresses self-loops, and forwards every real
/// transition to the event handler.
pub(crate) struct StateCell {
    state: Mutex<TransportState>,
    handler: Arc<dyn TransportEvents>,
    label: &'static str,
}

impl StateCell {
    pub(crate) fn new(handler: Arc<dyn TransportEvents>, label: &'static str) -> Self {
        Self {
            state: Mutex::new(TransportState::Disconnected),
            handler,
            label,
        }
    }

    pub(crate) async fn get(&self) -> TransportState {
        *self.state.lock().await
    }

    /// Transition to `new`, notifying the observer unless it is a self-loop
    pub(crate) async fn set(&self, new: TransportState) {
        let old = {
            let mut guard = self.state.lock().await;
            let old = *guard;
            if old == new {
                return;
            }
            *guard = new;
            old
        };
        trace!(transport = self.label, %old, %new, "transport state changed");
        self.handler.state_changed(old, new).await;
    }

    pub(crate) fn handler(&self) -> &Arc<dyn TransportEvents> {
        &self.handler
    }
}

/// Synchronous snapshot of a [`StateCell`] for `Transport::state`
///
/// The trait accessor is synchronous; transports keep a parallel atomic
/// snapshot updated alongside the cell.
#[derive(Clone)]
pub(crate) struct StateSnapshot(Arc<std::sync::atomic::AtomicU8>);

impl StateSnapshot {
    pub(crate) fn new() -> Self {
        Self(Arc::new(std::sync::atomic::AtomicU8::new(0)))
    }

    pub(crate) fn store(&self, state: TransportState) {
        let code = match state {
            TransportState::Disconnected => 0,
            TransportState::Connecting => 1,
            TransportState::Connected => 2,
            TransportState::Disconnecting => 3,
            TransportState::Failed => 4,
        };
        self.0.store(code, std::sync::atomic::Ordering::SeqCst);
    }

    pub(crate) fn load(&self) -> TransportState {
        match self.0.load(std::sync::atomic::Ordering::SeqCst) {
            1 => TransportState::Connecting,
            2 => TransportState::Connected,
            3 => TransportState::Disconnecting,
            4 => TransportState::Failed,
            _ => TransportState::Disconnected,
        }
    }
}

/// Lock a std mutex, recovering the guard if a holder panicked
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Check that `connect` is legal from the given state
pub(crate) fn check_connectable(state: TransportState) -> Result<(), TransportError> {
    match state {
        TransportState::Disconnected | TransportState::Failed => Ok(()),
        other => Err(TransportError::invalid_state(format!(
            "connect is not valid in state {other}"
        ))),
    }
}

/// Check that `send` is legal from the given state
pub(crate) fn check_sendable(state: TransportState) -> Result<(), TransportError> {
    if state == TransportState::Connected {
        Ok(())
    } else {
        Err(TransportError::invalid_state(format!(
            "send requires a connected transport (state is {other})",
            other = state
        )))
    }
}
