//! Request Correlation
//!
//! Outbound request-id generation and the pending-request table that pairs
//! responses back up with their waiting callers. Correlation is purely by
//! id, never by order.
//!
//! Entries are owned by the session and destroyed when resolved, cancelled,
//! or the transport disconnects; each id resolves at most once.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU64, Ordering};

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, trace};

// Layer 3: Internal module imports
use crate::integration::error::{McpError, McpResult};
use crate::protocol::RequestId;

/// Generator for session-unique outbound request ids
///
/// Monotonic counter plus a random suffix: the counter guarantees
/// uniqueness within the session, the suffix keeps ids from colliding
/// across sessions that share a wire capture.
#[derive(Debug)]
pub struct RequestIdGenerator {
    counter: AtomicU64,
    suffix: String,
}

impl RequestIdGenerator {
    /// Create a generator with a fresh random suffix
    pub fn new() -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            counter: AtomicU64::new(1),
            suffix: suffix[..8].to_string(),
        }
    }

    /// Allocate the next request id
    pub fn next_id(&self) -> RequestId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        RequestId::new_string(format!("{n}-{suffix}", suffix = self.suffix))
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// One in-flight outbound request
pub struct PendingRequest {
    /// Completion handle for the waiting caller
    sender: oneshot::Sender<McpResult<serde_json::Value>>,
    /// Method name, kept for diagnostics
    method: String,
    /// When the request was registered
    registered_at: DateTime<Utc>,
}

impl PendingRequest {
    fn new(sender: oneshot::Sender<McpResult<serde_json::Value>>, method: &str) -> Self {
        Self {
            sender,
            method: method.to_string(),
            registered_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("method", &self.method)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// Table of in-flight outbound requests keyed by id
///
/// Resolution removes the entry first, so a second response for the same id
/// finds nothing and is discarded — at-most-once delivery to the caller.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: DashMap<RequestId, PendingRequest>,
}

impl PendingRequests {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register a request, returning the receiver its response arrives on
    pub fn register(
        &self,
        id: RequestId,
        method: &str,
    ) -> oneshot::Receiver<McpResult<serde_json::Value>> {
        let (sender, receiver) = oneshot::channel();
        trace!(%id, method, "registering pending request");
        self.entries.insert(id, PendingRequest::new(sender, method));
        receiver
    }

    /// Resolve the entry for `id` with the given outcome
    ///
    /// Returns `false` when no entry exists (unknown id, duplicate response,
    /// or a cancelled request) — the outcome is discarded in that case.
    pub fn resolve(&self, id: &RequestId, outcome: McpResult<serde_json::Value>) -> bool {
        match self.entries.remove(id) {
            Some((_, pending)) => {
                trace!(%id, method = %pending.method, "resolving pending request");
                // A dropped receiver means the caller stopped waiting
                let _ = pending.sender.send(outcome);
                true
            }
            None => {
                debug!(%id, "discarding response for unknown request id");
                false
            }
        }
    }

    /// Drop the entry for `id` without resolving it (cancellation)
    pub fn remove(&self, id: &RequestId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Fail every in-flight request with `ConnectionClosed`
    ///
    /// Used when the transport disconnects; each pending request fails
    /// exactly once.
    pub fn fail_all(&self, reason: &str) {
        let ids: Vec<RequestId> = self.entries.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, pending)) = self.entries.remove(&id) {
                debug!(%id, method = %pending.method, "failing pending request: {reason}");
                let _ = pending.sender.send(Err(McpError::connection_closed(reason)));
            }
        }
    }

    /// Number of in-flight requests
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
