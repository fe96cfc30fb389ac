//! JSON-RPC 2.0 Message Implementation
//!
//! This module provides the JSON-RPC 2.0 message types with shared
//! serialization behavior through a trait, and the classification parser
//! that sorts an incoming JSON value into exactly one of the four message
//! shapes (request, response, error response, notification).
//!
//! # Examples
//!
//! ```rust
//! use strand_mcp::protocol::{JsonRpcRequest, JsonRpcMessageTrait, RequestId};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new(
//!     "ping",
//!     Some(json!({"message": "hello"})),
//!     RequestId::new_string("req-123")
//! );
//!
//! let json = request.to_json().unwrap();
//! let parsed = JsonRpcRequest::from_json(&json).unwrap();
//! assert_eq!(request, parsed);
//! ```

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// Layer 3: Internal module imports
use super::errors::{JsonRpcError, JsonRpcErrorObject};

/// The JSON-RPC protocol version string carried by every message
pub const JSONRPC_VERSION: &str = "2.0";

/// Request ID supporting both string and numeric formats per JSON-RPC 2.0
///
/// The specification allows request IDs to be strings, numbers, or null.
/// This enum supports string and numeric variants; a null ID (used only by
/// error responses to parse failures) is represented as `Option<RequestId>`.
///
/// # Examples
///
/// ```rust
/// use strand_mcp::protocol::RequestId;
///
/// let string_id = RequestId::String("req-123".to_string());
/// let numeric_id = RequestId::Number(42);
///
/// // Serialization preserves the original format
/// assert_eq!(serde_json::to_string(&string_id).unwrap(), r#""req-123""#);
/// assert_eq!(serde_json::to_string(&numeric_id).unwrap(), "42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String-based request identifier
    String(String),
    /// Numeric request identifier
    Number(i64),
}

impl RequestId {
    /// Create a new string-based request ID
    pub fn new_string(id: impl Into<String>) -> Self {
        RequestId::String(id.into())
    }

    /// Create a new numeric request ID
    pub fn new_number(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Trait for JSON-RPC message serialization and deserialization
///
/// Provides common functionality for all message types, ensuring consistent
/// serialization behavior. Any type that implements `Serialize + Deserialize`
/// gets the default implementations.
pub trait JsonRpcMessageTrait: Serialize + for<'de> Deserialize<'de> {
    /// Serialize this message to a JSON string
    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize this message to pretty-printed JSON (debugging, logging)
    fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from a JSON string
    fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize directly into a buffer, avoiding the intermediate `String`
    fn serialize_to_buffer(&self, buffer: &mut BytesMut) -> Result<(), serde_json::Error> {
        serde_json::to_writer(buffer.writer(), self)
    }

    /// Serialize this message to bytes
    fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        let mut buffer = BytesMut::with_capacity(256);
        self.serialize_to_buffer(&mut buffer)?;
        Ok(buffer.freeze())
    }

    /// Deserialize a message from JSON bytes
    fn from_json_bytes(json: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(json)
    }
}

/// JSON-RPC 2.0 Request Message
///
/// Represents a request to invoke a method on the remote peer. The `id`
/// distinguishes a request from a notification and correlates the eventual
/// response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    /// Protocol version - always "2.0"
    pub jsonrpc: String,

    /// Name of the method to invoke
    pub method: String,

    /// Parameters for the method (object or array)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Unique identifier for this request
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

impl JsonRpcMessageTrait for JsonRpcRequest {}

/// JSON-RPC 2.0 Success Response Message
///
/// Carries the `result` of a completed request. Failed requests are carried
/// by [`JsonRpcErrorResponse`] instead; the two shapes are mutually
/// exclusive on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    /// Protocol version - always "2.0"
    pub jsonrpc: String,

    /// Result of the method invocation
    pub result: Value,

    /// Request identifier from the original request
    pub id: RequestId,
}

impl JsonRpcResponse {
    /// Create a successful JSON-RPC 2.0 response
    pub fn new(result: Value, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result,
            id,
        }
    }
}

impl JsonRpcMessageTrait for JsonRpcResponse {}

/// JSON-RPC 2.0 Error Response Message
///
/// The `id` echoes the failed request, or is null when the offending request
/// id could not be determined (parse errors). A null id still serializes as
/// an explicit `"id": null` member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcErrorResponse {
    /// Protocol version - always "2.0"
    pub jsonrpc: String,

    /// Error details
    pub error: JsonRpcErrorObject,

    /// Request identifier, serialized as null when unknown
    pub id: Option<RequestId>,
}

impl JsonRpcErrorResponse {
    /// Create an error response echoing the given request id
    pub fn new(error: JsonRpcErrorObject, id: Option<RequestId>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            error,
            id,
        }
    }

    /// Build an error response from an error kind
    pub fn from_error(error: &JsonRpcError, id: Option<RequestId>) -> Self {
        Self::new(error.to_error_object(), id)
    }
}

impl JsonRpcMessageTrait for JsonRpcErrorResponse {}

/// JSON-RPC 2.0 Notification Message
///
/// A request without an `id`: fire-and-forget, never answered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    /// Protocol version - always "2.0"
    pub jsonrpc: String,

    /// Name of the notification method
    pub method: String,

    /// Parameters for the notification (object or array)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC 2.0 notification
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

impl JsonRpcMessageTrait for JsonRpcNotification {}

/// JSON-RPC message union covering all four wire shapes
///
/// Classification rule (each parseable object matches exactly one arm):
/// - has `method` + has `id`   => Request
/// - has `method` + no `id`    => Notification
/// - has `id` + has `result`   => Response
/// - has `id` + has `error`    => Error response (`id` may be null)
///
/// Anything else is rejected. Use [`JsonRpcMessage::classify`] to apply the
/// rule to an arbitrary JSON value; `Deserialize` routes through it so the
/// rule also governs `from_json`/`from_json_bytes`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// JSON-RPC request message
    Request(JsonRpcRequest),
    /// JSON-RPC success response message
    Response(JsonRpcResponse),
    /// JSON-RPC error response message
    Error(JsonRpcErrorResponse),
    /// JSON-RPC notification message
    Notification(JsonRpcNotification),
}

impl JsonRpcMessage {
    /// Classify a JSON value into exactly one message variant
    ///
    /// # Errors
    ///
    /// - `JsonRpcError::ParseError` for non-object roots
    /// - `JsonRpcError::InvalidRequest` when `jsonrpc` is not "2.0" or the
    ///   shape matches none of the four variants
    pub fn classify(value: Value) -> Result<Self, JsonRpcError> {
        let object = match &value {
            Value::Object(map) => map,
            _ => {
                return Err(JsonRpcError::parse_error(
                    "JSON-RPC message root must be an object",
                ))
            }
        };

        match object.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            _ => {
                return Err(JsonRpcError::invalid_request(
                    "missing or unsupported jsonrpc version",
                ))
            }
        }

        // Distinguish "id absent" from "id present but null": a null id is
        // only legal on error responses.
        let has_method = object.contains_key("method");
        let has_id = object.contains_key("id");
        let id_is_null = object.get("id").is_some_and(Value::is_null);

        let classified = if has_method && has_id && !id_is_null {
            serde_json::from_value(value).map(JsonRpcMessage::Request)
        } else if has_method && !has_id {
            serde_json::from_value(value).map(JsonRpcMessage::Notification)
        } else if has_id && object.contains_key("result") && !object.contains_key("error") {
            serde_json::from_value(value).map(JsonRpcMessage::Response)
        } else if has_id && object.contains_key("error") && !object.contains_key("result") {
            serde_json::from_value(value).map(JsonRpcMessage::Error)
        } else {
            return Err(JsonRpcError::invalid_request(
                "message matches no JSON-RPC shape",
            ));
        };

        classified.map_err(|e| JsonRpcError::invalid_request(e.to_string()))
    }

    /// Create a request message
    pub fn request(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        JsonRpcMessage::Request(JsonRpcRequest::new(method, params, id))
    }

    /// Create a success response message
    pub fn response(result: Value, id: RequestId) -> Self {
        JsonRpcMessage::Response(JsonRpcResponse::new(result, id))
    }

    /// Create an error response message
    pub fn error(error: JsonRpcErrorObject, id: Option<RequestId>) -> Self {
        JsonRpcMessage::Error(JsonRpcErrorResponse::new(error, id))
    }

    /// Create a notification message
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        JsonRpcMessage::Notification(JsonRpcNotification::new(method, params))
    }

    /// The request/notification method name, if this message carries one
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.method),
            JsonRpcMessage::Notification(n) => Some(&n.method),
            _ => None,
        }
    }

    /// The correlation id, if this message carries one
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.id),
            JsonRpcMessage::Response(r) => Some(&r.id),
            JsonRpcMessage::Error(e) => e.id.as_ref(),
            JsonRpcMessage::Notification(_) => None,
        }
    }

    /// Whether this message expects a reply
    pub fn is_request(&self) -> bool {
        matches!(self, JsonRpcMessage::Request(_))
    }

    /// Whether this message resolves a pending request (response or error)
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_)
        )
    }
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        JsonRpcMessage::classify(value).map_err(serde::de::Error::custom)
    }
}

impl JsonRpcMessageTrait for JsonRpcMessage {}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(request: JsonRpcRequest) -> Self {
        JsonRpcMessage::Request(request)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(response: JsonRpcResponse) -> Self {
        JsonRpcMessage::Response(response)
    }
}

impl From<JsonRpcErrorResponse> for JsonRpcMessage {
    fn from(error: JsonRpcErrorResponse) -> Self {
        JsonRpcMessage::Error(error)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(notification: JsonRpcNotification) -> Self {
        JsonRpcMessage::Notification(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_request() {
        let value = json!({"jsonrpc": "2.0", "method": "ping", "id": 1});
        let message = JsonRpcMessage::classify(value).unwrap();
        assert!(matches!(message, JsonRpcMessage::Request(ref r) if r.method == "ping"));
    }

    #[test]
    fn classify_notification() {
        let value = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        let message = JsonRpcMessage::classify(value).unwrap();
        assert!(matches!(message, JsonRpcMessage::Notification(_)));
    }

    #[test]
    fn classify_response() {
        let value = json!({"jsonrpc": "2.0", "id": "a", "result": {"ok": true}});
        let message = JsonRpcMessage::classify(value).unwrap();
        assert!(matches!(message, JsonRpcMessage::Response(_)));
    }

    #[test]
    fn classify_error_response_with_null_id() {
        let value = json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {"code": -32700, "message": "Parse error"}
        });
        let message = JsonRpcMessage::classify(value).unwrap();
        match message {
            JsonRpcMessage::Error(e) => {
                assert!(e.id.is_none());
                assert_eq!(e.error.code, -32700);
            }
            other => panic!("expected error response, got {other:?}"),
        }
    }

    #[test]
    fn classify_rejects_non_object() {
        let err = JsonRpcMessage::classify(json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.error_code(), -32700);
    }

    #[test]
    fn classify_rejects_wrong_version() {
        let err =
            JsonRpcMessage::classify(json!({"jsonrpc": "1.0", "method": "m", "id": 1})).unwrap_err();
        assert_eq!(err.error_code(), -32600);
    }

    #[test]
    fn classify_rejects_ambiguous_shape() {
        // result and error together match no variant
        let err = JsonRpcMessage::classify(json!({
            "jsonrpc": "2.0", "id": 1, "result": {}, "error": {"code": 1, "message": "x"}
        }))
        .unwrap_err();
        assert_eq!(err.error_code(), -32600);

        // bare id with neither result nor error
        let err = JsonRpcMessage::classify(json!({"jsonrpc": "2.0", "id": 1})).unwrap_err();
        assert_eq!(err.error_code(), -32600);
    }

    #[test]
    fn request_with_null_id_is_rejected() {
        // null ids are reserved for error responses
        let err = JsonRpcMessage::classify(json!({"jsonrpc": "2.0", "method": "m", "id": null}))
            .unwrap_err();
        assert_eq!(err.error_code(), -32600);
    }

    #[test]
    fn round_trip_preserves_structure() {
        let original = JsonRpcMessage::request(
            "tools/call",
            Some(json!({"name": "add", "arguments": {"a": 2, "b": 3}})),
            RequestId::new_string("req-1"),
        );
        let json = original.to_json().unwrap();
        let parsed = JsonRpcMessage::from_json(&json).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn omitted_params_do_not_serialize() {
        let request = JsonRpcRequest::new("ping", None, RequestId::new_number(7));
        let json = request.to_json().unwrap();
        assert!(!json.contains("params"));

        let notification = JsonRpcNotification::new("notifications/initialized", None);
        let json = notification.to_json().unwrap();
        assert!(!json.contains("params"));
        assert!(!json.contains("id"));
    }

    #[test]
    fn null_error_id_serializes_as_null() {
        let response = JsonRpcErrorResponse::new(
            JsonRpcErrorObject::new(-32700, "Parse error"),
            None,
        );
        let json = response.to_json().unwrap();
        assert!(json.contains(r#""id":null"#));
    }

    #[test]
    fn bytes_round_trip() {
        let message = JsonRpcMessage::notification("heartbeat", Some(json!({"n": 1})));
        let bytes = message.to_bytes().unwrap();
        let parsed = JsonRpcMessage::from_json_bytes(&bytes).unwrap();
        assert_eq!(message, parsed);
    }

    #[test]
    fn request_id_formats() {
        let string_json =
            serde_json::to_string(&JsonRpcRequest::new("t", None, RequestId::new_string("abc")))
                .unwrap();
        assert!(string_json.contains(r#""id":"abc""#));

        let numeric_json =
            serde_json::to_string(&JsonRpcRequest::new("t", None, RequestId::new_number(42)))
                .unwrap();
        assert!(numeric_json.contains(r#""id":42"#));
    }
}
