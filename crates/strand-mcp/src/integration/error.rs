//! Public Error Taxonomy
//!
//! `McpError` is the error type the library returns across its API surface.
//! Each kind carries a JSON-RPC-compatible numeric code so errors can move
//! between the wire and the API without losing their identity. The calling
//! application decides whether to log, retry, or report; nothing in the
//! library retries on its own.

// Layer 1: Standard library imports
// (None required for current thiserror implementation)

// Layer 2: Third-party crate imports
use serde_json::Value;
use thiserror::Error;

// Layer 3: Internal module imports
use crate::protocol::{error_codes, JsonRpcErrorObject};
use crate::transport::TransportError;

/// Convenient result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Error kinds returned across the library's API surface
#[derive(Debug, Error)]
pub enum McpError {
    /// Unparseable JSON (-32700)
    #[error("Parse error: {message}")]
    ParseError { message: String },

    /// JSON shape not a valid JSON-RPC message (-32600)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Unknown method or unknown tool/prompt name (-32601)
    #[error("Method not found: {name}")]
    MethodNotFound { name: String },

    /// Params missing, malformed, or wrong type (-32602)
    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    /// Unspecified internal failure (-32603)
    #[error("Internal error: {message}")]
    InternalError { message: String },

    /// `resources/read` with an unmatched URI (-32002)
    #[error("Resource not found: {uri}")]
    ResourceNotFound { uri: String },

    /// Transport lost or send-after-close (-32000)
    #[error("Connection closed: {message}")]
    ConnectionClosed { message: String },

    /// Lower-level I/O failure (-32003)
    #[error("Transport error: {message}")]
    TransportFailure { message: String },

    /// Caller-imposed deadline exceeded (-32001)
    #[error("Request timed out: {message}")]
    Timeout { message: String },

    /// The caller cancelled the request; never crosses the wire
    #[error("Request cancelled: {method}")]
    Cancelled { method: String },

    /// Session is not initialized for this operation
    #[error("Session not initialized: {message}")]
    NotInitialized { message: String },

    /// The peer does not advertise the required capability
    #[error("Unsupported capability: {capability}")]
    UnsupportedCapability { capability: String },

    /// The peer sent a structurally invalid result
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// An error response with a code outside the known taxonomy
    #[error("Server error {code}: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<Value>,
    },
}

impl McpError {
    /// Create a parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a method-not-found error
    pub fn method_not_found(name: impl Into<String>) -> Self {
        Self::MethodNotFound { name: name.into() }
    }

    /// Create an invalid-parameters error
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Create a resource-not-found error
    pub fn resource_not_found(uri: impl Into<String>) -> Self {
        Self::ResourceNotFound { uri: uri.into() }
    }

    /// Create a connection-closed error
    pub fn connection_closed(message: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            message: message.into(),
        }
    }

    /// Create a transport-failure error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(method: impl Into<String>) -> Self {
        Self::Cancelled {
            method: method.into(),
        }
    }

    /// Create a not-initialized error
    pub fn not_initialized(message: impl Into<String>) -> Self {
        Self::NotInitialized {
            message: message.into(),
        }
    }

    /// Create an unsupported-capability error
    pub fn unsupported_capability(capability: impl Into<String>) -> Self {
        Self::UnsupportedCapability {
            capability: capability.into(),
        }
    }

    /// Create an invalid-response error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// The JSON-RPC code this kind maps to
    pub fn error_code(&self) -> i32 {
        match self {
            McpError::ParseError { .. } => error_codes::PARSE_ERROR,
            McpError::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            McpError::MethodNotFound { .. } => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams { .. } => error_codes::INVALID_PARAMS,
            McpError::InternalError { .. } => error_codes::INTERNAL_ERROR,
            McpError::ResourceNotFound { .. } => error_codes::RESOURCE_NOT_FOUND,
            McpError::ConnectionClosed { .. } => error_codes::CONNECTION_CLOSED,
            McpError::TransportFailure { .. } => error_codes::TRANSPORT_ERROR,
            McpError::Timeout { .. } => error_codes::TIMEOUT,
            McpError::ServerError { code, .. } => *code,
            // Local-only kinds never cross the wire; code is a fallback
            McpError::Cancelled { .. }
            | McpError::NotInitialized { .. }
            | McpError::UnsupportedCapability { .. }
            | McpError::InvalidResponse { .. } => error_codes::INTERNAL_ERROR,
        }
    }

    /// Convert to the wire error object for an error response
    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        let mut object = JsonRpcErrorObject::new(self.error_code(), self.to_string());
        if let McpError::ServerError {
            data: Some(data), ..
        } = self
        {
            object = object.with_data(data.clone());
        }
        object
    }

    /// Translate a wire error object back into the taxonomy
    pub fn from_error_object(object: JsonRpcErrorObject) -> Self {
        let JsonRpcErrorObject {
            code,
            message,
            data,
        } = object;
        match code {
            error_codes::PARSE_ERROR => Self::ParseError { message },
            error_codes::INVALID_REQUEST => Self::InvalidRequest { message },
            error_codes::METHOD_NOT_FOUND => Self::MethodNotFound { name: message },
            error_codes::INVALID_PARAMS => Self::InvalidParams { message },
            error_codes::INTERNAL_ERROR => Self::InternalError { message },
            error_codes::RESOURCE_NOT_FOUND => Self::ResourceNotFound { uri: message },
            error_codes::CONNECTION_CLOSED => Self::ConnectionClosed { message },
            error_codes::TIMEOUT => Self::Timeout { message },
            error_codes::TRANSPORT_ERROR => Self::TransportFailure { message },
            code => Self::ServerError {
                code,
                message,
                data,
            },
        }
    }
}

impl From<TransportError> for McpError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::ConnectionClosed { message } => Self::ConnectionClosed { message },
            TransportError::Serialization { source } => Self::InternalError {
                message: source.to_string(),
            },
            TransportError::InvalidState { message } => Self::ConnectionClosed { message },
            other => Self::TransportFailure {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(error: serde_json::Error) -> Self {
        Self::ParseError {
            message: error.to_string(),
        }
    }
}
