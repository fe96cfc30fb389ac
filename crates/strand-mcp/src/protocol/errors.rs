//! Protocol Error Types
//!
//! Wire-level JSON-RPC errors and protocol construction/validation errors.
//! The public API taxonomy (`McpError`) lives in the integration layer and
//! is built on top of these.

// Layer 1: Standard library imports
// (None required for current thiserror implementation)

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// Layer 3: Internal module imports
use super::constants::error_codes;

/// JSON-RPC 2.0 error object as carried by an error response
///
/// This is the exact wire shape of the `error` member: a numeric code, a
/// human-readable message, and an optional structured data blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    /// Numeric error code (JSON-RPC reserved or MCP-defined)
    pub code: i32,
    /// Short human-readable description of the error
    pub message: String,
    /// Optional structured details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    /// Create an error object with the given code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured detail data
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// JSON-RPC error kinds with their standard codes
///
/// Covers the five reserved JSON-RPC 2.0 codes plus the MCP-defined codes
/// used by this library. Each variant converts losslessly into a
/// [`JsonRpcErrorObject`] for the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum JsonRpcError {
    /// Parse error (-32700)
    #[error("Parse error: {message}")]
    ParseError { message: String },

    /// Invalid request (-32600)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Method not found (-32601)
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    /// Invalid parameters (-32602)
    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    /// Internal error (-32603)
    #[error("Internal error: {message}")]
    InternalError { message: String },

    /// Server error (custom error codes)
    #[error("Server error {code}: {message}")]
    ServerError { code: i32, message: String },
}

impl JsonRpcError {
    /// Get the JSON-RPC error code for this error
    pub fn error_code(&self) -> i32 {
        match self {
            JsonRpcError::ParseError { .. } => error_codes::PARSE_ERROR,
            JsonRpcError::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            JsonRpcError::MethodNotFound { .. } => error_codes::METHOD_NOT_FOUND,
            JsonRpcError::InvalidParams { .. } => error_codes::INVALID_PARAMS,
            JsonRpcError::InternalError { .. } => error_codes::INTERNAL_ERROR,
            JsonRpcError::ServerError { code, .. } => *code,
        }
    }

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

    /// Create a method not found error
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Create an invalid parameters error
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

    /// Create a server error with custom code
    pub fn server_error(code: i32, message: impl Into<String>) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
        }
    }

    /// Convert into the wire error object
    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        JsonRpcErrorObject::new(self.error_code(), self.to_string())
    }
}

/// Errors raised while constructing or validating protocol values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ProtocolError {
    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Invalid message format errors
    #[error("Invalid message: {message}")]
    InvalidMessage { message: String },

    /// Invalid base64 data
    #[error("Invalid base64 data")]
    InvalidBase64Data,

    /// Invalid protocol version
    #[error("Invalid protocol version: {0}")]
    InvalidProtocolVersion(String),

    /// Invalid URI template
    #[error("Invalid URI template: {0}")]
    InvalidUriTemplate(String),

    /// Invalid MIME type format
    #[error("Invalid MIME type: {0}")]
    InvalidMimeType(String),
}

/// Convenient result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

impl ProtocolError {
    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an invalid message error
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_codes_are_standard() {
        assert_eq!(JsonRpcError::parse_error("x").error_code(), -32700);
        assert_eq!(JsonRpcError::invalid_request("x").error_code(), -32600);
        assert_eq!(JsonRpcError::method_not_found("x").error_code(), -32601);
        assert_eq!(JsonRpcError::invalid_params("x").error_code(), -32602);
        assert_eq!(JsonRpcError::internal_error("x").error_code(), -32603);
        assert_eq!(JsonRpcError::server_error(-32002, "x").error_code(), -32002);
    }

    #[test]
    fn error_object_omits_absent_data() {
        let obj = JsonRpcErrorObject::new(-32601, "Method not found");
        let value = serde_json::to_value(&obj).unwrap();
        assert_eq!(value, json!({"code": -32601, "message": "Method not found"}));

        let with_data = obj.with_data(json!({"method": "nosuch"}));
        let value = serde_json::to_value(&with_data).unwrap();
        assert_eq!(value["data"]["method"], "nosuch");
    }
}
