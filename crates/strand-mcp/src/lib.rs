//! strand-mcp - Model Context Protocol Runtime
//!
//! This crate provides an implementation of the Model Context Protocol
//! (MCP) core: a JSON-RPC 2.0 message engine, the session/initialize
//! handshake, server- and client-side request dispatch, and a pluggable
//! transport layer with stdio (NDJSON), HTTP+SSE, and WebSocket
//! implementations.
//!
//! # Architecture
//!
//! The crate is organized in layers, leaves first:
//!
//! - **Protocol Layer** (`protocol`): JSON-RPC 2.0 message types, the
//!   classification parser, and the MCP data model. Pure data.
//! - **Transport Layer** (`transport`): the event-driven [`Transport`]
//!   abstraction and the three concrete transports.
//! - **Correlation Layer** (`correlation`): request-id generation and the
//!   pending-request table.
//! - **Session Layer** (`session`): the [`Session`] that owns a transport,
//!   orchestrates the handshake, and demultiplexes inbound traffic.
//! - **Integration Layer** (`integration`): [`McpServer`] and
//!   [`McpClient`] plus the public error taxonomy.
//!
//! # Quick Start
//!
//! A server exposing one tool over stdio:
//!
//! ```rust,no_run
//! use strand_mcp::{McpServer, StdioTransportBuilder};
//! use strand_mcp::protocol::{Content, Tool};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = McpServer::builder()
//!     .server_info("calculator", "1.0.0")
//!     .build();
//!
//! server
//!     .register_tool(
//!         Tool::new("add", "Add two numbers").with_input_schema(json!({
//!             "type": "object",
//!             "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
//!             "required": ["a", "b"]
//!         })),
//!         |args| async move {
//!             let a = args["a"].as_f64().unwrap_or(0.0);
//!             let b = args["b"].as_f64().unwrap_or(0.0);
//!             Ok(vec![Content::text((a + b).to_string())])
//!         },
//!     )
//!     .await;
//!
//! let session = server.serve(StdioTransportBuilder::new()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! A client calling it from the other end of the pipe:
//!
//! ```rust,no_run
//! use strand_mcp::{McpClient, StdioTransportBuilder};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = McpClient::builder()
//!     .client_info("host", "1.0.0")
//!     .connect(StdioTransportBuilder::subprocess(["calculator-server"]))
//!     .await?;
//!
//! client.initialize().await?;
//! let result = client.call_tool("add", Some(json!({"a": 2, "b": 3}))).await?;
//! assert!(!result.is_error);
//! # Ok(())
//! # }
//! ```

// Correlation layer modules
pub mod correlation;

// Integration layer modules
pub mod integration;

// Protocol layer modules
pub mod protocol;

// Session layer modules
pub mod session;

// Transport layer modules
pub mod transport;

// Re-export commonly used types for convenience
pub use integration::{
    McpClient, McpClientBuilder, McpClientConfig, McpError, McpResult, McpServer,
    McpServerBuilder, McpServerConfig, UriTemplate,
};
pub use protocol::{
    JsonRpcErrorResponse, JsonRpcMessage, JsonRpcMessageTrait, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, RequestId,
};
pub use session::{InboundDispatcher, Session, SessionState};
pub use transport::{
    HttpServerConfig, HttpServerTransport, StdioTransport, StdioTransportBuilder, Transport,
    TransportBuilder, TransportError, TransportEvents, TransportState, WebSocketServerConfig,
    WebSocketServerTransport,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the crate version as a string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn crate_public_api_is_reachable() {
        let request = JsonRpcRequest::new(
            "test_method",
            Some(json!({"param": "value"})),
            RequestId::new_string("test-123"),
        );
        let response = JsonRpcResponse::new(json!({"result": "ok"}), RequestId::new_number(456));
        let notification = JsonRpcNotification::new("test_event", None);

        assert!(request.to_json().is_ok());
        assert!(response.to_json().is_ok());
        assert!(notification.to_json().is_ok());
    }

    #[test]
    fn version_info() {
        assert!(!version().is_empty());
        assert_eq!(version(), VERSION);
    }
}
