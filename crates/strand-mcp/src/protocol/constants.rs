//! MCP Protocol Constants
//!
//! This module defines constants for MCP protocol method names, notification
//! names, error codes, and other standardized values to ensure consistency
//! and reduce typos.

/// MCP protocol method names
pub mod methods {
    /// Initialization method
    pub const INITIALIZE: &str = "initialize";

    /// Resource-related methods
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
    pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";

    /// Tool-related methods
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";

    /// Prompt-related methods
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";

    /// Logging-related methods
    pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

    /// Connectivity testing method
    pub const PING: &str = "ping";
}

/// MCP notification method names
pub mod notifications {
    /// Sent by the client once the initialize handshake is complete
    pub const INITIALIZED: &str = "notifications/initialized";

    /// Sent by either side to cancel an in-flight request
    pub const CANCELLED: &str = "notifications/cancelled";

    /// Registry mutation notifications (server to client)
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";

    /// Emitted when a subscribed resource changes
    pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
}

/// JSON-RPC error codes
pub mod error_codes {
    /// Parse error - Invalid JSON was received by the server
    pub const PARSE_ERROR: i32 = -32700;

    /// Invalid Request - The JSON sent is not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;

    /// Method not found - The method does not exist / is not available
    pub const METHOD_NOT_FOUND: i32 = -32601;

    /// Invalid params - Invalid method parameter(s)
    pub const INVALID_PARAMS: i32 = -32602;

    /// Internal error - Internal JSON-RPC error
    pub const INTERNAL_ERROR: i32 = -32603;

    /// MCP-defined: the transport was lost or a send was attempted after close
    pub const CONNECTION_CLOSED: i32 = -32000;

    /// MCP-defined: a caller-imposed deadline was exceeded
    pub const TIMEOUT: i32 = -32001;

    /// MCP-defined: `resources/read` with an unmatched URI
    pub const RESOURCE_NOT_FOUND: i32 = -32002;

    /// MCP-defined: lower-level I/O failure
    pub const TRANSPORT_ERROR: i32 = -32003;
}

/// Protocol version constants
pub mod versions {
    /// Default negotiated protocol version
    pub const DEFAULT: &str = "2025-03-26";

    /// Latest protocol version this library advertises
    pub const LATEST: &str = "2025-11-25";

    /// Versions this library accepts during negotiation
    pub const SUPPORTED: &[&str] = &[DEFAULT, LATEST];
}

/// Default values for MCP protocol
pub mod defaults {
    /// Default client name
    pub const CLIENT_NAME: &str = "strand-mcp-client";

    /// Default server name
    pub const SERVER_NAME: &str = "strand-mcp-server";

    /// Default timeout in seconds
    pub const TIMEOUT_SECONDS: u64 = 30;

    /// Default maximum pending requests per session (0 = unlimited)
    pub const MAX_PENDING_REQUESTS: usize = 1000;
}
