//! Protocol Layer
//!
//! JSON-RPC 2.0 message types, the classification parser, MCP data model
//! types, and protocol constants. Pure data: nothing in this module does
//! I/O.

pub mod constants;
pub mod errors;
pub mod message;
pub mod types;

// Re-export the protocol surface at the module root
pub use constants::{defaults, error_codes, methods, notifications, versions};
pub use errors::{JsonRpcError, JsonRpcErrorObject, ProtocolError, ProtocolResult};
pub use message::{
    JsonRpcErrorResponse, JsonRpcMessage, JsonRpcMessageTrait, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, RequestId, JSONRPC_VERSION,
};
pub use types::{
    CallToolRequest, CallToolResult, CancelledNotification, ClientCapabilities, Content,
    GetPromptRequest, GetPromptResult, Implementation, InitializeRequest, InitializeResult,
    ListPromptsRequest, ListPromptsResult, ListResourceTemplatesRequest,
    ListResourceTemplatesResult, ListResourcesRequest, ListResourcesResult, ListToolsRequest,
    ListToolsResult, LogLevel, Prompt, PromptArgument, PromptMessage, PromptsCapability,
    ProtocolVersion, ReadResourceRequest, ReadResourceResult, Resource, ResourceContents,
    ResourceTemplate, ResourceUpdatedNotification, ResourcesCapability, Role, RootsCapability,
    ServerCapabilities, SetLevelRequest, SubscribeResourceRequest, Tool, ToolAnnotations,
    ToolsCapability,
};
