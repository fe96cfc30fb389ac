//! High-level MCP Client
//!
//! [`McpClient`] issues the client side of the protocol as correlated
//! async operations. Every operation verifies the session is initialized,
//! allocates a request id, sends, and parses the typed result; on
//! transport disconnect all outstanding operations fail with
//! `ConnectionClosed`.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

// Layer 3: Internal module imports
use super::error::{McpError, McpResult};
use crate::protocol::{
    defaults, methods, notifications, CallToolRequest, CallToolResult, ClientCapabilities,
    GetPromptRequest, GetPromptResult, Implementation, InitializeRequest, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, LogLevel, Prompt, ProtocolVersion,
    ReadResourceRequest, ReadResourceResult, Resource, ResourceContents, ResourceTemplate,
    ServerCapabilities, SetLevelRequest, SubscribeResourceRequest, Tool,
};
use crate::session::{InboundDispatcher, Session, SessionState};
use crate::transport::TransportBuilder;

/// Client configuration
#[derive(Debug, Clone)]
pub struct McpClientConfig {
    /// Client implementation info sent during initialization
    pub client_info: Implementation,
    /// Capabilities offered to the server
    pub capabilities: ClientCapabilities,
    /// Protocol version offered during negotiation
    pub protocol_version: ProtocolVersion,
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation::new(defaults::CLIENT_NAME, env!("CARGO_PKG_VERSION")),
            capabilities: ClientCapabilities::default(),
            protocol_version: ProtocolVersion::default_negotiated(),
        }
    }
}

/// Builder for [`McpClient`]
pub struct McpClientBuilder {
    config: McpClientConfig,
}

impl McpClientBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self {
            config: McpClientConfig::default(),
        }
    }

    /// Set client name and version
    pub fn client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        let title = self.config.client_info.title.take();
        let website_url = self.config.client_info.website_url.take();
        self.config.client_info = Implementation {
            name: name.into(),
            version: version.into(),
            title,
            website_url,
        };
        self
    }

    /// Set the display title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.client_info.title = Some(title.into());
        self
    }

    /// Offer the given capabilities
    pub fn capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    /// Offer a specific protocol version
    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.config.protocol_version = version;
        self
    }

    /// Connect over the given transport
    ///
    /// The session is established but not yet initialized; call
    /// [`McpClient::initialize`] before issuing operations.
    pub async fn connect<B: TransportBuilder>(self, builder: B) -> McpResult<McpClient> {
        let dispatcher = Arc::new(ClientDispatcher);
        let session = Session::establish(builder, dispatcher).await?;
        Ok(McpClient {
            session,
            config: self.config,
            server_info: RwLock::new(None),
            server_capabilities: RwLock::new(None),
            negotiated_version: RwLock::new(None),
        })
    }
}

impl Default for McpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The client side of the inbound-dispatch capability interface
///
/// Servers may originate requests on the same session; the core client
/// answers `ping` and refuses everything else.
struct ClientDispatcher;

#[async_trait]
impl InboundDispatcher for ClientDispatcher {
    async fn handle_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        match request.method.as_str() {
            methods::PING => Ok(json!({})),
            other => Err(McpError::method_not_found(other)),
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        debug!(method = %notification.method, "client received notification");
    }
}

/// High-level MCP client
pub struct McpClient {
    session: Session,
    config: McpClientConfig,
    server_info: RwLock<Option<Implementation>>,
    server_capabilities: RwLock<Option<ServerCapabilities>>,
    negotiated_version: RwLock<Option<ProtocolVersion>>,
}

impl McpClient {
    /// Start building a client
    pub fn builder() -> McpClientBuilder {
        McpClientBuilder::new()
    }

    /// Perform the initialize handshake
    ///
    /// Sends `initialize`, records the server's capabilities and the
    /// negotiated protocol version, confirms with
    /// `notifications/initialized`, and unlocks normal traffic.
    pub async fn initialize(&self) -> McpResult<InitializeResult> {
        let request = InitializeRequest {
            protocol_version: self.config.protocol_version.clone(),
            capabilities: self.config.capabilities.clone(),
            client_info: self.config.client_info.clone(),
        };
        let value = self
            .session
            .request(methods::INITIALIZE, Some(serde_json::to_value(&request)?))
            .await?;
        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| McpError::invalid_response(format!("invalid initialize result: {e}")))?;

        *self.server_info.write().await = Some(result.server_info.clone());
        *self.server_capabilities.write().await = Some(result.capabilities.clone());
        *self.negotiated_version.write().await = Some(result.protocol_version.clone());

        self.session
            .notify(notifications::INITIALIZED, None)
            .await?;
        self.session.mark_initialized();
        info!(
            server = %result.server_info.name,
            version = %result.protocol_version,
            "MCP session initialized"
        );
        Ok(result)
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Server implementation info (available after `initialize`)
    pub async fn server_info(&self) -> Option<Implementation> {
        self.server_info.read().await.clone()
    }

    /// Server capabilities (available after `initialize`)
    pub async fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.server_capabilities.read().await.clone()
    }

    /// The protocol version agreed during `initialize`
    pub async fn negotiated_version(&self) -> Option<ProtocolVersion> {
        self.negotiated_version.read().await.clone()
    }

    /// Subscribe to notifications arriving from the server
    pub fn notifications(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.session.notifications()
    }

    /// Check a server capability predicate
    async fn supports(&self, check: impl Fn(&ServerCapabilities) -> bool) -> bool {
        self.server_capabilities
            .read()
            .await
            .as_ref()
            .is_some_and(check)
    }

    fn parse_result<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> McpResult<T> {
        serde_json::from_value(value)
            .map_err(|e| McpError::invalid_response(format!("invalid {what} result: {e}")))
    }

    // Tool operations

    /// List the server's tools
    pub async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        if !self.supports(|caps| caps.tools.is_some()).await {
            return Err(McpError::unsupported_capability("tools"));
        }
        let value = self.session.request(methods::TOOLS_LIST, None).await?;
        let result: ListToolsResult = Self::parse_result(value, "tools/list")?;
        Ok(result.tools)
    }

    /// Invoke a tool
    ///
    /// The returned envelope carries `is_error: true` for application-level
    /// tool failures; protocol failures (unknown tool, malformed params)
    /// surface as `Err`.
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<Value>,
    ) -> McpResult<CallToolResult> {
        self.call_tool_with(name, arguments, None).await
    }

    /// Invoke a tool with an optional cancellation token
    pub async fn call_tool_with(
        &self,
        name: impl Into<String>,
        arguments: Option<Value>,
        cancel: Option<CancellationToken>,
    ) -> McpResult<CallToolResult> {
        let request = CallToolRequest {
            name: name.into(),
            arguments,
        };
        let value = self
            .session
            .request_with_options(
                methods::TOOLS_CALL,
                Some(serde_json::to_value(&request)?),
                cancel,
            )
            .await?;
        Self::parse_result(value, "tools/call")
    }

    // Resource operations

    /// List the server's concrete resources
    pub async fn list_resources(&self) -> McpResult<Vec<Resource>> {
        if !self.supports(|caps| caps.resources.is_some()).await {
            return Err(McpError::unsupported_capability("resources"));
        }
        let value = self.session.request(methods::RESOURCES_LIST, None).await?;
        let result: ListResourcesResult = Self::parse_result(value, "resources/list")?;
        Ok(result.resources)
    }

    /// List the server's resource templates
    pub async fn list_resource_templates(&self) -> McpResult<Vec<ResourceTemplate>> {
        if !self.supports(|caps| caps.resources.is_some()).await {
            return Err(McpError::unsupported_capability("resources"));
        }
        let value = self
            .session
            .request(methods::RESOURCES_TEMPLATES_LIST, None)
            .await?;
        let result: ListResourceTemplatesResult =
            Self::parse_result(value, "resources/templates/list")?;
        Ok(result.resource_templates)
    }

    /// Read a resource by URI
    pub async fn read_resource(&self, uri: impl Into<String>) -> McpResult<Vec<ResourceContents>> {
        let request = ReadResourceRequest { uri: uri.into() };
        let value = self
            .session
            .request(methods::RESOURCES_READ, Some(serde_json::to_value(&request)?))
            .await?;
        let result: ReadResourceResult = Self::parse_result(value, "resources/read")?;
        for piece in &result.contents {
            piece
                .validate()
                .map_err(|e| McpError::invalid_response(e.to_string()))?;
        }
        Ok(result.contents)
    }

    /// Subscribe to change notifications for a resource
    pub async fn subscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        if !self
            .supports(|caps| {
                caps.resources
                    .as_ref()
                    .is_some_and(|r| r.subscribe.unwrap_or(false))
            })
            .await
        {
            return Err(McpError::unsupported_capability("resource subscriptions"));
        }
        let request = SubscribeResourceRequest { uri: uri.into() };
        self.session
            .request(
                methods::RESOURCES_SUBSCRIBE,
                Some(serde_json::to_value(&request)?),
            )
            .await?;
        Ok(())
    }

    /// Unsubscribe from change notifications for a resource
    pub async fn unsubscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        let request = SubscribeResourceRequest { uri: uri.into() };
        self.session
            .request(
                methods::RESOURCES_UNSUBSCRIBE,
                Some(serde_json::to_value(&request)?),
            )
            .await?;
        Ok(())
    }

    // Prompt operations

    /// List the server's prompts
    pub async fn list_prompts(&self) -> McpResult<Vec<Prompt>> {
        if !self.supports(|caps| caps.prompts.is_some()).await {
            return Err(McpError::unsupported_capability("prompts"));
        }
        let value = self.session.request(methods::PROMPTS_LIST, None).await?;
        let result: ListPromptsResult = Self::parse_result(value, "prompts/list")?;
        Ok(result.prompts)
    }

    /// Expand a prompt template with arguments
    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: HashMap<String, String>,
    ) -> McpResult<GetPromptResult> {
        let request = GetPromptRequest {
            name: name.into(),
            arguments,
        };
        let value = self
            .session
            .request(methods::PROMPTS_GET, Some(serde_json::to_value(&request)?))
            .await?;
        Self::parse_result(value, "prompts/get")
    }

    // Connectivity operations

    /// Round-trip a `ping` request
    pub async fn ping(&self) -> McpResult<()> {
        self.session.request(methods::PING, None).await?;
        Ok(())
    }

    /// Ask the server to adjust its minimum log level
    pub async fn set_log_level(&self, level: LogLevel) -> McpResult<()> {
        let request = SetLevelRequest { level };
        self.session
            .request(
                methods::LOGGING_SET_LEVEL,
                Some(serde_json::to_value(&request)?),
            )
            .await?;
        Ok(())
    }

    /// Tear the session down
    ///
    /// Every outstanding operation fails with `ConnectionClosed`.
    pub async fn disconnect(&self) -> McpResult<()> {
        self.session.disconnect().await
    }
}
