//! High-level MCP Server
//!
//! [`McpServer`] holds the tool/resource/resource-template/prompt
//! registries and dispatches the server side of the protocol:
//! `initialize`, `ping`, `tools/*`, `resources/*`, `prompts/*`, and
//! `logging/setLevel`.
//!
//! Tool handler failure is an application-level outcome: it is wrapped into
//! a successful `tools/call` envelope with `isError: true`, never into a
//! JSON-RPC error response. Protocol failures (unknown tool, bad params)
//! do become error responses.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

// Layer 3: Internal module imports
use super::error::{McpError, McpResult};
use super::registry::{PromptHandler, Registries, ResourceHandler, ToolHandler};
use crate::protocol::{
    methods, notifications, CallToolRequest, CallToolResult, CancelledNotification,
    ClientCapabilities, Content, GetPromptRequest, GetPromptResult, Implementation,
    InitializeRequest, InitializeResult, JsonRpcNotification, JsonRpcRequest,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    LogLevel, Prompt, ProtocolVersion, PromptsCapability, ReadResourceRequest,
    ReadResourceResult, Resource, ResourceContents, ResourceTemplate,
    ResourceUpdatedNotification, ResourcesCapability, ServerCapabilities, SetLevelRequest,
    SubscribeResourceRequest, Tool, ToolsCapability,
};
use crate::session::{InboundDispatcher, Session};
use crate::transport::TransportBuilder;

/// Handler for `logging/setLevel`
///
/// Configuring one makes the server advertise the `logging` capability.
#[async_trait]
pub trait LoggingHandler: Send + Sync {
    /// Apply the requested minimum log level
    async fn set_level(&self, level: LogLevel) -> McpResult<()>;
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Server implementation info sent during initialization
    pub server_info: Implementation,
    /// Optional usage instructions included in the initialize result
    pub instructions: Option<String>,
    /// Experimental capability markers, transported opaquely
    pub experimental: Option<Value>,
    /// Whether to advertise the `completions` capability marker
    pub completions: bool,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            server_info: Implementation::new(
                crate::protocol::defaults::SERVER_NAME,
                env!("CARGO_PKG_VERSION"),
            ),
            instructions: None,
            experimental: None,
            completions: false,
        }
    }
}

/// Builder for [`McpServer`]
pub struct McpServerBuilder {
    config: McpServerConfig,
    logging: Option<Arc<dyn LoggingHandler>>,
}

impl McpServerBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self {
            config: McpServerConfig::default(),
            logging: None,
        }
    }

    /// Set server name and version
    pub fn server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        let title = self.config.server_info.title.take();
        let website_url = self.config.server_info.website_url.take();
        self.config.server_info = Implementation {
            name: name.into(),
            version: version.into(),
            title,
            website_url,
        };
        self
    }

    /// Set the display title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.server_info.title = Some(title.into());
        self
    }

    /// Set the instructions returned from `initialize`
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    /// Attach experimental capability markers
    pub fn experimental(mut self, markers: Value) -> Self {
        self.config.experimental = Some(markers);
        self
    }

    /// Advertise the `completions` capability marker
    pub fn completions(mut self) -> Self {
        self.config.completions = true;
        self
    }

    /// Attach a logging handler (advertises the `logging` capability)
    pub fn logging_handler<H: LoggingHandler + 'static>(mut self, handler: H) -> Self {
        self.logging = Some(Arc::new(handler));
        self
    }

    /// Build the server
    pub fn build(self) -> McpServer {
        McpServer {
            inner: Arc::new(ServerInner {
                config: self.config,
                registries: Registries::new(),
                logging: self.logging,
                initialized: AtomicBool::new(false),
                client_info: RwLock::new(None),
                client_capabilities: RwLock::new(None),
                negotiated_version: RwLock::new(None),
                session: RwLock::new(None),
            }),
        }
    }
}

impl Default for McpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ServerInner {
    config: McpServerConfig,
    registries: Registries,
    logging: Option<Arc<dyn LoggingHandler>>,
    /// Flipped by `notifications/initialized`
    initialized: AtomicBool,
    client_info: RwLock<Option<Implementation>>,
    client_capabilities: RwLock<Option<ClientCapabilities>>,
    negotiated_version: RwLock<Option<ProtocolVersion>>,
    session: RwLock<Option<Session>>,
}

impl ServerInner {
    /// Capability advertisement reflecting the populated registries
    async fn capabilities(&self) -> ServerCapabilities {
        let mut capabilities = ServerCapabilities::default();
        if self.registries.has_tools().await {
            capabilities.tools = Some(ToolsCapability {
                list_changed: Some(true),
            });
        }
        if self.registries.has_resources().await {
            capabilities.resources = Some(ResourcesCapability {
                subscribe: Some(true),
                list_changed: Some(true),
            });
        }
        if self.registries.has_prompts().await {
            capabilities.prompts = Some(PromptsCapability {
                list_changed: Some(true),
            });
        }
        if self.logging.is_some() {
            capabilities.logging = Some(json!({}));
        }
        if self.config.completions {
            capabilities.completions = Some(json!({}));
        }
        capabilities.experimental = self.config.experimental.clone();
        capabilities
    }

    /// Send a notification if a session is attached and initialized
    async fn notify(&self, method: &str, params: Option<Value>) {
        if !self.initialized.load(Ordering::SeqCst) {
            return;
        }
        let session = self.session.read().await.clone();
        if let Some(session) = session {
            if let Err(e) = session.notify(method, params).await {
                warn!(method, error = %e, "failed to send server notification");
            }
        }
    }
}

/// High-level MCP server
///
/// Cheap to clone; all clones share the same registries and session.
#[derive(Clone)]
pub struct McpServer {
    inner: Arc<ServerInner>,
}

impl McpServer {
    /// Start building a server
    pub fn builder() -> McpServerBuilder {
        McpServerBuilder::new()
    }

    /// Establish a session over the given transport
    ///
    /// The returned [`Session`] handle exposes the bound address for
    /// listener transports and tears the connection down on `disconnect`.
    pub async fn serve<B: TransportBuilder>(&self, builder: B) -> McpResult<Session> {
        let dispatcher = Arc::new(ServerDispatcher {
            inner: Arc::clone(&self.inner),
        });
        let session = Session::establish(builder, dispatcher).await?;
        *self.inner.session.write().await = Some(session.clone());
        info!(server = %self.inner.config.server_info.name, "MCP server session established");
        Ok(session)
    }

    /// Whether the initialize handshake has completed
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Client implementation info (available after `initialize`)
    pub async fn client_info(&self) -> Option<Implementation> {
        self.inner.client_info.read().await.clone()
    }

    /// Client capabilities (available after `initialize`)
    pub async fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.inner.client_capabilities.read().await.clone()
    }

    /// The protocol version agreed during `initialize`
    pub async fn negotiated_version(&self) -> Option<ProtocolVersion> {
        self.inner.negotiated_version.read().await.clone()
    }

    /// Register a tool with its handler
    ///
    /// Re-registering a name replaces the handler in place. Emits
    /// `notifications/tools/list_changed` once the session is initialized.
    pub async fn register_tool<F, Fut>(&self, tool: Tool, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Vec<Content>>> + Send + 'static,
    {
        let handler: ToolHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.inner.registries.register_tool(tool, handler).await;
        self.inner
            .notify(notifications::TOOLS_LIST_CHANGED, None)
            .await;
    }

    /// Remove a tool by name
    pub async fn remove_tool(&self, name: &str) -> bool {
        let removed = self.inner.registries.remove_tool(name).await;
        if removed {
            self.inner
                .notify(notifications::TOOLS_LIST_CHANGED, None)
                .await;
        }
        removed
    }

    /// Register a concrete resource with its handler
    pub async fn register_resource<F, Fut>(&self, resource: Resource, handler: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Vec<ResourceContents>>> + Send + 'static,
    {
        let handler: ResourceHandler = Arc::new(move |uri, _vars| Box::pin(handler(uri)));
        self.inner
            .registries
            .register_resource(resource, handler)
            .await;
        self.inner
            .notify(notifications::RESOURCES_LIST_CHANGED, None)
            .await;
    }

    /// Remove a resource by URI
    pub async fn remove_resource(&self, uri: &str) -> bool {
        let removed = self.inner.registries.remove_resource(uri).await;
        if removed {
            self.inner
                .notify(notifications::RESOURCES_LIST_CHANGED, None)
                .await;
        }
        removed
    }

    /// Register a resource template with its handler
    ///
    /// The handler receives the concrete URI and the expanded template
    /// variables.
    pub async fn register_resource_template<F, Fut>(
        &self,
        template: ResourceTemplate,
        handler: F,
    ) -> McpResult<()>
    where
        F: Fn(String, HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Vec<ResourceContents>>> + Send + 'static,
    {
        let handler: ResourceHandler = Arc::new(move |uri, vars| {
            Box::pin(handler(uri, vars.unwrap_or_default()))
        });
        self.inner
            .registries
            .register_template(template, handler)
            .await
            .map_err(|e| McpError::invalid_params(e.to_string()))?;
        self.inner
            .notify(notifications::RESOURCES_LIST_CHANGED, None)
            .await;
        Ok(())
    }

    /// Register a prompt with its handler
    pub async fn register_prompt<F, Fut>(&self, prompt: Prompt, handler: F)
    where
        F: Fn(HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<GetPromptResult>> + Send + 'static,
    {
        let handler: PromptHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.inner.registries.register_prompt(prompt, handler).await;
        self.inner
            .notify(notifications::PROMPTS_LIST_CHANGED, None)
            .await;
    }

    /// Remove a prompt by name
    pub async fn remove_prompt(&self, name: &str) -> bool {
        let removed = self.inner.registries.remove_prompt(name).await;
        if removed {
            self.inner
                .notify(notifications::PROMPTS_LIST_CHANGED, None)
                .await;
        }
        removed
    }

    /// Announce that a resource changed
    ///
    /// Emits `notifications/resources/updated` when the client is
    /// subscribed to the URI. Change detection belongs to the embedding
    /// application; the core only delivers the notification.
    pub async fn notify_resource_updated(&self, uri: &str) {
        if !self.inner.registries.is_subscribed(uri).await {
            return;
        }
        let params = ResourceUpdatedNotification {
            uri: uri.to_string(),
        };
        self.inner
            .notify(
                notifications::RESOURCES_UPDATED,
                serde_json::to_value(params).ok(),
            )
            .await;
    }
}

/// The server side of the inbound-dispatch capability interface
struct ServerDispatcher {
    inner: Arc<ServerInner>,
}

impl ServerDispatcher {
    fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
        serde_json::from_value(params.unwrap_or_else(|| json!({})))
            .map_err(|e| McpError::invalid_params(e.to_string()))
    }

    async fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let request: InitializeRequest = Self::parse_params(params)?;

        // Version negotiation: an unsupported offer falls back to the
        // default version; both sides record what was agreed.
        let negotiated = if request.protocol_version.is_supported() {
            request.protocol_version.clone()
        } else {
            ProtocolVersion::default_negotiated()
        };
        debug!(
            offered = %request.protocol_version,
            negotiated = %negotiated,
            client = %request.client_info.name,
            "initialize received"
        );

        *self.inner.client_info.write().await = Some(request.client_info);
        *self.inner.client_capabilities.write().await = Some(request.capabilities);
        *self.inner.negotiated_version.write().await = Some(negotiated.clone());

        let result = InitializeResult {
            protocol_version: negotiated,
            capabilities: self.inner.capabilities().await,
            server_info: self.inner.config.server_info.clone(),
            instructions: self.inner.config.instructions.clone(),
        };
        serde_json::to_value(result).map_err(|e| McpError::internal_error(e.to_string()))
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> McpResult<Value> {
        let request: CallToolRequest = Self::parse_params(params)?;
        let handler = self
            .inner
            .registries
            .lookup_tool(&request.name)
            .await
            .ok_or_else(|| McpError::method_not_found(request.name.clone()))?;

        let arguments = request.arguments.unwrap_or_else(|| json!({}));
        // Handler failure is surfaced to the caller as a tool-level error
        // envelope, not a protocol error.
        let result = match handler(arguments).await {
            Ok(content) => CallToolResult::success(content),
            Err(error) => CallToolResult::error_text(error.to_string()),
        };
        serde_json::to_value(result).map_err(|e| McpError::internal_error(e.to_string()))
    }

    async fn handle_read_resource(&self, params: Option<Value>) -> McpResult<Value> {
        let request: ReadResourceRequest = Self::parse_params(params)?;
        let matched = self
            .inner
            .registries
            .match_resource(&request.uri)
            .await
            .ok_or_else(|| McpError::resource_not_found(request.uri.clone()))?;

        let contents = (matched.handler)(request.uri, matched.variables).await?;
        serde_json::to_value(ReadResourceResult { contents })
            .map_err(|e| McpError::internal_error(e.to_string()))
    }

    async fn handle_get_prompt(&self, params: Option<Value>) -> McpResult<Value> {
        let request: GetPromptRequest = Self::parse_params(params)?;
        let handler = self
            .inner
            .registries
            .lookup_prompt(&request.name)
            .await
            .ok_or_else(|| McpError::method_not_found(request.name.clone()))?;

        let result = handler(request.arguments).await?;
        serde_json::to_value(result).map_err(|e| McpError::internal_error(e.to_string()))
    }

    async fn handle_subscribe(&self, params: Option<Value>, subscribe: bool) -> McpResult<Value> {
        let request: SubscribeResourceRequest = Self::parse_params(params)?;
        if subscribe {
            self.inner.registries.subscribe(&request.uri).await;
        } else {
            self.inner.registries.unsubscribe(&request.uri).await;
        }
        Ok(json!({}))
    }

    async fn handle_set_level(&self, params: Option<Value>) -> McpResult<Value> {
        let handler = self
            .inner
            .logging
            .as_ref()
            .ok_or_else(|| McpError::method_not_found(methods::LOGGING_SET_LEVEL))?;
        let request: SetLevelRequest = Self::parse_params(params)?;
        handler.set_level(request.level).await?;
        Ok(json!({}))
    }
}

#[async_trait]
impl InboundDispatcher for ServerDispatcher {
    async fn handle_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        let method = request.method.as_str();

        // Until the client confirms the handshake, only initialize and
        // ping traffic is served.
        if !self.inner.initialized.load(Ordering::SeqCst)
            && !matches!(method, methods::INITIALIZE | methods::PING)
        {
            return Err(McpError::internal_error("server not initialized"));
        }

        match method {
            methods::INITIALIZE => self.handle_initialize(request.params).await,
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => {
                let result = ListToolsResult {
                    tools: self.inner.registries.list_tools().await,
                    next_cursor: None,
                };
                serde_json::to_value(result).map_err(|e| McpError::internal_error(e.to_string()))
            }
            methods::TOOLS_CALL => self.handle_call_tool(request.params).await,
            methods::RESOURCES_LIST => {
                let result = ListResourcesResult {
                    resources: self.inner.registries.list_resources().await,
                    next_cursor: None,
                };
                serde_json::to_value(result).map_err(|e| McpError::internal_error(e.to_string()))
            }
            methods::RESOURCES_TEMPLATES_LIST => {
                let result = ListResourceTemplatesResult {
                    resource_templates: self.inner.registries.list_templates().await,
                    next_cursor: None,
                };
                serde_json::to_value(result).map_err(|e| McpError::internal_error(e.to_string()))
            }
            methods::RESOURCES_READ => self.handle_read_resource(request.params).await,
            methods::RESOURCES_SUBSCRIBE => self.handle_subscribe(request.params, true).await,
            methods::RESOURCES_UNSUBSCRIBE => self.handle_subscribe(request.params, false).await,
            methods::PROMPTS_LIST => {
                let result = ListPromptsResult {
                    prompts: self.inner.registries.list_prompts().await,
                    next_cursor: None,
                };
                serde_json::to_value(result).map_err(|e| McpError::internal_error(e.to_string()))
            }
            methods::PROMPTS_GET => self.handle_get_prompt(request.params).await,
            methods::LOGGING_SET_LEVEL => self.handle_set_level(request.params).await,
            unknown => Err(McpError::method_not_found(unknown)),
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            notifications::INITIALIZED => {
                self.inner.initialized.store(true, Ordering::SeqCst);
                info!("client completed the initialize handshake");
            }
            notifications::CANCELLED => {
                // Best effort: in-flight handlers run to completion; the
                // peer discards the eventual response itself.
                if let Ok(cancelled) =
                    serde_json::from_value::<CancelledNotification>(
                        notification.params.unwrap_or_else(|| json!({})),
                    )
                {
                    debug!(id = %cancelled.request_id, "client cancelled a request");
                }
            }
            other => {
                debug!(method = other, "ignoring unknown notification");
            }
        }
    }
}
