//! Server Registries
//!
//! Insertion-ordered registries for tools, resources, resource templates,
//! and prompts. Entries are plain descriptor records with an attached async
//! handler closure; no polymorphism is needed.
//!
//! Lookup resolves the handler `Arc` at dispatch time, so mutating a
//! registry while a call is in flight never affects that call. Names are
//! unique within a registry: re-registering a name replaces the handler in
//! place, keeping its order position.

// Layer 1: Standard library imports
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

// Layer 3: Internal module imports
use super::error::McpResult;
use super::uri_template::UriTemplate;
use crate::protocol::{
    Content, GetPromptResult, Prompt, ProtocolResult, Resource, ResourceContents,
    ResourceTemplate, Tool,
};

/// Async handler invoked by `tools/call`
pub type ToolHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, McpResult<Vec<Content>>> + Send + Sync>;

/// Async handler invoked by `resources/read`
///
/// Receives the concrete URI and, for template-matched reads, the expanded
/// variables.
pub type ResourceHandler = Arc<
    dyn Fn(String, Option<HashMap<String, String>>) -> BoxFuture<'static, McpResult<Vec<ResourceContents>>>
        + Send
        + Sync,
>;

/// Async handler invoked by `prompts/get`
pub type PromptHandler = Arc<
    dyn Fn(HashMap<String, String>) -> BoxFuture<'static, McpResult<GetPromptResult>> + Send + Sync,
>;

struct ToolEntry {
    tool: Tool,
    handler: ToolHandler,
}

struct ResourceEntry {
    resource: Resource,
    handler: ResourceHandler,
}

struct TemplateEntry {
    descriptor: ResourceTemplate,
    template: UriTemplate,
    handler: ResourceHandler,
}

struct PromptEntry {
    prompt: Prompt,
    handler: PromptHandler,
}

/// The outcome of resolving a `resources/read` URI
pub(crate) struct ResourceMatch {
    pub handler: ResourceHandler,
    pub variables: Option<HashMap<String, String>>,
}

/// All four registries plus the resource-subscription set
#[derive(Default)]
pub(crate) struct Registries {
    tools: RwLock<Vec<ToolEntry>>,
    resources: RwLock<Vec<ResourceEntry>>,
    templates: RwLock<Vec<TemplateEntry>>,
    prompts: RwLock<Vec<PromptEntry>>,
    subscriptions: RwLock<HashSet<String>>,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    // Tools

    pub async fn register_tool(&self, tool: Tool, handler: ToolHandler) {
        let mut entries = self.tools.write().await;
        debug!(name = %tool.name, "registering tool");
        match entries.iter_mut().find(|entry| entry.tool.name == tool.name) {
            Some(existing) => *existing = ToolEntry { tool, handler },
            None => entries.push(ToolEntry { tool, handler }),
        }
    }

    pub async fn remove_tool(&self, name: &str) -> bool {
        let mut entries = self.tools.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.tool.name != name);
        entries.len() != before
    }

    pub async fn list_tools(&self) -> Vec<Tool> {
        self.tools
            .read()
            .await
            .iter()
            .map(|entry| entry.tool.clone())
            .collect()
    }

    pub async fn lookup_tool(&self, name: &str) -> Option<ToolHandler> {
        self.tools
            .read()
            .await
            .iter()
            .find(|entry| entry.tool.name == name)
            .map(|entry| Arc::clone(&entry.handler))
    }

    pub async fn has_tools(&self) -> bool {
        !self.tools.read().await.is_empty()
    }

    // Resources

    pub async fn register_resource(&self, resource: Resource, handler: ResourceHandler) {
        let mut entries = self.resources.write().await;
        debug!(uri = %resource.uri, "registering resource");
        match entries
            .iter_mut()
            .find(|entry| entry.resource.uri == resource.uri)
        {
            Some(existing) => *existing = ResourceEntry { resource, handler },
            None => entries.push(ResourceEntry { resource, handler }),
        }
    }

    pub async fn remove_resource(&self, uri: &str) -> bool {
        let mut entries = self.resources.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.resource.uri != uri);
        entries.len() != before
    }

    pub async fn list_resources(&self) -> Vec<Resource> {
        self.resources
            .read()
            .await
            .iter()
            .map(|entry| entry.resource.clone())
            .collect()
    }

    // Resource templates

    pub async fn register_template(
        &self,
        descriptor: ResourceTemplate,
        handler: ResourceHandler,
    ) -> ProtocolResult<()> {
        let template = UriTemplate::parse(&descriptor.uri_template)?;
        let mut entries = self.templates.write().await;
        debug!(template = %descriptor.uri_template, "registering resource template");
        match entries
            .iter_mut()
            .find(|entry| entry.descriptor.uri_template == descriptor.uri_template)
        {
            Some(existing) => {
                *existing = TemplateEntry {
                    descriptor,
                    template,
                    handler,
                }
            }
            None => entries.push(TemplateEntry {
                descriptor,
                template,
                handler,
            }),
        }
        Ok(())
    }

    pub async fn list_templates(&self) -> Vec<ResourceTemplate> {
        self.templates
            .read()
            .await
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    pub async fn has_resources(&self) -> bool {
        !self.resources.read().await.is_empty() || !self.templates.read().await.is_empty()
    }

    /// Resolve a `resources/read` URI
    ///
    /// Concrete resources win over templates; among templates, the first
    /// inserted that matches wins.
    pub async fn match_resource(&self, uri: &str) -> Option<ResourceMatch> {
        if let Some(entry) = self
            .resources
            .read()
            .await
            .iter()
            .find(|entry| entry.resource.uri == uri)
        {
            return Some(ResourceMatch {
                handler: Arc::clone(&entry.handler),
                variables: None,
            });
        }
        for entry in self.templates.read().await.iter() {
            if let Some(variables) = entry.template.matches(uri) {
                return Some(ResourceMatch {
                    handler: Arc::clone(&entry.handler),
                    variables: Some(variables),
                });
            }
        }
        None
    }

    // Prompts

    pub async fn register_prompt(&self, prompt: Prompt, handler: PromptHandler) {
        let mut entries = self.prompts.write().await;
        debug!(name = %prompt.name, "registering prompt");
        match entries
            .iter_mut()
            .find(|entry| entry.prompt.name == prompt.name)
        {
            Some(existing) => *existing = PromptEntry { prompt, handler },
            None => entries.push(PromptEntry { prompt, handler }),
        }
    }

    pub async fn remove_prompt(&self, name: &str) -> bool {
        let mut entries = self.prompts.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.prompt.name != name);
        entries.len() != before
    }

    pub async fn list_prompts(&self) -> Vec<Prompt> {
        self.prompts
            .read()
            .await
            .iter()
            .map(|entry| entry.prompt.clone())
            .collect()
    }

    pub async fn lookup_prompt(&self, name: &str) -> Option<PromptHandler> {
        self.prompts
            .read()
            .await
            .iter()
            .find(|entry| entry.prompt.name == name)
            .map(|entry| Arc::clone(&entry.handler))
    }

    pub async fn has_prompts(&self) -> bool {
        !self.prompts.read().await.is_empty()
    }

    // Subscriptions

    pub async fn subscribe(&self, uri: &str) {
        self.subscriptions.write().await.insert(uri.to_string());
    }

    pub async fn unsubscribe(&self, uri: &str) {
        self.subscriptions.write().await.remove(uri);
    }

    pub async fn is_subscribed(&self, uri: &str) -> bool {
        self.subscriptions.read().await.contains(uri)
    }
}
