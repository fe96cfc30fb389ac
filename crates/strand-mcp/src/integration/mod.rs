//! Integration Layer
//!
//! The high-level MCP roles: [`McpServer`] with its registries and
//! dispatch, [`McpClient`] with its typed operations, the public
//! [`McpError`] taxonomy, and URI-template matching for resource dispatch.

pub mod client;
pub mod error;
pub(crate) mod registry;
pub mod server;
pub mod uri_template;

pub use client::{McpClient, McpClientBuilder, McpClientConfig};
pub use error::{McpError, McpResult};
pub use server::{LoggingHandler, McpServer, McpServerBuilder, McpServerConfig};
pub use uri_template::UriTemplate;
