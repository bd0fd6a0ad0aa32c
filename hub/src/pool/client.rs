//! Upstream MCP client seam.
//!
//! The pool talks to upstream servers through [`McpClient`]; production code
//! connects via [`McpConnector`] implementations, tests substitute scripted
//! fakes. The contract is deliberately minimal: connect, list tools, call a
//! tool, liveness, close.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{config::McpServerConfig, error::HubResult};

/// A tool as reported by an upstream server, before the pool stamps the
/// owning server id onto it.
#[derive(Debug, Clone)]
pub struct DiscoveredTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Live connection to one upstream MCP server.
#[async_trait]
pub trait McpClient: Send + Sync {
    async fn list_tools(&self) -> HubResult<Vec<DiscoveredTool>>;

    /// Execute a tool; the result is the upstream's raw JSON shape.
    async fn call_tool(&self, name: &str, args: serde_json::Value) -> HubResult<serde_json::Value>;

    /// Cheap liveness probe used by health checks.
    fn is_alive(&self) -> bool;

    /// Release the underlying transport. Further calls fail.
    async fn close(&self);
}

/// Factory turning a server config into a live client.
#[async_trait]
pub trait McpConnector: Send + Sync {
    async fn connect(&self, config: &McpServerConfig) -> HubResult<Arc<dyn McpClient>>;
}
