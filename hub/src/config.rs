//! Hub configuration types.
//!
//! Defines configuration structures for upstream MCP servers, access groups,
//! HTTP API tools, and the event bus. All shapes are concrete records with
//! defaults filled at load; cross-references are checked by [`HubConfig::validate`].

use std::{collections::HashMap, collections::HashSet, fmt};

use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};

/// Reserved server id under which API tools are exposed.
pub const API_TOOLS_SERVER_ID: &str = "api-tools";

/// Group id used when a caller does not name one.
pub const DEFAULT_GROUP_ID: &str = "default";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HubConfig {
    /// Upstream MCP servers (connected at startup).
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,

    /// Access groups scoping servers and tools.
    #[serde(default)]
    pub groups: Vec<GroupConfig>,

    /// HTTP API tools exposed under the `api-tools` server id.
    #[serde(default)]
    pub api_tools: Vec<ApiToolConfig>,

    /// Event bus tuning.
    #[serde(default)]
    pub events: EventBusConfig,
}

impl HubConfig {
    /// Cross-reference validation, run once at load time.
    ///
    /// Surfaces configuration errors as fatal: duplicate identifiers, group
    /// references to unknown servers, and empty API tool ids.
    pub fn validate(&self) -> HubResult<()> {
        let mut server_names = HashSet::new();
        for server in &self.servers {
            if server.name.is_empty() {
                return Err(HubError::Config("server with empty name".into()));
            }
            if server.name == API_TOOLS_SERVER_ID {
                return Err(HubError::Config(format!(
                    "server name '{API_TOOLS_SERVER_ID}' is reserved"
                )));
            }
            if !server_names.insert(server.name.as_str()) {
                return Err(HubError::Config(format!(
                    "duplicate server name '{}'",
                    server.name
                )));
            }
        }

        let mut group_ids = HashSet::new();
        for group in &self.groups {
            if group.id.is_empty() {
                return Err(HubError::Config("group with empty id".into()));
            }
            if !group_ids.insert(group.id.as_str()) {
                return Err(HubError::Config(format!("duplicate group id '{}'", group.id)));
            }
            for server in &group.servers {
                if !server_names.contains(server.as_str()) {
                    return Err(HubError::Config(format!(
                        "group '{}' references unknown server '{}'",
                        group.id, server
                    )));
                }
            }
        }

        let mut tool_ids = HashSet::new();
        for tool in &self.api_tools {
            if tool.id.is_empty() {
                return Err(HubError::Config("api tool with empty id".into()));
            }
            if !tool_ids.insert(tool.id.as_str()) {
                return Err(HubError::Config(format!(
                    "duplicate api tool id '{}'",
                    tool.id
                )));
            }
        }

        Ok(())
    }

    /// Names of all enabled servers, in configured order.
    pub fn enabled_server_names(&self) -> Vec<String> {
        self.servers
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpServerConfig {
    pub name: String,
    #[serde(flatten)]
    pub transport: McpTransport,

    /// Extra environment entries passed to the upstream process (stdio only).
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Disabled servers are skipped at connection time; no pool entry is created.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        envs: HashMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
    Streamable {
        url: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
}

impl fmt::Debug for McpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McpTransport::Stdio { command, args, .. } => f
                .debug_struct("Stdio")
                .field("command", command)
                .field("args", args)
                .finish(),
            McpTransport::Sse { url, headers } => f
                .debug_struct("Sse")
                .field("url", url)
                .field("headers", &format!("{} headers", headers.len()))
                .finish(),
            McpTransport::Streamable { url, headers } => f
                .debug_struct("Streamable")
                .field("url", url)
                .field("headers", &format!("{} headers", headers.len()))
                .finish(),
        }
    }
}

/// Named access scope: which servers are reachable and which tools are allowed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered: on duplicate tool names the first owning server wins.
    #[serde(default)]
    pub servers: Vec<String>,
    /// Empty = every tool from the listed servers is allowed.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

impl GroupConfig {
    pub fn allows_tool(&self, tool_name: &str) -> bool {
        self.allowed_tools.is_empty() || self.allowed_tools.iter().any(|t| t == tool_name)
    }
}

/// A tool defined entirely by an HTTP request template.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiToolConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub request: ApiRequestSpec,
    /// JSON-schema-shaped parameter description.
    #[serde(default = "default_parameters")]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub response: ApiResponseSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<ApiCacheSpec>,
}

impl ApiToolConfig {
    /// Display name, falling back to the id.
    pub fn tool_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiRequestSpec {
    /// URL template; supports `{{data.*}}` and `{{env.*}}` substitution.
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub query: HashMap<String, String>,
    /// Body template; strings inside are substituted recursively.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiResponseSpec {
    /// Optional transformation expression applied to the parsed body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiCacheSpec {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventBusConfig {
    /// Bounded outbound queue per subscriber.
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            subscriber_queue: default_subscriber_queue(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_subscriber_queue() -> usize {
    64
}

fn default_parameters() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}
