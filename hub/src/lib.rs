//! MCP Hub aggregation engine.
//!
//! Federates independently-running MCP tool servers and config-driven HTTP
//! API tools behind a single facade, with group-scoped access control.
//!
//! ## Modules
//!
//! - [`pool`]: upstream server connections, state machine, tool discovery
//! - [`bridge`]: HTTP endpoints exposed as tools under `api-tools`
//! - [`catalog`]: per-group tool lists with TTL caching
//! - [`access`]: group and tool-access resolution
//! - [`dispatch`]: the call pipeline (validate, route, retry, normalize)
//! - [`event`]: in-process pub/sub with bounded replay
//! - [`facade`]: the outward-facing [`HubService`]
//! - [`lifecycle`]: ordered startup and coalescing shutdown

pub mod access;
pub mod bridge;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod facade;
pub mod lifecycle;
pub mod metrics;
pub mod pool;
pub mod types;

pub use access::GroupRegistry;
pub use bridge::{ApiToolBridge, BridgeHealth};
pub use catalog::{CatalogStats, ToolCatalog, CATALOG_TTL};
pub use config::{
    ApiCacheSpec, ApiRequestSpec, ApiResponseSpec, ApiToolConfig, GroupConfig, HubConfig,
    McpServerConfig, McpTransport, API_TOOLS_SERVER_ID, DEFAULT_GROUP_ID,
};
pub use dispatch::{DispatchEngine, MAX_ATTEMPTS};
pub use error::{HubError, HubResult};
pub use event::{EventBus, EventPayload, EventType, HubEvent};
pub use facade::{
    GroupInfo, HealthState, HubService, ServiceDiagnostics, ServiceStatus, INIT_DEADLINE,
};
pub use lifecycle::{LifecycleCoordinator, LifecyclePhase};
pub use metrics::{HubMetrics, MetricsSnapshot};
pub use pool::{
    DiscoveredTool, McpClient, McpConnector, RmcpConnector, ServerInfo, ServerPool, ServerStatus,
    MAX_RECONNECT_ATTEMPTS,
};
pub use types::{ToolContent, ToolDescriptor, ToolResult};
