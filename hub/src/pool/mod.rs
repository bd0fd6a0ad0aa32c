//! Server pool: upstream connection lifecycle, state, discovery.

pub mod client;
pub mod pool;
pub mod reconnect;
pub mod rmcp_client;
pub mod state;

pub use client::{DiscoveredTool, McpClient, McpConnector};
pub use pool::{ServerPool, StatusListener};
pub use reconnect::{BackoffPolicy, MAX_RECONNECT_ATTEMPTS};
pub use rmcp_client::{RmcpClient, RmcpConnector};
pub use state::{ServerInfo, ServerStatus};
