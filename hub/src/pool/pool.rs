//! Server pool: owns upstream connections and their state machines.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    client::{McpClient, McpConnector},
    reconnect::{BackoffPolicy, MAX_RECONNECT_ATTEMPTS},
    state::{ServerInfo, ServerStatus},
};
use crate::{
    config::McpServerConfig,
    error::{HubError, HubResult},
    metrics::HubMetrics,
    types::ToolDescriptor,
};

/// Called on every status transition: (server, new status, optional detail).
/// Tool discovery for a freshly connected server completes before the
/// listener observes `Connected`.
pub type StatusListener = Arc<dyn Fn(&str, ServerStatus, Option<&str>) + Send + Sync>;

struct ServerRuntime {
    status: ServerStatus,
    client: Option<Arc<dyn McpClient>>,
    tools: Vec<ToolDescriptor>,
    last_connected: Option<chrono::DateTime<Utc>>,
    last_error: Option<String>,
    reconnect_attempts: u32,
    health_checks: u64,
}

impl ServerRuntime {
    fn new() -> Self {
        Self {
            status: ServerStatus::Disconnected,
            client: None,
            tools: Vec::new(),
            last_connected: None,
            last_error: None,
            reconnect_attempts: 0,
            health_checks: 0,
        }
    }

    /// Tools are only ever non-empty while connected.
    fn set_status(&mut self, status: ServerStatus) {
        if !status.is_connected() {
            self.tools.clear();
        }
        self.status = status;
    }
}

struct ServerEntry {
    config: McpServerConfig,
    runtime: RwLock<ServerRuntime>,
}

/// Owns connections to upstream MCP servers; tracks state, reconnects,
/// discovers tools. Per-server failures are isolated.
pub struct ServerPool {
    configs: HashMap<String, McpServerConfig>,
    /// Configured order, used for deterministic iteration.
    order: Vec<String>,
    servers: DashMap<String, Arc<ServerEntry>>,
    connector: Arc<dyn McpConnector>,
    listeners: RwLock<Vec<StatusListener>>,
    backoff: BackoffPolicy,
    metrics: Arc<HubMetrics>,
    shut_down: AtomicBool,
}

impl ServerPool {
    pub fn new(
        configs: Vec<McpServerConfig>,
        connector: Arc<dyn McpConnector>,
        metrics: Arc<HubMetrics>,
    ) -> Self {
        let order: Vec<String> = configs.iter().map(|c| c.name.clone()).collect();
        let configs = configs.into_iter().map(|c| (c.name.clone(), c)).collect();
        Self {
            configs,
            order,
            servers: DashMap::new(),
            connector,
            listeners: RwLock::new(Vec::new()),
            backoff: BackoffPolicy::default(),
            metrics,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Register a status listener. Listeners run inline on the transitioning
    /// task and must not block.
    pub fn add_status_listener(&self, listener: StatusListener) {
        self.listeners.write().push(listener);
    }

    fn notify(&self, server: &str, status: ServerStatus, message: Option<&str>) {
        for listener in self.listeners.read().iter() {
            listener(server, status, message);
        }
    }

    /// Connect every enabled server in parallel. Initialization succeeds if
    /// at least one server comes up (or none are enabled); it fails only
    /// when every enabled server fails.
    pub async fn initialize_all(&self) -> HubResult<()> {
        let enabled: Vec<String> = self
            .order
            .iter()
            .filter(|name| self.configs.get(*name).map(|c| c.enabled).unwrap_or(false))
            .cloned()
            .collect();
        if enabled.is_empty() {
            info!("no enabled MCP servers configured");
            return Ok(());
        }

        let results = futures::future::join_all(
            enabled.iter().map(|name| self.create_connection(name)),
        )
        .await;

        let connected = results.iter().filter(|r| r.is_ok()).count();
        if connected == 0 {
            let detail: Vec<String> = enabled
                .iter()
                .zip(&results)
                .filter_map(|(name, r)| {
                    r.as_ref().err().map(|e| format!("{name}: {e}"))
                })
                .collect();
            return Err(HubError::ConnectionFailed(format!(
                "all servers failed to connect: {}",
                detail.join("; ")
            )));
        }
        info!(connected, total = enabled.len(), "server pool initialized");
        Ok(())
    }

    /// Create (or re-create) the connection for a configured server.
    ///
    /// Idempotent: an existing entry is closed first. Disabled servers are
    /// skipped without creating an entry. On failure the entry is left in
    /// the error state and the failure is surfaced.
    pub async fn create_connection(&self, name: &str) -> HubResult<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(HubError::ShuttingDown);
        }
        let config = self
            .configs
            .get(name)
            .ok_or_else(|| HubError::ServerNotFound(name.to_string()))?
            .clone();
        if !config.enabled {
            debug!(server = name, "skipping disabled server");
            return Ok(());
        }

        if self.servers.contains_key(name) {
            self.close_connection(name).await?;
        }

        let entry = Arc::new(ServerEntry {
            config: config.clone(),
            runtime: RwLock::new(ServerRuntime::new()),
        });
        entry.runtime.write().set_status(ServerStatus::Connecting);
        self.servers.insert(name.to_string(), Arc::clone(&entry));
        self.notify(name, ServerStatus::Connecting, None);

        match self.connector.connect(&config).await {
            Ok(client) => {
                self.finish_connect(name, &entry, client).await;
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                {
                    let mut runtime = entry.runtime.write();
                    runtime.set_status(ServerStatus::Error);
                    runtime.last_error = Some(message.clone());
                }
                self.metrics.record_connection_error();
                error!(server = name, error = %message, "connection failed");
                self.notify(name, ServerStatus::Error, Some(&message));
                Err(HubError::ConnectionFailed(format!("{name}: {message}")))
            }
        }
    }

    /// Discovery runs right after the handshake; a discovery failure leaves
    /// the tool list empty but the server stays connected.
    async fn finish_connect(&self, name: &str, entry: &Arc<ServerEntry>, client: Arc<dyn McpClient>) {
        let tools = match client.list_tools().await {
            Ok(discovered) => {
                info!(server = name, count = discovered.len(), "discovered tools");
                discovered
                    .into_iter()
                    .map(|t| ToolDescriptor {
                        name: t.name,
                        description: t.description,
                        input_schema: t.input_schema,
                        server: name.to_string(),
                    })
                    .collect()
            }
            Err(e) => {
                warn!(server = name, error = %e, "tool discovery failed");
                Vec::new()
            }
        };

        {
            let mut runtime = entry.runtime.write();
            runtime.set_status(ServerStatus::Connected);
            runtime.client = Some(client);
            runtime.tools = tools;
            runtime.last_connected = Some(Utc::now());
            runtime.last_error = None;
            runtime.reconnect_attempts = 0;
        }
        self.notify(name, ServerStatus::Connected, None);
    }

    /// Gracefully close a connection and remove the entry from the pool.
    pub async fn close_connection(&self, name: &str) -> HubResult<()> {
        let Some((_, entry)) = self.servers.remove(name) else {
            return Ok(());
        };
        let client = {
            let mut runtime = entry.runtime.write();
            runtime.set_status(ServerStatus::Disconnected);
            runtime.client.take()
        };
        if let Some(client) = client {
            client.close().await;
        }
        self.notify(name, ServerStatus::Disconnected, None);
        Ok(())
    }

    /// One reconnect attempt for a server in the error state.
    ///
    /// Applies the backoff delay for the upcoming attempt, then tries to
    /// connect. The attempt counter only grows while reconnecting and never
    /// exceeds [`MAX_RECONNECT_ATTEMPTS`].
    pub async fn reconnect(&self, name: &str) -> HubResult<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(HubError::ShuttingDown);
        }
        let entry = self.entry(name)?;

        let attempt = {
            let mut runtime = entry.runtime.write();
            if runtime.status != ServerStatus::Error {
                return Err(HubError::ConnectionFailed(format!(
                    "server '{name}' is not in error state (status: {})",
                    runtime.status
                )));
            }
            if runtime.reconnect_attempts >= MAX_RECONNECT_ATTEMPTS {
                return Err(HubError::ConnectionFailed(format!(
                    "server '{name}' exhausted {MAX_RECONNECT_ATTEMPTS} reconnect attempts"
                )));
            }
            runtime.set_status(ServerStatus::Reconnecting);
            runtime.reconnect_attempts + 1
        };
        self.notify(name, ServerStatus::Reconnecting, None);
        self.metrics.record_reconnect_attempt();

        tokio::time::sleep(self.backoff.delay(attempt)).await;

        match self.connector.connect(&entry.config).await {
            Ok(client) => {
                info!(server = name, attempt, "reconnected");
                self.finish_connect(name, &entry, client).await;
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                {
                    let mut runtime = entry.runtime.write();
                    runtime.set_status(ServerStatus::Error);
                    runtime.last_error = Some(message.clone());
                    runtime.reconnect_attempts += 1;
                }
                self.metrics.record_connection_error();
                warn!(server = name, attempt, error = %message, "reconnect attempt failed");
                self.notify(name, ServerStatus::Error, Some(&message));
                Err(HubError::ConnectionFailed(format!("{name}: {message}")))
            }
        }
    }

    /// True only when the server is connected and its client answers the
    /// liveness probe. A dead client demotes the server to the error state.
    pub async fn health_check(&self, name: &str) -> bool {
        let Ok(entry) = self.entry(name) else {
            return false;
        };
        let client = {
            let mut runtime = entry.runtime.write();
            runtime.health_checks += 1;
            if runtime.status != ServerStatus::Connected {
                return false;
            }
            runtime.client.clone()
        };
        let alive = client.map(|c| c.is_alive()).unwrap_or(false);
        if !alive {
            let message = "health check failed";
            {
                let mut runtime = entry.runtime.write();
                runtime.set_status(ServerStatus::Error);
                runtime.client = None;
                runtime.last_error = Some(message.to_string());
            }
            warn!(server = name, "health check failed; marking server errored");
            self.notify(name, ServerStatus::Error, Some(message));
        }
        alive
    }

    /// Forward a tool call to the owning server.
    pub async fn execute_tool(
        &self,
        name: &str,
        tool_name: &str,
        args: serde_json::Value,
        cancel: &CancellationToken,
    ) -> HubResult<serde_json::Value> {
        let entry = self.entry(name)?;
        let client = {
            let runtime = entry.runtime.read();
            if runtime.status != ServerStatus::Connected {
                return Err(HubError::ServerNotConnected {
                    server: name.to_string(),
                    status: runtime.status.to_string(),
                });
            }
            if !runtime.tools.iter().any(|t| t.name == tool_name) {
                return Err(HubError::ToolNotFound(format!("{name}:{tool_name}")));
            }
            runtime
                .client
                .clone()
                .ok_or_else(|| HubError::ServerNotConnected {
                    server: name.to_string(),
                    status: runtime.status.to_string(),
                })?
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(HubError::Cancelled),
            result = client.call_tool(tool_name, args) => result,
        }
    }

    /// Cached tool list; empty unless connected.
    pub fn server_tools(&self, name: &str) -> Vec<ToolDescriptor> {
        self.servers
            .get(name)
            .map(|entry| {
                let runtime = entry.runtime.read();
                if runtime.status.is_connected() {
                    runtime.tools.clone()
                } else {
                    Vec::new()
                }
            })
            .unwrap_or_default()
    }

    pub fn server_status(&self, name: &str) -> Option<ServerStatus> {
        self.servers.get(name).map(|e| e.runtime.read().status)
    }

    pub fn server_info(&self, name: &str) -> Option<ServerInfo> {
        self.servers.get(name).map(|entry| {
            let runtime = entry.runtime.read();
            ServerInfo {
                name: name.to_string(),
                status: runtime.status,
                enabled: entry.config.enabled,
                tool_count: runtime.tools.len(),
                last_connected: runtime.last_connected,
                last_error: runtime.last_error.clone(),
                reconnect_attempts: runtime.reconnect_attempts,
                health_checks: runtime.health_checks,
            }
        })
    }

    /// Snapshots for every pooled server, in configured order.
    pub fn server_infos(&self) -> Vec<ServerInfo> {
        self.order
            .iter()
            .filter_map(|name| self.server_info(name))
            .collect()
    }

    /// Configured server names (enabled or not), in configured order.
    pub fn configured_servers(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Names of servers currently connected, in configured order.
    pub fn connected_servers(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| {
                self.server_status(name)
                    .map(ServerStatus::is_connected)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    /// Close every connection and clear the pool. Idempotent; concurrent
    /// calls coalesce on the flag.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let names: Vec<String> = self.servers.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, entry)) = self.servers.remove(&name) {
                let client = {
                    let mut runtime = entry.runtime.write();
                    runtime.set_status(ServerStatus::Disconnected);
                    runtime.client.take()
                };
                if let Some(client) = client {
                    client.close().await;
                }
            }
        }
        info!("server pool shut down");
    }

    fn entry(&self, name: &str) -> HubResult<Arc<ServerEntry>> {
        self.servers
            .get(name)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| HubError::ServerNotFound(name.to_string()))
    }
}
