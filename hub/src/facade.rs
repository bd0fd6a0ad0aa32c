//! Hub service facade.
//!
//! One instance per process. Composes the server pool, API-tool bridge,
//! catalog, access resolver, dispatch engine, and event bus behind the
//! operations external transports call. No [`HubError`] escapes
//! [`HubService::call_tool`]; every failure is folded into a canonical
//! error result.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::{
    access::GroupRegistry,
    bridge::{ApiToolBridge, BridgeHealth},
    catalog::{CatalogStats, ToolCatalog},
    config::{ApiToolConfig, GroupConfig, HubConfig, DEFAULT_GROUP_ID},
    dispatch::DispatchEngine,
    error::{HubError, HubResult},
    event::{EventBus, EventPayload, EventType, HubEvent},
    lifecycle::{InFlightTracker, LifecycleCoordinator, LifecyclePhase, SHUTDOWN_DRAIN_DEADLINE},
    metrics::{HubMetrics, MetricsSnapshot},
    pool::{McpConnector, RmcpConnector, ServerInfo, ServerPool},
    types::{ToolDescriptor, ToolResult},
};

/// Overall initialization deadline.
pub const INIT_DEADLINE: Duration = Duration::from_secs(30);

/// Aggregate health states reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Initializing,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub status: HealthState,
    pub phase: LifecyclePhase,
    pub connected_servers: usize,
    pub total_servers: usize,
    pub api_tool_count: usize,
    pub subscriber_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupInfo {
    #[serde(flatten)]
    pub group: GroupConfig,
    /// Per-server health snapshots for the group's members.
    pub server_health: Vec<ServerInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventBusStats {
    pub subscriber_count: usize,
    pub buffered_events: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceDiagnostics {
    pub status: ServiceStatus,
    pub servers: Vec<ServerInfo>,
    pub catalog: CatalogStats,
    pub api_bridge: BridgeHealth,
    pub events: EventBusStats,
    pub metrics: MetricsSnapshot,
}

pub struct HubService {
    config: HubConfig,
    metrics: Arc<HubMetrics>,
    events: Arc<EventBus>,
    pool: Arc<ServerPool>,
    bridge: Arc<ApiToolBridge>,
    groups: Arc<GroupRegistry>,
    catalog: Arc<ToolCatalog>,
    dispatch: Arc<DispatchEngine>,
    lifecycle: LifecycleCoordinator,
    in_flight: InFlightTracker,
    ticker: RwLock<Option<tokio::task::JoinHandle<()>>>,
    started_at: RwLock<Option<DateTime<Utc>>>,
}

impl HubService {
    /// Build with the production rmcp connector.
    pub fn new(config: HubConfig) -> HubResult<Self> {
        Self::with_connector(config, Arc::new(RmcpConnector))
    }

    /// Build with a caller-supplied connector (tests use scripted fakes).
    pub fn with_connector(config: HubConfig, connector: Arc<dyn McpConnector>) -> HubResult<Self> {
        config.validate()?;

        let metrics = Arc::new(HubMetrics::new());
        let events = Arc::new(EventBus::new(
            config.events.subscriber_queue,
            Arc::clone(&metrics),
        ));
        let pool = Arc::new(ServerPool::new(
            config.servers.clone(),
            connector,
            Arc::clone(&metrics),
        ));
        let bridge = Arc::new(ApiToolBridge::new(config.api_tools.clone())?);
        let groups = Arc::new(GroupRegistry::new(config.groups.clone(), Arc::clone(&pool)));
        let catalog = Arc::new(ToolCatalog::new(
            Arc::clone(&pool),
            Arc::clone(&bridge),
            Arc::clone(&groups),
        ));
        let dispatch = Arc::new(DispatchEngine::new(
            Arc::clone(&pool),
            Arc::clone(&bridge),
            Arc::clone(&groups),
            Arc::clone(&events),
            Arc::clone(&metrics),
        ));

        // State changes invalidate the catalog before subscribers hear about
        // them; discovery has already populated the tool list by the time the
        // listener observes `connected`.
        let catalog_listener = Arc::clone(&catalog);
        let events_listener = Arc::clone(&events);
        pool.add_status_listener(Arc::new(move |server, status, message| {
            catalog_listener.invalidate_for_server(server);
            events_listener.publish(EventPayload::ServerStatus {
                server: server.to_string(),
                status,
                message: message.map(str::to_string),
            });
        }));

        Ok(Self {
            config,
            metrics,
            events,
            pool,
            bridge,
            groups,
            catalog,
            dispatch,
            lifecycle: LifecycleCoordinator::new(),
            in_flight: InFlightTracker::new(),
            ticker: RwLock::new(None),
            started_at: RwLock::new(None),
        })
    }

    /// Bring the hub up: event ticker first, then all upstream connections
    /// in parallel. Succeeds when at least one server connects (or none are
    /// configured); enforces the 30 s deadline.
    pub async fn initialize(&self) -> HubResult<()> {
        match self.lifecycle.phase() {
            LifecyclePhase::Created => {}
            LifecyclePhase::Running => return Ok(()),
            phase => {
                return Err(HubError::Internal(format!(
                    "cannot initialize from phase {phase:?}"
                )))
            }
        }
        self.lifecycle.set_phase(LifecyclePhase::Initializing);

        *self.ticker.write() = Some(self.events.start_ticker());

        let init = tokio::time::timeout(INIT_DEADLINE, self.pool.initialize_all()).await;
        match init {
            Err(_) => Err(HubError::Timeout(
                "initialization deadline exceeded".into(),
            )),
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) => {
                self.lifecycle.set_phase(LifecyclePhase::Running);
                *self.started_at.write() = Some(Utc::now());
                self.events.publish(EventPayload::Activity {
                    message: "hub initialized".into(),
                });
                info!("hub service initialized");
                Ok(())
            }
        }
    }

    /// Graceful shutdown: stop accepting calls, drain in-flight work, then
    /// tear components down in reverse init order. Idempotent; concurrent
    /// callers receive the same aggregate outcome.
    pub async fn shutdown(&self) -> HubResult<()> {
        let errors = self
            .lifecycle
            .shutdown_once(|| async {
                let mut errors = Vec::new();
                if !self.in_flight.wait_idle(SHUTDOWN_DRAIN_DEADLINE).await {
                    errors.push(format!(
                        "{} in-flight calls did not finish within {:?}",
                        self.in_flight.active(),
                        SHUTDOWN_DRAIN_DEADLINE
                    ));
                }
                self.events.shutdown();
                if let Some(handle) = self.ticker.write().take() {
                    handle.abort();
                }
                self.bridge.shutdown();
                self.pool.shutdown().await;
                errors
            })
            .await;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(HubError::Lifecycle(errors))
        }
    }

    /// Tools visible to a group; `None` means the `default` group.
    pub fn list_tools(&self, group_id: Option<&str>) -> HubResult<Vec<ToolDescriptor>> {
        self.catalog
            .tools_for_group(group_id.unwrap_or(DEFAULT_GROUP_ID))
    }

    /// Execute a tool. Rejected (with an error result, not an error) unless
    /// the hub is running.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        args: Value,
        group_id: Option<&str>,
        cancel: CancellationToken,
    ) -> ToolResult {
        match self.lifecycle.phase() {
            LifecyclePhase::Running => {}
            LifecyclePhase::ShuttingDown | LifecyclePhase::Stopped => {
                return ToolResult::error(HubError::ShuttingDown.to_string())
            }
            _ => return ToolResult::error("Hub is not ready".to_string()),
        }
        let _guard = self.in_flight.start();
        self.dispatch
            .call_tool(tool_name, args, group_id.unwrap_or(DEFAULT_GROUP_ID), &cancel)
            .await
    }

    pub fn all_groups(&self) -> Vec<GroupConfig> {
        self.groups.all_groups()
    }

    /// Group definition plus per-server health snapshots.
    pub fn group_info(&self, group_id: &str) -> HubResult<GroupInfo> {
        let group = self
            .groups
            .get_group(group_id)
            .ok_or_else(|| HubError::GroupNotFound(group_id.to_string()))?;
        let server_health = group
            .servers
            .iter()
            .map(|name| {
                self.pool.server_info(name).unwrap_or(ServerInfo {
                    name: name.clone(),
                    status: crate::pool::ServerStatus::Disconnected,
                    enabled: false,
                    tool_count: 0,
                    last_connected: None,
                    last_error: None,
                    reconnect_attempts: 0,
                    health_checks: 0,
                })
            })
            .collect();
        Ok(GroupInfo {
            group,
            server_health,
        })
    }

    /// Current per-server snapshots (no active probing).
    pub fn server_health(&self) -> Vec<ServerInfo> {
        self.pool.server_infos()
    }

    /// Actively probe every pooled server and publish a health event.
    pub async fn probe_servers(&self) -> Vec<ServerInfo> {
        for name in self.pool.configured_servers() {
            self.pool.health_check(&name).await;
        }
        let infos = self.pool.server_infos();
        let connected = infos.iter().filter(|i| i.status.is_connected()).count();
        self.events.publish(EventPayload::HealthCheck {
            status: if connected == infos.len() {
                "healthy".into()
            } else {
                "degraded".into()
            },
            connected_servers: connected,
            total_servers: infos.len(),
        });
        infos
    }

    pub fn service_status(&self) -> ServiceStatus {
        let phase = self.lifecycle.phase();
        let total = self
            .config
            .servers
            .iter()
            .filter(|s| s.enabled)
            .count();
        let connected = self.pool.connected_servers().len();
        let status = if phase != LifecyclePhase::Running {
            HealthState::Initializing
        } else if connected == total {
            HealthState::Healthy
        } else {
            HealthState::Degraded
        };
        ServiceStatus {
            status,
            phase,
            connected_servers: connected,
            total_servers: total,
            api_tool_count: self.bridge.tool_count(),
            subscriber_count: self.events.subscriber_count(),
            started_at: *self.started_at.read(),
        }
    }

    pub fn service_diagnostics(&self) -> ServiceDiagnostics {
        ServiceDiagnostics {
            status: self.service_status(),
            servers: self.pool.server_infos(),
            catalog: self.catalog.stats(),
            api_bridge: self.bridge.health(),
            events: EventBusStats {
                subscriber_count: self.events.subscriber_count(),
                buffered_events: self.events.buffered_events(),
            },
            metrics: self.metrics.snapshot(),
        }
    }

    pub fn is_tool_available(&self, tool_name: &str, group_id: Option<&str>) -> bool {
        self.list_tools(group_id)
            .map(|tools| tools.iter().any(|t| t.name == tool_name))
            .unwrap_or(false)
    }

    pub fn tool_details(
        &self,
        tool_name: &str,
        group_id: Option<&str>,
    ) -> HubResult<Option<ToolDescriptor>> {
        Ok(self
            .list_tools(group_id)?
            .into_iter()
            .find(|t| t.name == tool_name))
    }

    /// Atomically replace the API tool set and invalidate the catalog.
    pub fn reload_api_tools(&self, tools: Vec<ApiToolConfig>) -> BridgeHealth {
        self.bridge.reload(tools);
        self.catalog.clear_cache();
        self.events.publish(EventPayload::Activity {
            message: "API tool configuration reloaded".into(),
        });
        self.bridge.health()
    }

    pub fn bridge_health(&self) -> BridgeHealth {
        self.bridge.health()
    }

    pub fn refresh_tool_cache(&self, group_id: Option<&str>) -> HubResult<Vec<ToolDescriptor>> {
        self.catalog
            .refresh_group(group_id.unwrap_or(DEFAULT_GROUP_ID))
    }

    pub fn subscribe_events(
        &self,
        filter: std::collections::HashSet<EventType>,
    ) -> (Uuid, tokio::sync::mpsc::Receiver<HubEvent>) {
        self.events.subscribe(filter)
    }

    pub fn unsubscribe_events(&self, id: Uuid) {
        self.events.unsubscribe(id);
    }

    /// Uniform error envelope for the wire.
    pub fn format_error_response(error: &HubError) -> Value {
        serde_json::json!({
            "success": false,
            "error": {
                "code": error.code(),
                "message": error.to_string(),
            },
            "timestamp": Utc::now().to_rfc3339(),
        })
    }

    /// The underlying pool, exposed for transports and operational tooling.
    pub fn pool(&self) -> &Arc<ServerPool> {
        &self.pool
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}
