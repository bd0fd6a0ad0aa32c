//! Dispatch engine: the tool-call pipeline.
//!
//! Order per call is strict: access validation, tool-access validation,
//! routing, argument validation, execution with retry, result
//! normalization, telemetry. API tools are consulted before MCP servers
//! when a name matches both; API tools execute once while MCP tools go
//! through the bounded retry loop.

pub mod normalize;
pub mod validate;

use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    access::GroupRegistry,
    bridge::ApiToolBridge,
    config::API_TOOLS_SERVER_ID,
    error::{HubError, HubResult},
    event::{EventBus, EventPayload},
    metrics::HubMetrics,
    pool::{BackoffPolicy, ServerPool, ServerStatus},
    types::ToolResult,
};

/// Attempts per MCP tool call (first try included).
pub const MAX_ATTEMPTS: u32 = 2;

pub struct DispatchEngine {
    pool: Arc<ServerPool>,
    bridge: Arc<ApiToolBridge>,
    groups: Arc<GroupRegistry>,
    events: Arc<EventBus>,
    metrics: Arc<HubMetrics>,
    backoff: BackoffPolicy,
}

impl DispatchEngine {
    pub fn new(
        pool: Arc<ServerPool>,
        bridge: Arc<ApiToolBridge>,
        groups: Arc<GroupRegistry>,
        events: Arc<EventBus>,
        metrics: Arc<HubMetrics>,
    ) -> Self {
        Self {
            pool,
            bridge,
            groups,
            events,
            metrics,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Execute a tool within a group. Never returns an error: every failure
    /// is folded into a canonical error result. Cancellation is the one
    /// path that emits no tool-execution event.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        args: Value,
        group_id: &str,
        cancel: &CancellationToken,
    ) -> ToolResult {
        self.metrics.record_call_start();
        let started = Instant::now();

        let outcome = self.dispatch(tool_name, args, group_id, cancel).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok((server, result)) => {
                self.metrics
                    .record_call_end(&server, tool_name, !result.is_error, duration_ms);
                self.events.publish(EventPayload::ToolExecution {
                    tool: tool_name.to_string(),
                    server,
                    group: group_id.to_string(),
                    success: !result.is_error,
                    duration_ms,
                    error: result.is_error.then(|| result.text_content()),
                });
                result
            }
            Err(DispatchFailure { server, error }) => {
                let cancelled = matches!(error, HubError::Cancelled);
                self.metrics.record_call_end(
                    server.as_deref().unwrap_or("unrouted"),
                    tool_name,
                    false,
                    duration_ms,
                );
                let message = error.to_string();
                if !cancelled {
                    self.events.publish(EventPayload::ToolExecution {
                        tool: tool_name.to_string(),
                        server: server.unwrap_or_default(),
                        group: group_id.to_string(),
                        success: false,
                        duration_ms,
                        error: Some(message.clone()),
                    });
                }
                ToolResult::error(message)
            }
        }
    }

    async fn dispatch(
        &self,
        tool_name: &str,
        args: Value,
        group_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, ToolResult), DispatchFailure> {
        // 1. Access validation: the group must exist and offer servers.
        let group = self
            .groups
            .get_group(group_id)
            .ok_or_else(|| DispatchFailure::unrouted(HubError::GroupNotFound(group_id.into())))?;
        if group.servers.is_empty() && self.bridge.tool_count() == 0 {
            return Err(DispatchFailure::unrouted(HubError::Group(format!(
                "No available servers in group '{group_id}'"
            ))));
        }

        // 2. Tool-access validation.
        if !self.groups.validate_tool_access(group_id, tool_name) {
            return Err(DispatchFailure::unrouted(HubError::ToolAccessDenied {
                tool: tool_name.into(),
                group: group_id.into(),
            }));
        }

        // 3. Routing. API tools take precedence on name collisions.
        let route = if self.bridge.has_tool(tool_name) {
            Route::Api
        } else {
            let server = self
                .groups
                .find_tool_in_group(group_id, tool_name)
                .ok_or_else(|| {
                    DispatchFailure::unrouted(HubError::ToolNotFound(format!(
                        "Tool '{tool_name}' not found in group '{group_id}'"
                    )))
                })?;
            let status = self
                .pool
                .server_status(&server)
                .unwrap_or(ServerStatus::Disconnected);
            if !status.is_connected() {
                return Err(DispatchFailure::routed(
                    server.clone(),
                    HubError::ServerNotConnected {
                        server,
                        status: status.to_string(),
                    },
                ));
            }
            Route::Server(server)
        };

        // 4. Argument validation against the tool's input schema.
        let schema = match &route {
            Route::Api => self
                .bridge
                .tool_config(tool_name)
                .map(|c| c.parameters)
                .unwrap_or(Value::Null),
            Route::Server(server) => self
                .pool
                .server_tools(server)
                .into_iter()
                .find(|t| t.name == tool_name)
                .map(|t| t.input_schema)
                .unwrap_or(Value::Null),
        };
        validate::validate_args(&schema, &args)
            .map_err(|e| DispatchFailure::new(route.server_id().map(String::from), e))?;

        // 5-7. Execution (with retry for MCP tools) and normalization.
        match route {
            Route::Api => {
                debug!(tool = tool_name, "routing to API tool bridge");
                let result = self
                    .bridge
                    .execute(tool_name, &args, cancel)
                    .await
                    .map_err(|e| {
                        DispatchFailure::routed(API_TOOLS_SERVER_ID.to_string(), e)
                    })?;
                Ok((API_TOOLS_SERVER_ID.to_string(), result))
            }
            Route::Server(server) => {
                let value = self
                    .execute_with_retry(&server, tool_name, &args, cancel)
                    .await
                    .map_err(|e| DispatchFailure::routed(server.clone(), e))?;
                Ok((server, normalize::normalize(value)))
            }
        }
    }

    /// Bounded retry with exponential backoff for transient failures.
    async fn execute_with_retry(
        &self,
        server: &str,
        tool_name: &str,
        args: &Value,
        cancel: &CancellationToken,
    ) -> HubResult<Value> {
        let mut last_error: Option<HubError> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                self.metrics.record_retry();
                let delay = self.backoff.delay(attempt - 1);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(HubError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            match self
                .pool
                .execute_tool(server, tool_name, args.clone(), cancel)
                .await
            {
                Ok(value) => return Ok(value),
                Err(HubError::Cancelled) => return Err(HubError::Cancelled),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        server,
                        tool = tool_name,
                        attempt,
                        error = %e,
                        "retryable tool failure"
                    );
                    last_error = Some(e);
                }
                Err(e) if e.is_retryable() => {
                    return Err(HubError::RetriesExhausted {
                        attempts: MAX_ATTEMPTS,
                        reason: error_reason(&e),
                    })
                }
                Err(e) => return Err(e),
            }
        }
        // Unreachable in practice: the loop always returns on the last attempt.
        Err(last_error.unwrap_or_else(|| HubError::Internal("retry loop exhausted".into())))
    }
}

enum Route {
    Api,
    Server(String),
}

impl Route {
    fn server_id(&self) -> Option<&str> {
        match self {
            Route::Api => Some(API_TOOLS_SERVER_ID),
            Route::Server(server) => Some(server),
        }
    }
}

struct DispatchFailure {
    server: Option<String>,
    error: HubError,
}

impl DispatchFailure {
    fn new(server: Option<String>, error: HubError) -> Self {
        Self { server, error }
    }

    fn unrouted(error: HubError) -> Self {
        Self::new(None, error)
    }

    fn routed(server: String, error: HubError) -> Self {
        Self::new(Some(server), error)
    }
}

/// Bare reason for retry-exhausted messages, without the variant prefix.
fn error_reason(error: &HubError) -> String {
    match error {
        HubError::ToolExecution(m)
        | HubError::Transport(m)
        | HubError::ConnectionFailed(m)
        | HubError::ApiTool(m)
        | HubError::Timeout(m) => m.clone(),
        other => other.to_string(),
    }
}
