//! Production [`McpClient`] backed by the rmcp SDK.
//!
//! Supports the three upstream transports: stdio child process, HTTP SSE,
//! and streamable HTTP.

use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use rmcp::{
    model::CallToolRequestParam,
    service::RunningService,
    transport::{
        sse_client::SseClientConfig, streamable_http_client::StreamableHttpClientTransportConfig,
        ConfigureCommandExt, SseClientTransport, StreamableHttpClientTransport, TokioChildProcess,
    },
    RoleClient, ServiceExt,
};
use tracing::{info, warn};

use super::client::{DiscoveredTool, McpClient, McpConnector};
use crate::{
    config::{McpServerConfig, McpTransport},
    error::{HubError, HubResult},
};

type RmcpService = RunningService<RoleClient, ()>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects upstream servers with rmcp transports.
pub struct RmcpConnector;

#[async_trait]
impl McpConnector for RmcpConnector {
    async fn connect(&self, config: &McpServerConfig) -> HubResult<Arc<dyn McpClient>> {
        info!(server = %config.name, transport = ?config.transport, "connecting to MCP server");
        let service = match &config.transport {
            McpTransport::Stdio {
                command,
                args,
                envs,
            } => {
                let transport = TokioChildProcess::new(
                    tokio::process::Command::new(command).configure(|cmd| {
                        cmd.args(args)
                            .envs(envs.iter())
                            .envs(config.env.iter())
                            .stderr(std::process::Stdio::inherit());
                    }),
                )
                .map_err(|e| HubError::Transport(format!("create stdio transport: {e}")))?;

                ().serve(transport).await.map_err(|e| {
                    HubError::ConnectionFailed(format!("initialize stdio client: {e}"))
                })?
            }

            McpTransport::Sse { url, headers } => {
                let client = http_client_with_headers(headers)?;
                let cfg = SseClientConfig {
                    sse_endpoint: url.clone().into(),
                    ..Default::default()
                };
                let transport = SseClientTransport::start_with_client(client, cfg)
                    .await
                    .map_err(|e| HubError::Transport(format!("create SSE transport: {e}")))?;

                ().serve(transport).await.map_err(|e| {
                    HubError::ConnectionFailed(format!("initialize SSE client: {e}"))
                })?
            }

            McpTransport::Streamable { url, headers } => {
                let mut cfg = StreamableHttpClientTransportConfig::with_uri(url.as_str());
                if let Some(auth) = headers.get("Authorization") {
                    cfg.auth_header = Some(auth.clone());
                }
                let transport = StreamableHttpClientTransport::from_config(cfg);

                ().serve(transport).await.map_err(|e| {
                    HubError::ConnectionFailed(format!("initialize streamable client: {e}"))
                })?
            }
        };

        info!(server = %config.name, "connected to MCP server");
        Ok(Arc::new(RmcpClient::new(service)))
    }
}

fn http_client_with_headers(
    headers: &std::collections::HashMap<String, String>,
) -> HubResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
    if !headers.is_empty() {
        let mut map = reqwest::header::HeaderMap::new();
        for (key, value) in headers {
            let name: reqwest::header::HeaderName = key
                .parse()
                .map_err(|e| HubError::Transport(format!("header name '{key}': {e}")))?;
            let value = value
                .parse()
                .map_err(|e| HubError::Transport(format!("header value for '{key}': {e}")))?;
            map.insert(name, value);
        }
        builder = builder.default_headers(map);
    }
    builder
        .build()
        .map_err(|e| HubError::Transport(format!("build HTTP client: {e}")))
}

/// Wraps a running rmcp service behind the [`McpClient`] contract.
pub struct RmcpClient {
    service: Mutex<Option<Arc<RmcpService>>>,
    alive: AtomicBool,
}

impl RmcpClient {
    fn new(service: RmcpService) -> Self {
        Self {
            service: Mutex::new(Some(Arc::new(service))),
            alive: AtomicBool::new(true),
        }
    }

    fn service(&self) -> HubResult<Arc<RmcpService>> {
        self.service
            .lock()
            .as_ref()
            .cloned()
            .ok_or_else(|| HubError::Transport("client is closed".into()))
    }

    fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl McpClient for RmcpClient {
    async fn list_tools(&self) -> HubResult<Vec<DiscoveredTool>> {
        let service = self.service()?;
        let tools = service.peer().list_all_tools().await.map_err(|e| {
            self.mark_dead();
            HubError::Transport(format!("list tools: {e}"))
        })?;
        Ok(tools
            .into_iter()
            .map(|t| DiscoveredTool {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()).unwrap_or_default(),
                input_schema: serde_json::Value::Object((*t.input_schema).clone()),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, args: serde_json::Value) -> HubResult<serde_json::Value> {
        let service = self.service()?;
        let request = CallToolRequestParam {
            name: Cow::Owned(name.to_string()),
            arguments: args.as_object().cloned(),
        };
        let result = service
            .call_tool(request)
            .await
            .map_err(|e| HubError::ToolExecution(format!("Failed to call tool: {e}")))?;
        serde_json::to_value(result)
            .map_err(|e| HubError::Internal(format!("serialize tool result: {e}")))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && self.service.lock().is_some()
    }

    async fn close(&self) {
        self.mark_dead();
        let taken = self.service.lock().take();
        if let Some(service) = taken {
            match Arc::try_unwrap(service) {
                Ok(service) => {
                    if let Err(e) = service.cancel().await {
                        warn!("error closing MCP client: {e}");
                    }
                }
                Err(_) => {
                    warn!("MCP client still has active references on close");
                }
            }
        }
    }
}
