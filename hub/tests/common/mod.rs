//! Scripted upstream servers for integration tests.
#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use hub_core::{
    pool::DiscoveredTool, ApiToolConfig, GroupConfig, HubConfig, HubError, HubResult, HubService,
    McpClient, McpConnector, McpServerConfig, McpTransport,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Canonical success payload: `{content:[{type:"text",text:...}], isError:false}`.
pub fn text_result(text: &str) -> Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": false
    })
}

pub fn number_schema(required: &[&str]) -> Value {
    let mut properties = serde_json::Map::new();
    for name in required {
        properties.insert(name.to_string(), json!({"type": "number"}));
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// One scripted upstream server: fixed tool list, per-tool response queues,
/// recorded calls.
pub struct ScriptedServer {
    pub name: String,
    tools: Vec<(String, Value)>,
    responses: Mutex<HashMap<String, VecDeque<Result<Value, String>>>>,
    calls: Mutex<Vec<(String, Value)>>,
    delay: Mutex<Option<Duration>>,
    alive: AtomicBool,
}

impl ScriptedServer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tools: Vec::new(),
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            alive: AtomicBool::new(true),
        }
    }

    pub fn with_tool(mut self, tool: &str, schema: Value) -> Self {
        self.tools.push((tool.to_string(), schema));
        self
    }

    /// Queue the next response for a tool. Errors are given as message
    /// strings and surface as tool-execution failures.
    pub fn enqueue(&self, tool: &str, response: Result<Value, &str>) {
        self.responses
            .lock()
            .entry(tool.to_string())
            .or_default()
            .push_back(response.map_err(|m| m.to_string()));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn call_count(&self, tool: &str) -> usize {
        self.calls.lock().iter().filter(|(t, _)| t == tool).count()
    }
}

#[async_trait]
impl McpClient for ScriptedServer {
    async fn list_tools(&self) -> HubResult<Vec<DiscoveredTool>> {
        Ok(self
            .tools
            .iter()
            .map(|(name, schema)| DiscoveredTool {
                name: name.clone(),
                description: format!("scripted tool {name}"),
                input_schema: schema.clone(),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, args: Value) -> HubResult<Value> {
        self.calls.lock().push((name.to_string(), args));
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self
            .responses
            .lock()
            .get_mut(name)
            .and_then(VecDeque::pop_front);
        match queued {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(HubError::ToolExecution(message)),
            None => Ok(text_result("ok")),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// Hands out the scripted servers by name; unknown names fail to connect.
pub struct ScriptedConnector {
    servers: Mutex<HashMap<String, Arc<ScriptedServer>>>,
}

impl ScriptedConnector {
    pub fn new(servers: Vec<Arc<ScriptedServer>>) -> Arc<Self> {
        Arc::new(Self {
            servers: Mutex::new(
                servers
                    .into_iter()
                    .map(|s| (s.name.clone(), s))
                    .collect(),
            ),
        })
    }
}

#[async_trait]
impl McpConnector for ScriptedConnector {
    async fn connect(&self, config: &McpServerConfig) -> HubResult<Arc<dyn McpClient>> {
        self.servers
            .lock()
            .get(&config.name)
            .cloned()
            .map(|s| s as Arc<dyn McpClient>)
            .ok_or_else(|| HubError::ConnectionFailed(format!("no script for '{}'", config.name)))
    }
}

pub fn server_config(name: &str) -> McpServerConfig {
    McpServerConfig {
        name: name.to_string(),
        transport: McpTransport::Stdio {
            command: "scripted".into(),
            args: vec![],
            envs: HashMap::new(),
        },
        env: HashMap::new(),
        enabled: true,
    }
}

pub fn group(id: &str, servers: &[&str], allowed: &[&str]) -> GroupConfig {
    GroupConfig {
        id: id.to_string(),
        name: id.to_string(),
        description: None,
        servers: servers.iter().map(|s| s.to_string()).collect(),
        allowed_tools: allowed.iter().map(|s| s.to_string()).collect(),
    }
}

/// Build and initialize a hub over scripted servers.
pub async fn hub_with(
    servers: Vec<Arc<ScriptedServer>>,
    groups: Vec<GroupConfig>,
    api_tools: Vec<ApiToolConfig>,
) -> HubService {
    let config = HubConfig {
        servers: servers.iter().map(|s| server_config(&s.name)).collect(),
        groups,
        api_tools,
        events: Default::default(),
    };
    let connector = ScriptedConnector::new(servers);
    let service = HubService::with_connector(config, connector).unwrap();
    service.initialize().await.unwrap();
    service
}
