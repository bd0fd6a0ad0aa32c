//! API-tool bridge: HTTP endpoints exposed as MCP tools.
//!
//! Each configured tool is a request template plus an optional response
//! transform; the bridge renders the template from call arguments and the
//! process environment, performs the HTTP call, and normalizes the outcome
//! into a [`ToolResult`]. Tools live under the sentinel server id
//! [`API_TOOLS_SERVER_ID`].

pub mod cache;
pub mod template;
pub mod transform;

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use self::cache::ResponseCache;
use crate::{
    config::{ApiRequestSpec, ApiToolConfig, API_TOOLS_SERVER_ID},
    error::{HubError, HubResult},
    types::{ToolDescriptor, ToolResult},
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A request template after substitution, ready to send.
///
/// Headers and query parameters are kept sorted so the serialized form is a
/// stable cache key.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RenderedRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RenderedRequest {
    pub fn render(spec: &ApiRequestSpec, args: &Value) -> Self {
        Self {
            method: spec.method.to_uppercase(),
            url: template::render_str(&spec.url, args),
            headers: spec
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), template::render_str(v, args)))
                .collect(),
            query: spec
                .query
                .iter()
                .map(|(k, v)| (k.clone(), template::render_str(v, args)))
                .collect(),
            body: spec.body.as_ref().map(|b| template::render_value(b, args)),
        }
    }

    /// Canonical form for cache keying.
    pub fn cache_key(&self, tool_id: &str) -> String {
        format!(
            "{tool_id}:{}",
            serde_json::to_string(self).unwrap_or_default()
        )
    }
}

/// Health snapshot of the bridge.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeHealth {
    pub initialized: bool,
    pub healthy: bool,
    pub tool_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reload: Option<DateTime<Utc>>,
    pub cached_responses: usize,
}

pub struct ApiToolBridge {
    table: RwLock<Vec<ApiToolConfig>>,
    http: reqwest::Client,
    cache: ResponseCache,
    initialized: AtomicBool,
    last_reload: RwLock<Option<DateTime<Utc>>>,
}

impl ApiToolBridge {
    pub fn new(tools: Vec<ApiToolConfig>) -> HubResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| HubError::Config(format!("build HTTP client: {e}")))?;
        let bridge = Self {
            table: RwLock::new(Vec::new()),
            http,
            cache: ResponseCache::new(),
            initialized: AtomicBool::new(false),
            last_reload: RwLock::new(None),
        };
        bridge.install(tools);
        Ok(bridge)
    }

    fn install(&self, tools: Vec<ApiToolConfig>) {
        let count = tools.len();
        *self.table.write() = tools;
        *self.last_reload.write() = Some(Utc::now());
        self.initialized.store(true, Ordering::SeqCst);
        info!(count, "API tool table installed");
    }

    /// Atomically replace the tool set and drop cached responses.
    pub fn reload(&self, tools: Vec<ApiToolConfig>) {
        self.install(tools);
        self.cache.clear();
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn tool_config(&self, name: &str) -> Option<ApiToolConfig> {
        self.find(name)
    }

    fn find(&self, name: &str) -> Option<ApiToolConfig> {
        let table = self.table.read();
        table
            .iter()
            .find(|t| t.id == name)
            .or_else(|| table.iter().find(|t| t.tool_name() == name))
            .cloned()
    }

    /// Tools advertised by the bridge, in configured order.
    pub fn tool_descriptors(&self) -> Vec<ToolDescriptor> {
        self.table
            .read()
            .iter()
            .map(|t| ToolDescriptor {
                name: t.tool_name().to_string(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
                server: API_TOOLS_SERVER_ID.to_string(),
            })
            .collect()
    }

    pub fn tool_count(&self) -> usize {
        self.table.read().len()
    }

    pub fn health(&self) -> BridgeHealth {
        let initialized = self.initialized.load(Ordering::SeqCst);
        BridgeHealth {
            initialized,
            healthy: initialized,
            tool_count: self.tool_count(),
            last_reload: *self.last_reload.read(),
            cached_responses: self.cache.len(),
        }
    }

    pub fn shutdown(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.cache.clear();
    }

    /// Execute an API tool end to end: render, consult the cache, perform
    /// the HTTP call, parse, transform, wrap, store.
    pub async fn execute(
        &self,
        name: &str,
        args: &Value,
        cancel: &CancellationToken,
    ) -> HubResult<ToolResult> {
        let config = self
            .find(name)
            .ok_or_else(|| HubError::ToolNotFound(name.to_string()))?;

        let rendered = RenderedRequest::render(&config.request, args);
        let cache_ttl = config
            .cache
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| Duration::from_secs(c.ttl_secs));
        let cache_key = rendered.cache_key(&config.id);

        if cache_ttl.is_some() {
            if let Some(hit) = self.cache.get(&cache_key) {
                debug!(tool = %config.id, "API tool cache hit");
                return Ok(hit);
            }
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(HubError::Cancelled),
            result = self.send(&rendered) => result?,
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let raw = response.text().await?;

        if status.is_server_error() {
            return Err(HubError::ApiTool(format!(
                "upstream service unavailable (HTTP {status})"
            )));
        }
        if !status.is_success() {
            return Err(HubError::ApiTool(format!(
                "upstream returned HTTP {status}: {}",
                truncate(&raw, 200)
            )));
        }

        let parsed = parse_body(&content_type, &raw);
        let payload = match &config.response.transform {
            Some(expr) => match transform::evaluate(expr, &parsed) {
                Ok(value) => value,
                Err(e) => {
                    warn!(tool = %config.id, error = %e, "response transform failed; returning raw body");
                    parsed
                }
            },
            None => parsed,
        };

        let result = wrap_payload(&payload);
        if let Some(ttl) = cache_ttl {
            self.cache.put(cache_key, result.clone(), ttl);
        }
        Ok(result)
    }

    async fn send(&self, rendered: &RenderedRequest) -> HubResult<reqwest::Response> {
        let method = reqwest::Method::from_bytes(rendered.method.as_bytes())
            .map_err(|e| HubError::ApiTool(format!("invalid HTTP method '{}': {e}", rendered.method)))?;
        let mut request = self.http.request(method, &rendered.url);
        for (key, value) in &rendered.headers {
            request = request.header(key, value);
        }
        if !rendered.query.is_empty() {
            request = request.query(&rendered.query.iter().collect::<Vec<_>>());
        }
        if let Some(body) = &rendered.body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

fn parse_body(content_type: &str, raw: &str) -> Value {
    if content_type.contains("application/json") {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    } else {
        Value::String(raw.to_string())
    }
}

fn wrap_payload(payload: &Value) -> ToolResult {
    match payload {
        Value::String(s) => ToolResult::text(s.clone()),
        other => ToolResult::text(
            serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        ),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::config::{ApiCacheSpec, ApiResponseSpec};

    fn tool(id: &str, url: &str) -> ApiToolConfig {
        ApiToolConfig {
            id: id.to_string(),
            name: String::new(),
            description: "test tool".into(),
            request: ApiRequestSpec {
                url: url.to_string(),
                method: "GET".into(),
                headers: HashMap::new(),
                query: HashMap::new(),
                body: None,
            },
            parameters: json!({"type": "object", "properties": {}}),
            response: ApiResponseSpec::default(),
            cache: None,
        }
    }

    #[test]
    fn test_rendered_request_is_deterministic() {
        let mut spec = ApiRequestSpec {
            url: "https://api.example.com/{{data.city}}".into(),
            method: "get".into(),
            headers: HashMap::new(),
            query: HashMap::new(),
            body: None,
        };
        spec.headers.insert("b-header".into(), "2".into());
        spec.headers.insert("a-header".into(), "1".into());

        let args = json!({"city": "Berlin"});
        let first = RenderedRequest::render(&spec, &args);
        let second = RenderedRequest::render(&spec, &args);
        assert_eq!(first.cache_key("t"), second.cache_key("t"));
        assert_eq!(first.method, "GET");
        assert_eq!(first.url, "https://api.example.com/Berlin");
    }

    #[test]
    fn test_find_matches_id_and_name() {
        let mut named = tool("weather-v2", "https://example.com");
        named.name = "weather".into();
        let bridge = ApiToolBridge::new(vec![named]).unwrap();
        assert!(bridge.has_tool("weather-v2"));
        assert!(bridge.has_tool("weather"));
        assert!(!bridge.has_tool("forecast"));
    }

    #[test]
    fn test_descriptors_use_sentinel_server() {
        let bridge = ApiToolBridge::new(vec![tool("t1", "https://example.com")]).unwrap();
        let descriptors = bridge.tool_descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].server, API_TOOLS_SERVER_ID);
    }

    #[test]
    fn test_reload_replaces_table() {
        let bridge = ApiToolBridge::new(vec![tool("t1", "https://example.com")]).unwrap();
        let before = bridge.health().last_reload;
        bridge.reload(vec![
            tool("t2", "https://example.com"),
            tool("t3", "https://example.com"),
        ]);
        assert!(!bridge.has_tool("t1"));
        assert!(bridge.has_tool("t2"));
        assert_eq!(bridge.tool_count(), 2);
        assert!(bridge.health().last_reload >= before);
    }

    #[test]
    fn test_wrap_payload_shapes() {
        assert_eq!(wrap_payload(&json!("plain")).text_content(), "plain");
        let wrapped = wrap_payload(&json!({"a": 1}));
        assert!(wrapped.text_content().contains("\"a\": 1"));
        assert!(!wrapped.is_error);
    }

    /// One-shot HTTP server returning a fixed JSON body.
    async fn serve_json(body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_execute_parses_and_transforms() {
        let url = serve_json(r#"{"main":{"temp":21.5},"name":"Berlin"}"#).await;
        let mut config = tool("weather", &url);
        config.response = ApiResponseSpec {
            transform: Some(r#"{ "city": name, "temp": main.temp }"#.into()),
        };
        let bridge = ApiToolBridge::new(vec![config]).unwrap();
        let result = bridge
            .execute("weather", &json!({}), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.is_error);
        let parsed: Value = serde_json::from_str(&result.text_content()).unwrap();
        assert_eq!(parsed, json!({"city": "Berlin", "temp": 21.5}));
    }

    #[tokio::test]
    async fn test_execute_bad_transform_falls_back_to_raw() {
        let url = serve_json(r#"{"value":7}"#).await;
        let mut config = tool("raw", &url);
        config.response = ApiResponseSpec {
            transform: Some("{{{ not an expression".into()),
        };
        let bridge = ApiToolBridge::new(vec![config]).unwrap();
        let result = bridge
            .execute("raw", &json!({}), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.is_error);
        assert!(result.text_content().contains("\"value\": 7"));
    }

    #[tokio::test]
    async fn test_execute_caches_when_enabled() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let hits = std::sync::Arc::new(AtomicUsize::new(0));
        let hits_server = std::sync::Arc::clone(&hits);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                hits_server.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let body = r#"{"n":1}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        let mut config = tool("cached", &format!("http://{addr}"));
        config.cache = Some(ApiCacheSpec {
            enabled: true,
            ttl_secs: 60,
        });
        let bridge = ApiToolBridge::new(vec![config]).unwrap();
        let cancel = CancellationToken::new();
        bridge.execute("cached", &json!({}), &cancel).await.unwrap();
        bridge.execute("cached", &json!({}), &cancel).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error() {
        let bridge = ApiToolBridge::new(vec![]).unwrap();
        let err = bridge
            .execute("nope", &json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::ToolNotFound(_)));
    }
}
