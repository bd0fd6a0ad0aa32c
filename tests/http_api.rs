//! REST surface behavior over a hub with no upstream servers.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use hub_core::{HubConfig, HubService};
use mcp_hub::build_router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn hub_with_api_tool() -> Arc<HubService> {
    let config: HubConfig = serde_json::from_value(json!({
        "api_tools": [{
            "id": "weather",
            "description": "weather lookup",
            "request": { "url": "https://api.example.com/weather" }
        }]
    }))
    .unwrap();
    let hub = Arc::new(HubService::new(config).unwrap());
    hub.initialize().await.unwrap();
    hub
}

async fn router() -> Router {
    build_router(hub_with_api_tool().await)
}

async fn get(router: Router, path: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post(router: Router, path: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .oneshot(
            Request::post(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn ping_responds_with_envelope() {
    let (status, body) = get(router().await, "/api/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], "pong");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn health_is_ok_once_initialized() {
    let (status, body) = get(router().await, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "healthy");
}

#[tokio::test]
async fn health_is_unavailable_before_initialization() {
    let hub = Arc::new(HubService::new(HubConfig::default()).unwrap());
    let (status, body) = get(build_router(hub), "/api/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["data"]["status"], "initializing");
}

#[tokio::test]
async fn groups_listing_includes_synthesized_default() {
    let (status, body) = get(router().await, "/api/groups").await;
    assert_eq!(status, StatusCode::OK);
    let groups = body["data"].as_array().unwrap();
    assert!(groups.iter().any(|g| g["id"] == "default"));
}

#[tokio::test]
async fn unknown_group_is_404() {
    let (status, body) = get(router().await, "/api/groups/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "group_not_found");
}

#[tokio::test]
async fn default_tools_include_api_tools() {
    let (status, body) = get(router().await, "/api/tools").await;
    assert_eq!(status, StatusCode::OK);
    let tools = body["data"].as_array().unwrap();
    assert!(tools
        .iter()
        .any(|t| t["name"] == "weather" && t["server"] == "api-tools"));
}

#[tokio::test]
async fn execute_unknown_tool_returns_error_result() {
    let (status, body) = post(
        router().await,
        "/api/tools/missing/execute",
        json!({"arguments": {}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isError"], true);
    let text = body["data"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("not found in group"));
}

#[tokio::test]
async fn api_tools_health_and_reload() {
    let app = router().await;
    let (status, body) = get(app.clone(), "/api/api-tools/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tool_count"], 1);

    let (status, body) = post(
        app,
        "/api/api-tools/reload",
        json!({"tools": [
            {"id": "a", "request": {"url": "https://example.com/a"}},
            {"id": "b", "request": {"url": "https://example.com/b"}}
        ]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tool_count"], 2);
}

#[tokio::test]
async fn diagnostics_report_components() {
    let (status, body) = get(router().await, "/api/diagnostics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["metrics"].is_object());
    assert!(body["data"]["api_bridge"]["initialized"].as_bool().unwrap());
}
