//! HTTP transport: REST routes and the SSE event stream.
//!
//! Thin layer over [`HubService`]; every route delegates to the facade and
//! wraps the outcome in the response envelope.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Router,
};
use futures::Stream;
use hub_core::{ApiToolConfig, EventType, HealthState, HubService};
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

use crate::responses::{self, ApiResponse};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<HubService>,
}

pub fn build_router(hub: Arc<HubService>) -> Router {
    let state = AppState { hub };
    Router::new()
        .route("/api/groups", get(list_groups))
        .route("/api/groups/{group}", get(group_info))
        .route("/api/groups/{group}/tools", get(group_tools))
        .route("/api/tools", get(default_tools))
        .route(
            "/api/groups/{group}/tools/{tool}/execute",
            post(execute_in_group),
        )
        .route("/api/tools/{tool}/execute", post(execute_default))
        .route("/api/health", get(health))
        .route("/api/diagnostics", get(diagnostics))
        .route("/api/api-tools/health", get(api_tools_health))
        .route("/api/api-tools/reload", post(api_tools_reload))
        .route("/api/ping", get(ping))
        .route("/events", get(events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn list_groups(State(state): State<AppState>) -> impl IntoResponse {
    responses::ok(state.hub.all_groups())
}

async fn group_info(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> impl IntoResponse {
    match state.hub.group_info(&group) {
        Ok(info) => responses::ok(info).into_response(),
        Err(e) => responses::from_hub_error(&e).into_response(),
    }
}

async fn group_tools(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> impl IntoResponse {
    match state.hub.list_tools(Some(&group)) {
        Ok(tools) => responses::ok(tools).into_response(),
        Err(e) => responses::from_hub_error(&e).into_response(),
    }
}

async fn default_tools(State(state): State<AppState>) -> impl IntoResponse {
    match state.hub.list_tools(None) {
        Ok(tools) => responses::ok(tools).into_response(),
        Err(e) => responses::from_hub_error(&e).into_response(),
    }
}

/// Tool-call bodies carry arguments under `arguments` or `args`. An empty
/// or malformed body means no arguments.
fn extract_args(body: &Bytes) -> Value {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(mut map)) => map
            .remove("arguments")
            .or_else(|| map.remove("args"))
            .unwrap_or_else(|| json!({})),
        _ => json!({}),
    }
}

async fn execute_in_group(
    State(state): State<AppState>,
    Path((group, tool)): Path<(String, String)>,
    body: Bytes,
) -> impl IntoResponse {
    let args = extract_args(&body);
    let result = state
        .hub
        .call_tool(&tool, args, Some(&group), CancellationToken::new())
        .await;
    responses::ok(result)
}

async fn execute_default(
    State(state): State<AppState>,
    Path(tool): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let args = extract_args(&body);
    let result = state
        .hub
        .call_tool(&tool, args, None, CancellationToken::new())
        .await;
    responses::ok(result)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.hub.service_status();
    let code = match status.status {
        HealthState::Initializing => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    responses::respond(code, ApiResponse::ok(status))
}

async fn diagnostics(State(state): State<AppState>) -> impl IntoResponse {
    responses::ok(state.hub.service_diagnostics())
}

async fn api_tools_health(State(state): State<AppState>) -> impl IntoResponse {
    responses::ok(state.hub.bridge_health())
}

#[derive(Debug, serde::Deserialize, Default)]
struct ReloadBody {
    #[serde(default)]
    tools: Vec<ApiToolConfig>,
}

async fn api_tools_reload(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let tools = serde_json::from_slice::<ReloadBody>(&body)
        .unwrap_or_default()
        .tools;
    responses::ok(state.hub.reload_api_tools(tools))
}

async fn ping() -> impl IntoResponse {
    responses::ok("pong")
}

#[derive(Debug, serde::Deserialize, Default)]
struct EventsQuery {
    /// Comma-separated event types; absent = all.
    types: Option<String>,
}

async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<SubscriberStream> {
    let filter = query
        .types
        .as_deref()
        .map(EventType::parse_filter)
        .unwrap_or_default();
    let (id, rx) = state.hub.subscribe_events(filter);
    debug!(subscriber = %id, "SSE client attached");
    Sse::new(SubscriberStream {
        inner: ReceiverStream::new(rx),
        hub: Arc::clone(&state.hub),
        id,
    })
}

/// Event stream that detaches its bus subscription when the client drops.
pub struct SubscriberStream {
    inner: ReceiverStream<hub_core::HubEvent>,
    hub: Arc<HubService>,
    id: Uuid,
}

impl Stream for SubscriberStream {
    type Item = Result<SseEvent, axum::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                let frame = serde_json::to_string(&event)
                    .unwrap_or_else(|_| "{\"type\":\"ping\"}".to_string());
                Poll::Ready(Some(Ok(SseEvent::default().data(frame))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SubscriberStream {
    fn drop(&mut self) {
        self.hub.unsubscribe_events(self.id);
    }
}
