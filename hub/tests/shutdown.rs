//! Graceful shutdown semantics.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{hub_with, number_schema, text_result, ScriptedServer};
use hub_core::{HubService, LifecyclePhase};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn math_server() -> ScriptedServer {
    ScriptedServer::new("math").with_tool("add", number_schema(&["a", "b"]))
}

#[tokio::test(start_paused = true)]
async fn in_flight_call_completes_during_shutdown() {
    let math = Arc::new(math_server());
    math.enqueue("add", Ok(text_result("7")));
    math.set_delay(Duration::from_millis(200));
    let hub = Arc::new(hub_with(vec![Arc::clone(&math)], vec![], vec![]).await);

    let hub_call = Arc::clone(&hub);
    let call = tokio::spawn(async move {
        hub_call
            .call_tool("add", json!({"a": 3, "b": 4}), None, CancellationToken::new())
            .await
    });

    // Let the call reach the upstream before shutting down.
    tokio::time::sleep(Duration::from_millis(10)).await;
    hub.shutdown().await.unwrap();

    let result = call.await.unwrap();
    assert!(!result.is_error);
    assert_eq!(result.text_content(), "7");
    assert_eq!(hub.service_status().phase, LifecyclePhase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn concurrent_shutdowns_coalesce_to_one_outcome() {
    let hub = Arc::new(hub_with(vec![Arc::new(math_server())], vec![], vec![]).await);

    let (first, second) = tokio::join!(hub.shutdown(), hub.shutdown());
    assert!(first.is_ok());
    assert!(second.is_ok());

    // A later call is also coalesced onto the stored outcome.
    assert!(hub.shutdown().await.is_ok());
}

#[tokio::test]
async fn no_events_after_shutdown_and_new_calls_rejected() {
    let hub = hub_with(vec![Arc::new(math_server())], vec![], vec![]).await;
    let (_id, mut rx) = hub.subscribe_events(HashSet::new());

    hub.shutdown().await.unwrap();

    // Subscribers are closed; publishes are discarded.
    hub.events().publish(hub_core::EventPayload::Activity {
        message: "late".into(),
    });
    loop {
        match rx.recv().await {
            Some(event) => {
                assert_ne!(
                    serde_json::to_value(&event).unwrap()["data"]["message"],
                    "late"
                );
            }
            None => break,
        }
    }

    let result = hub
        .call_tool("add", json!({"a": 1, "b": 2}), None, CancellationToken::new())
        .await;
    assert!(result.is_error);
    assert!(result.text_content().contains("shutting down"));
}

#[tokio::test]
async fn initialize_fails_when_all_servers_fail() {
    // A connector with no scripts fails every connection.
    let connector = common::ScriptedConnector::new(vec![]);
    let config = hub_core::HubConfig {
        servers: vec![common::server_config("ghost")],
        ..Default::default()
    };
    let hub = HubService::with_connector(config, connector).unwrap();
    let err = hub.initialize().await.unwrap_err();
    assert!(err.to_string().contains("all servers failed"));
}

#[tokio::test]
async fn initialize_succeeds_with_no_servers() {
    let connector = common::ScriptedConnector::new(vec![]);
    let hub = HubService::with_connector(hub_core::HubConfig::default(), connector).unwrap();
    hub.initialize().await.unwrap();
    assert_eq!(hub.service_status().phase, LifecyclePhase::Running);
    assert!(hub.list_tools(None).unwrap().is_empty());
}
