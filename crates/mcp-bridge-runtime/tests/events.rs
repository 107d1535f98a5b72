//! Event fan-out and server log capture.
#![cfg(unix)]

mod common;

use std::time::Duration;

use serde_json::json;

use common::{fake_server, service_with, wait_for_event};
use mcp_bridge_core::{BridgeEvent, ServerState};
use mcp_bridge_runtime::{SubscriptionFilter, ToolCall};

fn is_message(event: &BridgeEvent) -> bool {
    matches!(event, BridgeEvent::ServerNotification { method, .. } if method == "notifications/message")
}

#[tokio::test]
async fn notifications_reach_every_subscriber_in_order() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();
    let mut first = service.subscribe(SubscriptionFilter::All);
    let mut second = service.subscribe(SubscriptionFilter::from_ids(["fake"]));

    service
        .call_tool(ToolCall::new("fake", "notify", json!({})))
        .await
        .unwrap();

    for sub in [&mut first, &mut second] {
        let one = wait_for_event(sub, is_message).await;
        let two = wait_for_event(sub, is_message).await;
        assert_eq!(
            one,
            BridgeEvent::notification("fake", "notifications/message", Some(json!({ "seq": 1 })))
        );
        assert_eq!(
            two,
            BridgeEvent::notification("fake", "notifications/message", Some(json!({ "seq": 2 })))
        );
    }

    service.shutdown().await;
}

#[tokio::test]
async fn filtered_subscription_skips_other_servers() {
    let service = service_with(vec![fake_server("a"), fake_server("b")]);
    let mut only_b = service.subscribe(SubscriptionFilter::from_ids(["b"]));

    service.start_server("a").await.unwrap();
    service.start_server("b").await.unwrap();

    let event = only_b.recv().await.unwrap();
    assert_eq!(event, BridgeEvent::state_changed("b", ServerState::Starting, None));

    while let Some(event) = only_b.try_recv() {
        assert_eq!(event.server_id(), Some("b"));
    }

    service.shutdown().await;
}

#[tokio::test]
async fn stop_emits_stopping_then_stopped() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();
    let mut sub = service.subscribe(SubscriptionFilter::All);

    service.stop_server("fake").await.unwrap();

    assert_eq!(
        sub.recv().await,
        Some(BridgeEvent::state_changed("fake", ServerState::Stopping, None))
    );
    assert_eq!(
        sub.recv().await,
        Some(BridgeEvent::state_changed("fake", ServerState::Stopped, None))
    );
}

#[tokio::test]
async fn shutdown_closes_subscriptions() {
    let service = service_with(vec![fake_server("fake")]);
    let mut sub = service.subscribe(SubscriptionFilter::All);

    service.shutdown().await;

    let end = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await;
    assert_eq!(end.unwrap(), None);
}

#[tokio::test]
async fn stderr_lines_are_captured() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();

    service
        .call_tool(ToolCall::new("fake", "log", json!({})))
        .await
        .unwrap();

    let found = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let lines = service.logs("fake").await.unwrap();
            if lines.iter().any(|l| l.line == "fake: diagnostic line") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(found.is_ok(), "stderr line never showed up");

    service.shutdown().await;
}
