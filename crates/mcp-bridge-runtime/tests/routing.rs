//! Request routing through a running server.
#![cfg(unix)]

mod common;

use std::time::Duration;

use serde_json::json;

use common::{deaf_server, fake_server, service_with, wait_for_event};
use mcp_bridge_core::{BridgeError, BridgeEvent, ServerState};
use mcp_bridge_runtime::{CancellationToken, SubscriptionFilter, ToolCall};

#[tokio::test]
async fn call_returns_server_result() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();

    let result = service
        .call_tool(ToolCall::new("fake", "echo", json!({ "text": "hi" })))
        .await
        .unwrap();
    assert_eq!(result, json!({ "echo": { "text": "hi" } }));

    service.shutdown().await;
}

#[tokio::test]
async fn concurrent_calls_each_get_their_own_response() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();

    let calls = (0..10).map(|n| service.call_tool(ToolCall::new("fake", "echo", json!({ "n": n }))));
    let results = futures_util::future::join_all(calls).await;

    for (n, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), json!({ "echo": { "n": n } }));
    }

    service.shutdown().await;
}

#[tokio::test]
async fn unanswered_call_times_out_and_server_keeps_running() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();

    let err = service
        .call_tool(
            ToolCall::new("fake", "never", json!({})).with_timeout(Duration::from_millis(300)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)));
    assert_eq!(err.to_string(), "Request timed out after 300ms");

    assert_eq!(
        service.status("fake").await.unwrap().state,
        ServerState::Running
    );
    let result = service
        .call_tool(ToolCall::new("fake", "echo", json!({})))
        .await
        .unwrap();
    assert_eq!(result, json!({ "echo": {} }));

    service.shutdown().await;
}

#[tokio::test]
async fn late_response_after_timeout_is_dropped() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();

    let err = service
        .call_tool(ToolCall::new("fake", "slow", json!({})).with_timeout(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)));

    // The slow response arrives first and must not be delivered to this call.
    let result = service
        .call_tool(ToolCall::new("fake", "echo", json!({ "after": true })))
        .await
        .unwrap();
    assert_eq!(result, json!({ "echo": { "after": true } }));

    service.shutdown().await;
}

#[tokio::test]
async fn cancelled_call_returns_cancelled() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = service
        .call_tool_cancellable(ToolCall::new("fake", "never", json!({})), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Cancelled));

    let result = service
        .call_tool(ToolCall::new("fake", "echo", json!({})))
        .await
        .unwrap();
    assert_eq!(result, json!({ "echo": {} }));

    service.shutdown().await;
}

#[tokio::test]
async fn unknown_tool_is_rejected_without_a_round_trip() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();

    let err = service
        .call_tool(ToolCall::new("fake", "does_not_exist", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::ToolNotFound(_)));

    service.shutdown().await;
}

#[tokio::test]
async fn non_object_arguments_are_invalid() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();

    let err = service
        .call_tool(ToolCall::new("fake", "echo", json!([1, 2])))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidRequest(_)));

    service.shutdown().await;
}

#[tokio::test]
async fn server_error_is_passed_through() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();

    let err = service
        .call_tool(ToolCall::new("fake", "fail", json!({})))
        .await
        .unwrap_err();
    match err {
        BridgeError::ServerError { code, message, .. } => {
            assert_eq!(code, -32602);
            assert_eq!(message, "unknown tool");
        }
        other => panic!("expected ServerError, got {other:?}"),
    }

    service.shutdown().await;
}

#[tokio::test]
async fn malformed_line_is_skipped() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();

    let result = service
        .call_tool(ToolCall::new("fake", "garbage", json!({})))
        .await
        .unwrap();
    assert_eq!(result, json!({ "survived": true }));

    service.shutdown().await;
}

#[tokio::test]
async fn server_ping_is_answered_by_the_bridge() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();

    let result = service
        .call_tool(ToolCall::new("fake", "ping_back", json!({})))
        .await
        .unwrap();
    assert_eq!(result, json!({ "pong": true }));

    service.shutdown().await;
}

#[tokio::test]
async fn list_changed_triggers_catalog_refresh() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();
    let mut sub = service.subscribe(SubscriptionFilter::All);

    service
        .call_tool(ToolCall::new("fake", "change", json!({})))
        .await
        .unwrap();

    wait_for_event(&mut sub, |e| {
        matches!(e, BridgeEvent::ToolsRefreshed { tools, .. } if tools.iter().any(|t| t.name == "added"))
    })
    .await;

    let tools = service.list_tools("fake").await.unwrap();
    assert!(tools.iter().any(|t| t.name == "added"));
    let result = service
        .call_tool(ToolCall::new("fake", "added", json!({ "x": 1 })))
        .await
        .unwrap();
    assert_eq!(result, json!({ "echo": { "x": 1 } }));

    service.shutdown().await;
}

#[tokio::test]
async fn explicit_refresh_returns_current_tools() {
    let service = service_with(vec![fake_server("fake")]);

    assert!(matches!(
        service.refresh_tools("fake").await,
        Err(BridgeError::ServerNotRunning(_))
    ));

    service.start_server("fake").await.unwrap();
    let tools = service.refresh_tools("fake").await.unwrap();
    assert_eq!(tools, service.list_tools("fake").await.unwrap());

    service.shutdown().await;
}

#[tokio::test]
async fn closed_stdin_is_server_unavailable() {
    let service = service_with(vec![deaf_server("deaf")]);
    service.start_server("deaf").await.unwrap();

    let err = service
        .call_tool(ToolCall::new("deaf", "echo", json!({})).with_timeout(Duration::from_secs(3)))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::ServerUnavailable(_)), "got {err:?}");

    service.shutdown().await;
}

#[tokio::test]
async fn calls_issued_while_exit_drains_fail_as_crashed() {
    let service = service_with(vec![fake_server("fake")]);
    service.start_server("fake").await.unwrap();

    // `linger` exits while a background child holds stdout open, so the
    // connection spends its whole drain window waiting for more output.
    let (linger, late) = tokio::join!(
        service.call_tool(ToolCall::new("fake", "linger", json!({}))),
        async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            service
                .call_tool(ToolCall::new("fake", "echo", json!({ "late": true })))
                .await
        }
    );

    assert!(matches!(linger, Err(BridgeError::ServerCrashed(_))), "got {linger:?}");
    assert!(matches!(late, Err(BridgeError::ServerCrashed(_))), "got {late:?}");
}
