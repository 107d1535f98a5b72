//! Shared helpers for mcp-bridge-axum tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use mcp_bridge_axum::bootstrap::{BridgeConfig, CorsConfig, bootstrap};
use mcp_bridge_axum::routes::create_router;
use mcp_bridge_core::BridgeSettings;
use mcp_bridge_runtime::BridgeService;

/// Minimal line-delimited JSON-RPC server: `echo` answers with its
/// arguments, `never` does not answer.
pub const ECHO_SERVER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/^{"id":\([0-9]*\),.*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"echo"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","inputSchema":{"type":"object"}},{"name":"never"}]}}\n' "$id" ;;
    *'"name":"echo"'*)
      args=$(printf '%s\n' "$line" | sed -n 's/.*"arguments":\({[^}]*}\).*/\1/p')
      printf '{"jsonrpc":"2.0","id":%s,"result":{"echo":%s}}\n' "$id" "${args:-null}" ;;
  esac
done
"#;

pub struct TestApp {
    pub router: Router,
    pub service: Arc<BridgeService>,
    // Keeps the config store alive for the duration of the test.
    _dir: TempDir,
}

pub async fn test_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = BridgeConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        config_path: Some(dir.path().join("servers.json")),
        auto_start: false,
        cors: CorsConfig::AllowAll,
        settings: BridgeSettings {
            call_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            stop_grace: Duration::from_secs(1),
            ..BridgeSettings::default()
        },
    };

    let ctx = bootstrap(&config).await.unwrap();
    let service = Arc::clone(&ctx.service);
    TestApp {
        router: create_router(ctx, &config.cors),
        service,
        _dir: dir,
    }
}

/// Import document registering [`ECHO_SERVER`] under `id`.
pub fn echo_server_doc(id: &str) -> Value {
    serde_json::json!({
        "mcpServers": { id: { "command": "sh", "args": ["-c", ECHO_SERVER] } }
    })
}

/// Send a request and decode the JSON response body (`Null` if empty).
pub async fn send(app: &TestApp, method: &str, uri: &str, body: Option<String>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, Body::from))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}
