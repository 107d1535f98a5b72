//! Shared fixtures for runtime integration tests.
//!
//! The fake server is a POSIX shell loop speaking line-delimited JSON-RPC.
//! Tool names select its behavior.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mcp_bridge_core::{BridgeEvent, BridgeSettings, ServerConfig};
use mcp_bridge_runtime::{BridgeService, Subscription};
use mcp_bridge_store::InMemoryConfigRepository;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Tools advertised by [`FAKE_SERVER`]:
///
/// - `echo` returns `{"echo": <arguments>}`
/// - `slow` answers after one second
/// - `never` never answers
/// - `crash` exits with status 3
/// - `notify` sends two `notifications/message` before answering
/// - `log` writes a line to stderr
/// - `change` announces `tools/list_changed` and adds a tool named `added`
/// - `ping_back` pings the bridge and reports whether it got an answer
/// - `garbage` writes a non-JSON line before answering
/// - `fail` answers with a JSON-RPC error
/// - `linger` exits with status 3 while a background child keeps stdout open
pub const FAKE_SERVER: &str = r#"
extra=0
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/^{"id":\([0-9]*\),.*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{"listChanged":true}},"serverInfo":{"name":"fake","version":"1.0"}}}\n' "$id" ;;
    *'"method":"notifications/initialized"'*) ;;
    *'"method":"tools/list"'*)
      if [ "$extra" = 1 ]; then more=',{"name":"added"}'; else more=''; fi
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","description":"Echo arguments","inputSchema":{"type":"object"}},{"name":"slow"},{"name":"never"},{"name":"crash"},{"name":"notify"},{"name":"log"},{"name":"change"},{"name":"ping_back"},{"name":"garbage"},{"name":"fail"},{"name":"linger"}%s]}}\n' "$id" "$more" ;;
    *'"method":"tools/call"'*)
      case "$line" in
        *'"name":"echo"'*|*'"name":"added"'*)
          args=$(printf '%s\n' "$line" | sed -n 's/.*"arguments":\({[^}]*}\).*/\1/p')
          printf '{"jsonrpc":"2.0","id":%s,"result":{"echo":%s}}\n' "$id" "${args:-null}" ;;
        *'"name":"slow"'*)
          sleep 1
          printf '{"jsonrpc":"2.0","id":%s,"result":{"slow":true}}\n' "$id" ;;
        *'"name":"never"'*) ;;
        *'"name":"crash"'*) exit 3 ;;
        *'"name":"linger"'*)
          sleep 2 &
          exit 3 ;;
        *'"name":"notify"'*)
          printf '{"jsonrpc":"2.0","method":"notifications/message","params":{"seq":1}}\n'
          printf '{"jsonrpc":"2.0","method":"notifications/message","params":{"seq":2}}\n'
          printf '{"jsonrpc":"2.0","id":%s,"result":{"sent":2}}\n' "$id" ;;
        *'"name":"log"'*)
          echo "fake: diagnostic line" >&2
          printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id" ;;
        *'"name":"change"'*)
          extra=1
          printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id"
          printf '{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}\n' ;;
        *'"name":"ping_back"'*)
          printf '{"jsonrpc":"2.0","id":"srv-1","method":"ping"}\n'
          IFS= read -r reply
          case "$reply" in
            *'"id":"srv-1"'*'"result":{}'*) ok=true ;;
            *) ok=false ;;
          esac
          printf '{"jsonrpc":"2.0","id":%s,"result":{"pong":%s}}\n' "$id" "$ok" ;;
        *'"name":"garbage"'*)
          printf 'this is not json\n'
          printf '{"jsonrpc":"2.0","id":%s,"result":{"survived":true}}\n' "$id" ;;
        *)
          printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32602,"message":"unknown tool"}}\n' "$id" ;;
      esac ;;
    *)
      if [ -n "$id" ]; then
        printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"Method not found"}}\n' "$id"
      fi ;;
  esac
done
"#;

pub fn fake_server(id: &str) -> ServerConfig {
    ServerConfig::new(id, "sh", vec!["-c".to_string(), FAKE_SERVER.to_string()])
}

/// A server that dies before answering `initialize`.
pub fn flaky_server(id: &str) -> ServerConfig {
    ServerConfig::new(
        id,
        "sh",
        vec!["-c".to_string(), "echo 'flaky: boom' >&2; exit 1".to_string()],
    )
}

/// Answers the handshake with one `echo` tool, then runs `tail`.
fn handshake_then(id: &str, tail: &str) -> ServerConfig {
    let script = format!(
        r#"
while IFS= read -r line; do
  rid=$(printf '%s\n' "$line" | sed -n 's/^{{"id":\([0-9]*\),.*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{{"jsonrpc":"2.0","id":%s,"result":{{"protocolVersion":"2024-11-05","capabilities":{{"tools":{{}}}}}}}}\n' "$rid" ;;
    *'"method":"tools/list"'*)
      printf '{{"jsonrpc":"2.0","id":%s,"result":{{"tools":[{{"name":"echo"}}]}}}}\n' "$rid"
      {tail} ;;
  esac
done
"#
    );
    ServerConfig::new(id, "sh", vec!["-c".to_string(), script])
}

/// A server that exits as soon as it has listed its tools.
pub fn short_lived_server(id: &str) -> ServerConfig {
    handshake_then(id, "exit 0")
}

/// A server that closes its stdin after the handshake and stays alive.
pub fn deaf_server(id: &str) -> ServerConfig {
    handshake_then(id, "exec 0<&-; sleep 30")
}

/// A server that reads everything and never answers.
pub fn mute_server(id: &str) -> ServerConfig {
    ServerConfig::new(
        id,
        "sh",
        vec!["-c".to_string(), "cat >/dev/null".to_string()],
    )
}

pub fn test_settings() -> BridgeSettings {
    BridgeSettings {
        call_timeout: Duration::from_secs(5),
        handshake_timeout: Duration::from_secs(5),
        stop_grace: Duration::from_secs(1),
        ..BridgeSettings::default()
    }
}

pub fn service_with(configs: Vec<ServerConfig>) -> BridgeService {
    BridgeService::new(
        Arc::new(InMemoryConfigRepository::with_configs(configs)),
        test_settings(),
    )
}

/// Receive events until one matches, failing after [`EVENT_TIMEOUT`].
pub async fn wait_for_event(
    sub: &mut Subscription,
    pred: impl Fn(&BridgeEvent) -> bool,
) -> BridgeEvent {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match sub.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => {}
                None => panic!("subscription closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
