//! Request and query types of the HTTP API.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use mcp_bridge_runtime::{SubscriptionFilter, ToolCall};

/// Body of `POST /servers/{id}/call`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolBody {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    /// Per-call timeout; the configured default applies when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl CallToolBody {
    pub fn into_call(self, server_id: String) -> ToolCall {
        let call = ToolCall::new(server_id, self.name, self.arguments);
        match self.timeout_ms {
            Some(ms) if ms > 0 => call.with_timeout(Duration::from_millis(ms)),
            _ => call,
        }
    }
}

/// Query of `GET /events`.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Comma-separated server ids; absent or empty means all servers.
    #[serde(default)]
    pub servers: Option<String>,
}

impl EventsQuery {
    pub fn filter(&self) -> SubscriptionFilter {
        let ids = self
            .servers
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty());
        SubscriptionFilter::from_ids(ids)
    }
}
