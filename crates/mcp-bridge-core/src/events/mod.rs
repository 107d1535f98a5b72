//! Canonical event union streamed to clients.
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "server_state_changed", "serverId": "fs", "state": "running" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ServerState, ToolDescriptor};
use crate::error::ErrorInfo;

/// Events published by the bridge.
///
/// Every variant except `Overflow` is scoped to one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A server moved to a new lifecycle state.
    ServerStateChanged {
        #[serde(rename = "serverId")]
        server_id: String,
        state: ServerState,
        /// Present when the transition was caused by a failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
    },

    /// A server's tool catalog was replaced.
    ToolsRefreshed {
        #[serde(rename = "serverId")]
        server_id: String,
        tools: Vec<ToolDescriptor>,
    },

    /// A JSON-RPC notification sent by a server.
    ServerNotification {
        #[serde(rename = "serverId")]
        server_id: String,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },

    /// A server configuration was added or replaced.
    ServerAdded {
        #[serde(rename = "serverId")]
        server_id: String,
    },

    /// A server configuration was removed.
    ServerRemoved {
        #[serde(rename = "serverId")]
        server_id: String,
    },

    /// Events were dropped because this subscriber fell behind.
    Overflow {
        /// Number of events dropped since the last delivered one.
        dropped: u64,
    },
}

impl BridgeEvent {
    pub fn state_changed(
        server_id: impl Into<String>,
        state: ServerState,
        error: Option<ErrorInfo>,
    ) -> Self {
        Self::ServerStateChanged {
            server_id: server_id.into(),
            state,
            error,
        }
    }

    pub fn tools_refreshed(server_id: impl Into<String>, tools: Vec<ToolDescriptor>) -> Self {
        Self::ToolsRefreshed {
            server_id: server_id.into(),
            tools,
        }
    }

    pub fn notification(
        server_id: impl Into<String>,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Self {
        Self::ServerNotification {
            server_id: server_id.into(),
            method: method.into(),
            params,
        }
    }

    pub fn server_added(server_id: impl Into<String>) -> Self {
        Self::ServerAdded {
            server_id: server_id.into(),
        }
    }

    pub fn server_removed(server_id: impl Into<String>) -> Self {
        Self::ServerRemoved {
            server_id: server_id.into(),
        }
    }

    pub const fn overflow(dropped: u64) -> Self {
        Self::Overflow { dropped }
    }

    /// Originating server, if the event is server-scoped.
    pub fn server_id(&self) -> Option<&str> {
        match self {
            Self::ServerStateChanged { server_id, .. }
            | Self::ToolsRefreshed { server_id, .. }
            | Self::ServerNotification { server_id, .. }
            | Self::ServerAdded { server_id }
            | Self::ServerRemoved { server_id } => Some(server_id),
            Self::Overflow { .. } => None,
        }
    }

    /// The `type` tag, also used as the SSE event name.
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::ServerStateChanged { .. } => "server_state_changed",
            Self::ToolsRefreshed { .. } => "tools_refreshed",
            Self::ServerNotification { .. } => "server_notification",
            Self::ServerAdded { .. } => "server_added",
            Self::ServerRemoved { .. } => "server_removed",
            Self::Overflow { .. } => "overflow",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_state_changed_wire_format() {
        let event = BridgeEvent::state_changed(
            "flaky",
            ServerState::Crashed,
            Some(ErrorInfo::new(ErrorKind::HandshakeFailed, "eof")),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "server_state_changed");
        assert_eq!(json["serverId"], "flaky");
        assert_eq!(json["state"], "crashed");
        assert_eq!(json["error"]["kind"], "HandshakeFailed");
        assert_eq!(event.event_type(), "server_state_changed");
    }

    #[test]
    fn test_overflow_has_no_server() {
        let event = BridgeEvent::overflow(3);
        assert_eq!(event.server_id(), None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "overflow", "dropped": 3 }));
    }

    #[test]
    fn test_notification_carries_server_id() {
        let event = BridgeEvent::notification("A", "notifications/progress", None);
        assert_eq!(event.server_id(), Some("A"));
        assert_eq!(event.event_type(), "server_notification");
    }
}
