//! Process runtime for mcp-bridge.
//!
//! Spawns MCP servers as child processes, speaks newline-delimited JSON-RPC
//! over their stdio, and fans lifecycle and notification events out to
//! subscribers.
//!
//! - [`framer`] / [`protocol`] - the wire format
//! - [`router`] - pending request bookkeeping and id rewriting
//! - [`connection`] - the per-server actor that owns the child's pipes
//! - [`supervisor`] - lifecycle state machine and crash detection
//! - [`catalog`] - cached tool descriptors
//! - [`broadcaster`] - bounded per-subscriber event queues
//! - [`service`] - the facade adapters talk to
#![deny(unused_crate_dependencies)]

// Only used by integration tests.
#[cfg(test)]
use mcp_bridge_store as _;
#[cfg(test)]
use tempfile as _;

pub mod broadcaster;
pub mod catalog;
pub mod connection;
pub mod framer;
pub mod logs;
pub mod protocol;
pub mod router;
pub mod service;
pub mod shutdown;
pub mod supervisor;

pub use broadcaster::{EventBroadcaster, Subscription, SubscriptionFilter};
pub use catalog::ToolCatalog;
pub use connection::{ServerHandle, TOOLS_LIST_CHANGED};
pub use logs::{LogLine, ServerLogs};
pub use service::{BridgeService, ToolCall};
pub use supervisor::Supervisor;

// Callers cancel in-flight tool calls with this token.
pub use tokio_util::sync::CancellationToken;
