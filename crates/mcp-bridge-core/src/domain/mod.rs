//! Bridge domain types.
//!
//! These types describe configured MCP servers independent of any
//! infrastructure concerns (storage, process management, transport).
//!
//! # Design
//!
//! - `ServerConfig` - Launch configuration, replaced wholesale on edit
//! - `ServerState` - Lifecycle state machine of a server process
//! - `ServerStatus` - Read-only snapshot handed out by the supervisor
//! - `ToolDescriptor` - Tool advertised by a server during discovery
//! - `ImportEntry` / `ImportOutcome` - Batch config import parsing and results

mod import;
mod server;
mod tool;

pub use import::{ImportEntry, ImportOutcome, parse_import};
pub use server::{ServerConfig, ServerState, ServerStatus, ServerSummary, validate_server_id};
pub use tool::{ServerTool, ToolDescriptor};
