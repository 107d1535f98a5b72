//! Core domain types and port definitions for mcp-bridge.
//!
//! This crate has no process, network or storage code. It defines:
//!
//! - `domain` - server configurations, lifecycle states, tool descriptors, config import
//! - `events` - the canonical [`BridgeEvent`] union streamed to clients
//! - `ports` - traits implemented by adapters (event emitter, config repository)
//! - `error` - the bridge error taxonomy shared by every layer
//! - `settings` - runtime tunables
//! - `paths` - data directory resolution
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod error;
pub mod events;
pub mod paths;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    ImportEntry, ImportOutcome, ServerConfig, ServerState, ServerStatus, ServerSummary,
    ServerTool, ToolDescriptor, parse_import, validate_server_id,
};
pub use error::{BridgeError, ErrorInfo, ErrorKind};
pub use events::BridgeEvent;
pub use paths::{PathError, config_file_path, data_root};
pub use ports::{BridgeEventEmitter, NoopEmitter, RepositoryError, ServerConfigRepository};
pub use settings::BridgeSettings;
