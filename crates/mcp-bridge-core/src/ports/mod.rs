//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the runtime expects from adapters. They use
//! only domain types: no file handles, channels or HTTP types in signatures.

pub mod config_repository;
pub mod event_emitter;

pub use config_repository::{RepositoryError, ServerConfigRepository};
pub use event_emitter::{BridgeEventEmitter, NoopEmitter};
