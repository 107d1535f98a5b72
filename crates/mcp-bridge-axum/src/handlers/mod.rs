//! HTTP request handlers.
//!
//! Handlers are thin wrappers that delegate to `BridgeService`.

pub mod events;
pub mod servers;
pub mod tools;
