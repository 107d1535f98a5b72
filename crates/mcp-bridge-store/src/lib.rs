//! Server configuration store implementations for mcp-bridge.
//!
//! - [`JsonConfigRepository`] - durable store backed by one JSON file
//! - [`InMemoryConfigRepository`] - volatile store for tests (`test-utils`)
#![deny(unused_crate_dependencies)]

pub mod repositories;

pub use repositories::JsonConfigRepository;

#[cfg(any(test, feature = "test-utils"))]
pub use repositories::InMemoryConfigRepository;
