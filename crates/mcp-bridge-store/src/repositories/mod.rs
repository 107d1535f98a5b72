//! Implementations of the `ServerConfigRepository` port.

mod json_config_repository;
#[cfg(any(test, feature = "test-utils"))]
mod memory_config_repository;

pub use json_config_repository::JsonConfigRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use memory_config_repository::InMemoryConfigRepository;
