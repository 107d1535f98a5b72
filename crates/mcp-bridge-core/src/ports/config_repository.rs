//! Server configuration repository trait and error types.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ServerConfig;

/// Errors from configuration persistence.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No configuration with this id.
    #[error("Server config not found: {0}")]
    NotFound(String),

    /// The backing store could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The stored document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Durable mapping of server id to launch configuration.
///
/// # Design Rules
///
/// - Records are replaced wholesale; there is no partial update
/// - Every mutating call is persisted before it returns
/// - `list` is ordered by id
#[async_trait]
pub trait ServerConfigRepository: Send + Sync {
    /// All stored configurations, ordered by id.
    ///
    /// # Errors
    ///
    /// - `Storage` / `Serialization` if the store cannot be read
    async fn list(&self) -> Result<Vec<ServerConfig>, RepositoryError>;

    /// Look up one configuration.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no configuration has this id
    async fn get(&self, id: &str) -> Result<ServerConfig, RepositoryError>;

    /// Insert or replace a configuration, returning the replaced record.
    async fn upsert(&self, config: ServerConfig) -> Result<Option<ServerConfig>, RepositoryError>;

    /// Insert or replace several configurations with a single write.
    ///
    /// Returns, per input, whether an existing record was replaced.
    async fn upsert_many(&self, configs: Vec<ServerConfig>) -> Result<Vec<bool>, RepositoryError>;

    /// Delete a configuration, returning it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no configuration has this id
    async fn remove(&self, id: &str) -> Result<ServerConfig, RepositoryError>;
}
