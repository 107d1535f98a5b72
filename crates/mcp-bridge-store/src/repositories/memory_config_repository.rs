//! In-memory configuration repository for tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use mcp_bridge_core::ServerConfig;
use mcp_bridge_core::ports::{RepositoryError, ServerConfigRepository};

/// Volatile repository; contents are lost on drop.
#[derive(Default)]
pub struct InMemoryConfigRepository {
    servers: Mutex<BTreeMap<String, ServerConfig>>,
}

impl InMemoryConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-populated with `configs`.
    pub fn with_configs(configs: impl IntoIterator<Item = ServerConfig>) -> Self {
        Self {
            servers: Mutex::new(
                configs
                    .into_iter()
                    .map(|config| (config.id.clone(), config))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl ServerConfigRepository for InMemoryConfigRepository {
    async fn list(&self) -> Result<Vec<ServerConfig>, RepositoryError> {
        Ok(self.servers.lock().await.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<ServerConfig, RepositoryError> {
        self.servers
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn upsert(&self, config: ServerConfig) -> Result<Option<ServerConfig>, RepositoryError> {
        Ok(self.servers.lock().await.insert(config.id.clone(), config))
    }

    async fn upsert_many(&self, configs: Vec<ServerConfig>) -> Result<Vec<bool>, RepositoryError> {
        let mut servers = self.servers.lock().await;
        Ok(configs
            .into_iter()
            .map(|config| servers.insert(config.id.clone(), config).is_some())
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<ServerConfig, RepositoryError> {
        self.servers
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}
