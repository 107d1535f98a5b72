//! JSON-file implementation of the server configuration repository.
//!
//! File format:
//! ```json
//! { "version": 1, "servers": { "fs": { "id": "fs", "command": "npx", ... } } }
//! ```
//!
//! The whole file is rewritten on every mutation using temp file + rename, so
//! a crash mid-write leaves the previous contents intact.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use mcp_bridge_core::ServerConfig;
use mcp_bridge_core::ports::{RepositoryError, ServerConfigRepository};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    servers: BTreeMap<String, ServerConfig>,
}

/// Configuration repository persisted to a single JSON file.
///
/// Records are cached in memory; the cache only changes after the file write
/// succeeded.
pub struct JsonConfigRepository {
    path: PathBuf,
    servers: Mutex<BTreeMap<String, ServerConfig>>,
}

impl JsonConfigRepository {
    /// Open the store at `path`, loading existing records.
    ///
    /// A missing file is an empty store; it is created on the first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        let servers = load(&path).await?;
        tracing::debug!(path = %path.display(), count = servers.len(), "Loaded server configs");
        Ok(Self {
            path,
            servers: Mutex::new(servers),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, servers: &BTreeMap<String, ServerConfig>) -> Result<(), RepositoryError> {
        let doc = StoreFile {
            version: FORMAT_VERSION,
            servers: servers.clone(),
        };
        let content = serde_json::to_vec_pretty(&doc)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        write_atomic(&self.path, &content)
            .await
            .map_err(|e| storage_error(&self.path, &e))
    }
}

async fn load(path: &Path) -> Result<BTreeMap<String, ServerConfig>, RepositoryError> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(storage_error(path, &e)),
    };

    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }

    let doc: StoreFile = serde_json::from_slice(&content).map_err(|e| {
        RepositoryError::Serialization(format!("{}: {e}", path.display()))
    })?;

    if doc.version != FORMAT_VERSION {
        tracing::warn!(
            path = %path.display(),
            version = doc.version,
            "Unknown config store version, loading anyway"
        );
    }

    // Keys are authoritative; a record whose inner id drifted is realigned.
    Ok(doc
        .servers
        .into_iter()
        .map(|(id, mut config)| {
            config.id.clone_from(&id);
            config.fill_display_name();
            (id, config)
        })
        .collect())
}

async fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    fs::write(&temp, content).await?;
    fs::rename(&temp, path).await
}

fn storage_error(path: &Path, err: &io::Error) -> RepositoryError {
    RepositoryError::Storage(format!("{}: {err}", path.display()))
}

#[async_trait]
impl ServerConfigRepository for JsonConfigRepository {
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
        let mut servers = self.servers.lock().await;
        let mut next = servers.clone();
        let previous = next.insert(config.id.clone(), config);
        self.persist(&next).await?;
        *servers = next;
        Ok(previous)
    }

    async fn upsert_many(&self, configs: Vec<ServerConfig>) -> Result<Vec<bool>, RepositoryError> {
        let mut servers = self.servers.lock().await;
        let mut next = servers.clone();
        let replaced = configs
            .into_iter()
            .map(|config| next.insert(config.id.clone(), config).is_some())
            .collect();
        self.persist(&next).await?;
        *servers = next;
        Ok(replaced)
    }

    async fn remove(&self, id: &str) -> Result<ServerConfig, RepositoryError> {
        let mut servers = self.servers.lock().await;
        let mut next = servers.clone();
        let removed = next
            .remove(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        self.persist(&next).await?;
        *servers = next;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(id: &str) -> ServerConfig {
        ServerConfig::new(id, "cat", vec![])
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let repo = JsonConfigRepository::open(dir.path().join("servers.json"))
            .await
            .unwrap();
        assert!(repo.list().await.unwrap().is_empty());
        assert!(!repo.path().exists());
    }

    #[tokio::test]
    async fn test_upsert_persists_and_reports_replacement() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("servers.json");
        let repo = JsonConfigRepository::open(&path).await.unwrap();

        assert!(repo.upsert(config("fs")).await.unwrap().is_none());
        let previous = repo
            .upsert(config("fs").with_display_name("Files"))
            .await
            .unwrap();
        assert_eq!(previous.unwrap().display_name, "fs");

        let reopened = JsonConfigRepository::open(&path).await.unwrap();
        assert_eq!(reopened.get("fs").await.unwrap().display_name, "Files");
        assert!(!dir.path().join("nested").join("servers.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_remove_unknown_is_not_found() {
        let dir = TempDir::new().unwrap();
        let repo = JsonConfigRepository::open(dir.path().join("servers.json"))
            .await
            .unwrap();
        assert!(matches!(
            repo.remove("ghost").await,
            Err(RepositoryError::NotFound(id)) if id == "ghost"
        ));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonConfigRepository::open(&path).await,
            Err(RepositoryError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_hand_edited_record_without_display_name_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(
            &path,
            r#"{"version":1,"servers":{"fs":{"command":"npx","args":["-y","@mcp/fs"]}}}"#,
        )
        .unwrap();

        let repo = JsonConfigRepository::open(&path).await.unwrap();
        let config = repo.get("fs").await.unwrap();
        assert_eq!(config.id, "fs");
        assert_eq!(config.display_name, "fs");
        assert_eq!(config.args, vec!["-y", "@mcp/fs"]);
    }
}
