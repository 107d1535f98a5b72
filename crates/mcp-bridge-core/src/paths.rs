//! Data directory resolution.
//!
//! Resolution order for the data root:
//! 1. `MCP_BRIDGE_DATA_DIR` environment variable
//! 2. `<system data dir>/mcp-bridge`

use std::env;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;

const DATA_DIR_ENV: &str = "MCP_BRIDGE_DATA_DIR";
const CONFIG_FILE_NAME: &str = "servers.json";

/// Errors during path resolution.
#[derive(Debug, Error)]
pub enum PathError {
    /// Could not determine the system data directory.
    #[error("Cannot determine system data directory")]
    NoDataDir,

    /// Failed to create a directory.
    #[error("Failed to create directory {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },
}

/// Root directory for persisted bridge state. Created if missing.
pub fn data_root() -> Result<PathBuf, PathError> {
    let root = match env::var(DATA_DIR_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => dirs::data_dir()
            .ok_or(PathError::NoDataDir)?
            .join("mcp-bridge"),
    };

    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| PathError::CreateFailed {
            path: root.clone(),
            reason: e.to_string(),
        })?;
    }

    Ok(root)
}

/// Location of the server configuration store.
pub fn config_file_path() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join(CONFIG_FILE_NAME))
}
