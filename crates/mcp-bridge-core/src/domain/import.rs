//! Batch import of server configurations.
//!
//! Accepts the layouts commonly pasted from MCP client configs:
//!
//! ```json
//! { "mcpServers": { "fs": { "command": "npx", "args": ["-y", "..."] } } }
//! { "mcp": { "servers": { "fs": { "command": "npx" } } } }
//! { "fs": { "command": "npx" } }
//! ```
//!
//! Each entry is validated on its own; a bad entry never rejects its siblings.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::server::ServerConfig;
use crate::error::{BridgeError, ErrorInfo};

/// One parsed entry of an import document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Key of the entry in the document.
    pub id: String,
    /// The validated configuration, or why it was rejected.
    pub config: Result<ServerConfig, String>,
}

/// Per-entry result of an import request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub id: String,
    pub imported: bool,
    /// An existing configuration with the same id was replaced.
    #[serde(default)]
    pub replaced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ImportOutcome {
    pub fn imported(id: impl Into<String>, replaced: bool) -> Self {
        Self {
            id: id.into(),
            imported: true,
            replaced,
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: &BridgeError) -> Self {
        Self {
            id: id.into(),
            imported: false,
            replaced: false,
            error: Some(ErrorInfo::from(error)),
        }
    }
}

/// Parse an import document into per-entry results.
///
/// Fails as a whole only when the document has no recognizable server map.
pub fn parse_import(doc: &Value) -> Result<Vec<ImportEntry>, BridgeError> {
    let servers = locate_servers(doc)?;
    if servers.is_empty() {
        return Err(BridgeError::InvalidConfig(
            "no server configurations found".to_string(),
        ));
    }

    Ok(servers
        .iter()
        .map(|(id, entry)| ImportEntry {
            id: id.clone(),
            config: parse_entry(id, entry),
        })
        .collect())
}

fn locate_servers(doc: &Value) -> Result<&Map<String, Value>, BridgeError> {
    let root = doc
        .as_object()
        .ok_or_else(|| BridgeError::InvalidConfig("document must be a JSON object".to_string()))?;

    if let Some(servers) = root.get("mcpServers") {
        return servers
            .as_object()
            .ok_or_else(|| BridgeError::InvalidConfig("mcpServers must be an object".to_string()));
    }

    if let Some(servers) = root.get("mcp").and_then(|mcp| mcp.get("servers")) {
        return servers
            .as_object()
            .ok_or_else(|| BridgeError::InvalidConfig("mcp.servers must be an object".to_string()));
    }

    Ok(root)
}

fn parse_entry(id: &str, entry: &Value) -> Result<ServerConfig, String> {
    let obj = entry
        .as_object()
        .ok_or_else(|| "entry must be an object".to_string())?;

    let command = match obj.get("command") {
        Some(Value::String(cmd)) => cmd.clone(),
        Some(_) => return Err("command must be a string".to_string()),
        None if obj.contains_key("url") => {
            return Err("remote (url) servers are not supported, only stdio commands".to_string());
        }
        None => return Err("missing command".to_string()),
    };

    let args = match obj.get("args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("args must be strings, got {item}"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err("args must be an array".to_string()),
    };

    let env = match obj.get("env") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(vars)) => vars
            .iter()
            .map(|(key, value)| env_value(key, value).map(|v| (key.clone(), v)))
            .collect::<Result<BTreeMap<_, _>, _>>()?,
        Some(_) => return Err("env must be an object".to_string()),
    };

    let display_name = obj
        .get("displayName")
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)
        .unwrap_or(id)
        .to_string();

    let working_dir = obj
        .get("cwd")
        .or_else(|| obj.get("workingDir"))
        .and_then(Value::as_str)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from);

    let config = ServerConfig {
        id: id.to_string(),
        display_name,
        command,
        args,
        env,
        working_dir,
    };
    config.validate()?;
    Ok(config)
}

fn env_value(key: &str, value: &Value) -> Result<String, String> {
    match value {
        // VS Code prompts for these at launch; leave a visible placeholder instead.
        Value::String(s) if s.starts_with("${input:") => Ok(format!("<REPLACE_WITH_YOUR_{key}>")),
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("env value for {key} must be a string, got {other}")),
    }
}
