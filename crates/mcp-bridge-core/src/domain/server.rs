//! Server configuration and lifecycle types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorInfo;

/// Launch configuration for one MCP server.
///
/// A configuration is immutable once stored; edits replace the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Stable unique identifier (also used in URLs).
    ///
    /// Stored records and `PUT /servers/{id}` bodies may omit it; the map
    /// key or path segment supplies it.
    #[serde(default)]
    pub id: String,

    /// Human-readable name. Defaults to the id.
    #[serde(default)]
    pub display_name: String,

    /// Executable to spawn (e.g. "npx" or "/usr/local/bin/my-server").
    pub command: String,

    /// Ordered arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the child process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory for the child process (must be absolute).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Create a configuration with no environment and the id as display name.
    pub fn new(id: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            command: command.into(),
            args,
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Fill the display name from the id when it is blank.
    pub fn fill_display_name(&mut self) {
        if self.display_name.trim().is_empty() {
            self.display_name.clone_from(&self.id);
        }
    }

    /// Validate the configuration.
    ///
    /// Returns a user-facing message describing the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        validate_server_id(&self.id)?;

        if self.command.trim().is_empty() {
            return Err("command cannot be empty".to_string());
        }
        if self.command.trim() != self.command {
            return Err(format!(
                "command must not have leading or trailing whitespace: {:?}",
                self.command
            ));
        }

        for key in self.env.keys() {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(format!("invalid environment variable name: {key:?}"));
            }
        }

        if let Some(ref dir) = self.working_dir {
            if !dir.is_absolute() {
                return Err(format!(
                    "working directory must be absolute: {}",
                    dir.display()
                ));
            }
        }

        Ok(())
    }
}

/// Validate a server id.
///
/// Ids appear in URL paths, so they are restricted to `[A-Za-z0-9._-]`.
pub fn validate_server_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("server id cannot be empty".to_string());
    }
    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(format!("server id {id:?} contains invalid character {bad:?}"));
    }
    Ok(())
}

/// Lifecycle state of a server process.
///
/// ```text
/// Stopped -> Starting -> Running -> Stopping -> Stopped
///               |           |
///               +-> Crashed <-+
/// ```
///
/// `Crashed` is terminal until an explicit start re-enters `Starting`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl ServerState {
    /// Whether a start request is accepted from this state.
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Stopped | Self::Crashed)
    }

    /// Whether a process may be alive in this state.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }

    /// Lowercase name, as used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Crashed => "crashed",
        }
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of a server's runtime record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub server_id: String,
    pub state: ServerState,
    /// OS process id while a process is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// When the current (or last) process was spawned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Error that caused the last transition into `Crashed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorInfo>,
}

impl ServerStatus {
    /// Status of a server that has never been started.
    pub fn stopped(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            state: ServerState::Stopped,
            pid: None,
            started_at: None,
            last_error: None,
        }
    }
}

/// A configured server together with its runtime status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    pub config: ServerConfig,
    pub status: ServerStatus,
    /// Number of tools in the cached catalog (last known).
    pub tool_count: usize,
}
