//! Process supervision: one child process per configured server.
//!
//! ```text
//! Stopped ─start─▶ Starting ─handshake ok─▶ Running ─stop─▶ Stopping ─▶ Stopped
//!                     │                        │
//!                     └─spawn/handshake fail───┴─unexpected exit─▶ Crashed
//! ```
//!
//! The state table is only written here. Each start bumps the slot's
//! generation so that a late exit report from an older process can never
//! overwrite the state of a newer one.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use chrono::{DateTime, Utc};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use mcp_bridge_core::{
    BridgeError, BridgeEvent, BridgeEventEmitter, BridgeSettings, ErrorInfo, ErrorKind,
    ServerConfig, ServerState, ServerStatus, ToolDescriptor,
};

use crate::catalog::{ToolCatalog, fetch_tools};
use crate::connection::{ConnectionContext, ConnectionExit, ServerHandle, attach};
use crate::logs::ServerLogs;
use crate::protocol::{InitializeResult, RequestId, initialize_params};

#[derive(Debug, Default)]
struct Slot {
    state: ServerState,
    pid: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<ErrorInfo>,
    handle: Option<ServerHandle>,
    generation: u64,
}

impl Slot {
    fn snapshot(&self, server_id: &str) -> ServerStatus {
        ServerStatus {
            server_id: server_id.to_string(),
            state: self.state,
            pid: self.pid,
            started_at: self.started_at,
            last_error: self.last_error.clone(),
        }
    }
}

struct Inner {
    settings: BridgeSettings,
    table: RwLock<HashMap<String, Slot>>,
    events: Arc<dyn BridgeEventEmitter>,
    catalog: Arc<ToolCatalog>,
    logs: Arc<ServerLogs>,
    tools_changed: mpsc::UnboundedSender<String>,
}

impl Inner {
    fn table(&self) -> RwLockReadGuard<'_, HashMap<String, Slot>> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn table_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot>> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_state(&self, server_id: &str, state: ServerState, error: Option<ErrorInfo>) {
        self.events
            .emit(BridgeEvent::state_changed(server_id, state, error));
    }

    /// Record the end of a connection task.
    fn on_exit(&self, server_id: &str, generation: u64, exit: &ConnectionExit) {
        let crashed = {
            let mut table = self.table_mut();
            let Some(slot) = table.get_mut(server_id) else {
                return;
            };
            if slot.generation != generation {
                return;
            }
            slot.pid = None;
            slot.handle = None;

            // Starting and Stopping are resolved by the start/stop call in
            // progress.
            if slot.state == ServerState::Running && !exit.stopped {
                let error = ErrorInfo::new(
                    ErrorKind::ServerCrashed,
                    format!("Server {server_id} crashed: {}", exit.describe()),
                );
                slot.state = ServerState::Crashed;
                slot.last_error = Some(error.clone());
                Some(error)
            } else {
                None
            }
        };

        if let Some(error) = crashed {
            tracing::warn!(server_id = %server_id, error = %error.message, "Server crashed");
            self.emit_state(server_id, ServerState::Crashed, Some(error));
        }
    }
}

/// How a completed handshake landed in the state table.
enum Settled {
    Running(ServerStatus),
    Exited(ErrorInfo),
    /// A stop or a newer start took over the slot.
    Superseded,
}

/// Owns the lifecycle of every server process.
///
/// Cheap to clone; clones share the same state table.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Create a supervisor. Must be called inside a Tokio runtime.
    pub fn new(
        settings: BridgeSettings,
        events: Arc<dyn BridgeEventEmitter>,
        catalog: Arc<ToolCatalog>,
        logs: Arc<ServerLogs>,
    ) -> Self {
        let (tools_changed, refresh_requests) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            settings,
            table: RwLock::new(HashMap::new()),
            events,
            catalog,
            logs,
            tools_changed,
        });
        tokio::spawn(refresh_loop(Arc::downgrade(&inner), refresh_requests));
        Self { inner }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.inner.settings
    }

    /// Spawn the server and run the discovery handshake.
    ///
    /// Resolves once the server is `Running` or the start failed.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` unless the server is `Stopped` or `Crashed`
    /// - `SpawnFailed` / `HandshakeFailed` (the server is then `Crashed`)
    /// - `ServerStopped` if a stop arrived during the handshake
    /// - `ServerCrashed` if the process exited as the handshake completed
    pub async fn start(&self, config: &ServerConfig) -> Result<ServerStatus, BridgeError> {
        let (handle, generation) = self.spawn(config)?;
        self.handshake(&config.id, &handle, generation).await
    }

    fn spawn(&self, config: &ServerConfig) -> Result<(ServerHandle, u64), BridgeError> {
        let server_id = config.id.as_str();
        let mut table = self.inner.table_mut();
        let slot = table.entry(server_id.to_string()).or_default();
        if !slot.state.can_start() {
            return Err(BridgeError::AlreadyRunning(server_id.to_string()));
        }

        slot.generation += 1;
        let generation = slot.generation;
        slot.state = ServerState::Starting;
        slot.last_error = None;
        slot.started_at = Some(Utc::now());

        let ctx = ConnectionContext {
            events: Arc::clone(&self.inner.events),
            logs: Arc::clone(&self.inner.logs),
            tools_changed: self.inner.tools_changed.clone(),
            max_frame_len: self.inner.settings.max_frame_len,
        };
        let spawned = spawn_process(config).and_then(|child| {
            let pid = child.id();
            attach(server_id, child, ctx).map(|(handle, task)| (pid, handle, task))
        });

        match spawned {
            Ok((pid, handle, task)) => {
                slot.pid = pid;
                slot.handle = Some(handle.clone());
                drop(table);

                tracing::info!(server_id = %server_id, pid = ?pid, command = %config.command, "Server process spawned");
                self.inner.emit_state(server_id, ServerState::Starting, None);

                let inner = Arc::clone(&self.inner);
                let id = server_id.to_string();
                tokio::spawn(async move {
                    let exit = task.await;
                    inner.on_exit(&id, generation, &exit);
                });

                Ok((handle, generation))
            }
            Err(err) => {
                let info = ErrorInfo::from(&err);
                slot.state = ServerState::Crashed;
                slot.last_error = Some(info.clone());
                slot.started_at = None;
                drop(table);

                tracing::error!(server_id = %server_id, error = %err, "Failed to spawn server");
                self.inner.emit_state(server_id, ServerState::Starting, None);
                self.inner
                    .emit_state(server_id, ServerState::Crashed, Some(info));
                Err(err)
            }
        }
    }

    async fn handshake(
        &self,
        server_id: &str,
        handle: &ServerHandle,
        generation: u64,
    ) -> Result<ServerStatus, BridgeError> {
        let timeout = self.inner.settings.handshake_timeout;
        let step = |name: &'static str| {
            move |e: BridgeError| BridgeError::HandshakeFailed(format!("{name}: {e}"))
        };

        let outcome = async {
            let reply = handle
                .request(
                    RequestId::from("initialize"),
                    "initialize",
                    Some(initialize_params()),
                    timeout,
                )
                .await
                .map_err(step("initialize"))?;
            let init: InitializeResult = serde_json::from_value(reply.result).map_err(|e| {
                BridgeError::HandshakeFailed(format!("initialize: malformed result: {e}"))
            })?;

            handle
                .notify("notifications/initialized", None)
                .await
                .map_err(step("notifications/initialized"))?;

            let tools = if init.capabilities.tools.is_some() {
                fetch_tools(handle, timeout)
                    .await
                    .map_err(step("tools/list"))?
            } else {
                Vec::new()
            };
            Ok::<_, BridgeError>((init, tools))
        }
        .await;

        match outcome {
            Ok((init, tools)) => {
                let settled = {
                    let mut table = self.inner.table_mut();
                    match table.get_mut(server_id) {
                        Some(slot)
                            if slot.generation == generation
                                && slot.state == ServerState::Starting =>
                        {
                            // The exit watcher clears the handle; the process
                            // is gone even though the handshake completed.
                            if slot.handle.is_some() {
                                self.inner.catalog.replace(server_id, tools.clone());
                                slot.state = ServerState::Running;
                                Settled::Running(slot.snapshot(server_id))
                            } else {
                                let error = ErrorInfo::new(
                                    ErrorKind::ServerCrashed,
                                    format!("Server {server_id} exited during startup"),
                                );
                                slot.state = ServerState::Crashed;
                                slot.last_error = Some(error.clone());
                                Settled::Exited(error)
                            }
                        }
                        _ => Settled::Superseded,
                    }
                };
                let status = match settled {
                    Settled::Running(status) => status,
                    Settled::Exited(error) => {
                        tracing::warn!(server_id = %server_id, "Server exited right after its handshake");
                        self.inner
                            .emit_state(server_id, ServerState::Crashed, Some(error));
                        return Err(BridgeError::ServerCrashed(server_id.to_string()));
                    }
                    Settled::Superseded => {
                        return Err(BridgeError::ServerStopped(server_id.to_string()));
                    }
                };

                tracing::info!(
                    server_id = %server_id,
                    server_name = init.server_info.as_ref().map_or("unknown", |i| i.name.as_str()),
                    protocol_version = %init.protocol_version,
                    tools = tools.len(),
                    "Server running"
                );
                self.inner
                    .emit_state(server_id, ServerState::Running, None);
                self.inner
                    .events
                    .emit(BridgeEvent::tools_refreshed(server_id, tools));
                Ok(status)
            }
            Err(err) => {
                let crashed = {
                    let mut table = self.inner.table_mut();
                    match table.get_mut(server_id) {
                        Some(slot)
                            if slot.generation == generation
                                && slot.state == ServerState::Starting =>
                        {
                            slot.state = ServerState::Crashed;
                            slot.last_error = Some(ErrorInfo::from(&err));
                            slot.handle = None;
                            true
                        }
                        _ => false,
                    }
                };
                if !crashed {
                    return Err(BridgeError::ServerStopped(server_id.to_string()));
                }

                tracing::warn!(server_id = %server_id, error = %err, "Handshake failed");
                self.inner
                    .emit_state(server_id, ServerState::Crashed, Some(ErrorInfo::from(&err)));
                handle.shutdown(self.inner.settings.stop_grace).await;
                Err(err)
            }
        }
    }

    /// Stop a live server and wait for its process to be reaped.
    ///
    /// Pending calls resolve with `ServerStopped`.
    ///
    /// # Errors
    ///
    /// - `NotRunning` if the server is not `Starting` or `Running`
    pub async fn stop(&self, server_id: &str) -> Result<ServerStatus, BridgeError> {
        let (handle, generation) = {
            let mut table = self.inner.table_mut();
            let slot = table
                .get_mut(server_id)
                .filter(|slot| matches!(slot.state, ServerState::Starting | ServerState::Running))
                .ok_or_else(|| BridgeError::NotRunning(server_id.to_string()))?;
            slot.state = ServerState::Stopping;
            (slot.handle.take(), slot.generation)
        };
        tracing::info!(server_id = %server_id, "Stopping server");
        self.inner
            .emit_state(server_id, ServerState::Stopping, None);

        if let Some(handle) = handle {
            handle.shutdown(self.inner.settings.stop_grace).await;
        }

        let (status, transitioned) = {
            let mut table = self.inner.table_mut();
            let slot = table.entry(server_id.to_string()).or_default();
            let transitioned =
                slot.generation == generation && slot.state == ServerState::Stopping;
            if transitioned {
                slot.state = ServerState::Stopped;
                slot.pid = None;
            }
            (slot.snapshot(server_id), transitioned)
        };
        if transitioned {
            tracing::info!(server_id = %server_id, "Server stopped");
            self.inner
                .emit_state(server_id, ServerState::Stopped, None);
        }
        Ok(status)
    }

    /// Stop the server if it is live, then start it again.
    pub async fn restart(&self, config: &ServerConfig) -> Result<ServerStatus, BridgeError> {
        match self.stop(&config.id).await {
            Ok(_) | Err(BridgeError::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }
        self.start(config).await
    }

    /// Stop every live server concurrently.
    pub async fn stop_all(&self) {
        let live: Vec<String> = self
            .inner
            .table()
            .iter()
            .filter(|(_, slot)| matches!(slot.state, ServerState::Starting | ServerState::Running))
            .map(|(id, _)| id.clone())
            .collect();

        let stops = live.iter().map(|id| self.stop(id));
        for (id, result) in live.iter().zip(futures_util::future::join_all(stops).await) {
            if let Err(e) = result {
                tracing::debug!(server_id = %id, error = %e, "Server was not running at shutdown");
            }
        }
    }

    /// Read-only snapshot; never blocks on I/O.
    pub fn status(&self, server_id: &str) -> ServerStatus {
        self.inner
            .table()
            .get(server_id)
            .map_or_else(|| ServerStatus::stopped(server_id), |slot| slot.snapshot(server_id))
    }

    pub fn is_live(&self, server_id: &str) -> bool {
        self.inner
            .table()
            .get(server_id)
            .is_some_and(|slot| slot.state.is_live())
    }

    /// Ids of all `Running` servers, sorted.
    pub fn running_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .table()
            .iter()
            .filter(|(_, slot)| slot.state == ServerState::Running)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Handle for routing requests to a `Running` server.
    ///
    /// # Errors
    ///
    /// - `ServerNotRunning` in any other state
    pub fn running_handle(&self, server_id: &str) -> Result<ServerHandle, BridgeError> {
        self.inner
            .table()
            .get(server_id)
            .filter(|slot| slot.state == ServerState::Running)
            .and_then(|slot| slot.handle.clone())
            .ok_or_else(|| BridgeError::ServerNotRunning(server_id.to_string()))
    }

    /// Re-run tool discovery for a running server.
    ///
    /// On failure the cached tools are kept.
    pub async fn refresh_tools(&self, server_id: &str) -> Result<Vec<ToolDescriptor>, BridgeError> {
        let handle = self.running_handle(server_id)?;
        match fetch_tools(&handle, self.inner.settings.call_timeout).await {
            Ok(tools) => {
                if self.running_handle(server_id).is_err() {
                    return Err(BridgeError::ServerNotRunning(server_id.to_string()));
                }
                self.inner.catalog.replace(server_id, tools.clone());
                tracing::debug!(server_id = %server_id, tools = tools.len(), "Tool catalog refreshed");
                self.inner
                    .events
                    .emit(BridgeEvent::tools_refreshed(server_id, tools.clone()));
                Ok(tools)
            }
            Err(e) => {
                tracing::warn!(server_id = %server_id, error = %e, "Tool discovery failed, keeping cached tools");
                Err(e)
            }
        }
    }

    /// Drop the record of a server that is not live.
    pub fn forget(&self, server_id: &str) {
        let mut table = self.inner.table_mut();
        if table.get(server_id).is_some_and(|slot| !slot.state.is_live()) {
            table.remove(server_id);
        }
    }
}

fn spawn_process(config: &ServerConfig) -> Result<Child, BridgeError> {
    let mut command = Command::new(&config.command);
    command
        .args(&config.args)
        .envs(&config.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(ref dir) = config.working_dir {
        command.current_dir(dir);
    }

    command.spawn().map_err(|e| {
        BridgeError::SpawnFailed(format!(
            "'{}' {:?}: {e}",
            config.command, config.args
        ))
    })
}

/// Refreshes catalogs of servers that announced `tools/list_changed`.
async fn refresh_loop(inner: Weak<Inner>, mut requests: mpsc::UnboundedReceiver<String>) {
    while let Some(server_id) = requests.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let supervisor = Supervisor { inner };
        tokio::spawn(async move {
            // Failures are already logged by refresh_tools.
            let _ = supervisor.refresh_tools(&server_id).await;
        });
    }
}
