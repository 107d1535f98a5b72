//! The bridge facade: configuration store, supervisor, tool catalog and
//! event fan-out behind one set of operations.
//!
//! Adapters (HTTP, tests) only talk to [`BridgeService`]; they never reach
//! into the supervisor's state table or a server's connection task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use mcp_bridge_core::{
    BridgeError, BridgeEvent, BridgeEventEmitter, BridgeSettings, ImportOutcome, ServerConfig,
    ServerConfigRepository, ServerStatus, ServerSummary, ServerTool, ToolDescriptor, parse_import,
};

use crate::broadcaster::{EventBroadcaster, Subscription, SubscriptionFilter};
use crate::catalog::ToolCatalog;
use crate::logs::{LogLine, ServerLogs};
use crate::protocol::RequestId;
use crate::supervisor::Supervisor;

/// A routed `tools/call` request.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub server_id: String,
    pub name: String,
    /// Tool arguments; defaults to an empty object.
    pub arguments: Value,
    /// Overrides the configured call timeout.
    pub timeout: Option<Duration>,
}

impl ToolCall {
    pub fn new(server_id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            server_id: server_id.into(),
            name: name.into(),
            arguments,
            timeout: None,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub struct BridgeService {
    repo: Arc<dyn ServerConfigRepository>,
    supervisor: Supervisor,
    catalog: Arc<ToolCatalog>,
    logs: Arc<ServerLogs>,
    events: EventBroadcaster,
    settings: BridgeSettings,
    call_ids: AtomicU64,
}

impl BridgeService {
    /// Wire up a service around a configuration store.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(repo: Arc<dyn ServerConfigRepository>, settings: BridgeSettings) -> Self {
        let settings = settings.normalized();
        let events = EventBroadcaster::new(settings.queue_capacity);
        let catalog = Arc::new(ToolCatalog::new());
        let logs = Arc::new(ServerLogs::new(settings.log_lines));
        let emitter: Arc<dyn BridgeEventEmitter> = Arc::new(events.clone());
        let supervisor = Supervisor::new(
            settings.clone(),
            emitter,
            Arc::clone(&catalog),
            Arc::clone(&logs),
        );

        Self {
            repo,
            supervisor,
            catalog,
            logs,
            events,
            settings,
            call_ids: AtomicU64::new(1),
        }
    }

    pub const fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub const fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Import every server entry of a config document.
    ///
    /// Valid entries are stored in one batch; each invalid entry is reported
    /// in its outcome without affecting the others.
    pub async fn import_config(&self, doc: &Value) -> Result<Vec<ImportOutcome>, BridgeError> {
        let entries = parse_import(doc)?;

        let mut valid = Vec::new();
        for entry in &entries {
            if let Ok(ref config) = entry.config {
                valid.push(config.clone());
            }
        }
        let mut replaced = self.repo.upsert_many(valid).await?.into_iter();

        let outcomes: Vec<ImportOutcome> = entries
            .into_iter()
            .map(|entry| match entry.config {
                Ok(_) => ImportOutcome::imported(entry.id, replaced.next().unwrap_or(false)),
                Err(reason) => {
                    tracing::warn!(server_id = %entry.id, reason = %reason, "Rejected server entry");
                    ImportOutcome::failed(entry.id, &BridgeError::InvalidConfig(reason))
                }
            })
            .collect();

        for outcome in outcomes.iter().filter(|o| o.imported) {
            self.events.publish(&BridgeEvent::server_added(&outcome.id));
        }
        tracing::info!(
            imported = outcomes.iter().filter(|o| o.imported).count(),
            rejected = outcomes.iter().filter(|o| !o.imported).count(),
            "Imported server configurations"
        );
        Ok(outcomes)
    }

    /// Import from raw JSON text.
    pub async fn import_json(&self, text: &str) -> Result<Vec<ImportOutcome>, BridgeError> {
        let doc: Value = serde_json::from_str(text)
            .map_err(|e| BridgeError::InvalidConfig(format!("invalid JSON: {e}")))?;
        self.import_config(&doc).await
    }

    /// Store one configuration, replacing any record with the same id.
    ///
    /// Returns whether a record was replaced. A live process keeps running
    /// with the configuration it was started with.
    pub async fn upsert_server(&self, mut config: ServerConfig) -> Result<bool, BridgeError> {
        config.fill_display_name();
        config.validate().map_err(BridgeError::InvalidConfig)?;
        let id = config.id.clone();
        let previous = self.repo.upsert(config).await?;
        self.events.publish(&BridgeEvent::server_added(&id));
        Ok(previous.is_some())
    }

    /// Remove a configuration, stopping its server first if it is live.
    pub async fn remove_server(&self, server_id: &str) -> Result<ServerConfig, BridgeError> {
        self.repo.get(server_id).await?;

        if self.supervisor.is_live(server_id) {
            match self.supervisor.stop(server_id).await {
                Ok(_) | Err(BridgeError::NotRunning(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let removed = self.repo.remove(server_id).await?;
        self.supervisor.forget(server_id);
        self.catalog.remove(server_id);
        self.logs.remove(server_id);
        self.events.publish(&BridgeEvent::server_removed(server_id));
        tracing::info!(server_id = %server_id, "Removed server");
        Ok(removed)
    }

    pub async fn list_servers(&self) -> Result<Vec<ServerSummary>, BridgeError> {
        let configs = self.repo.list().await?;
        Ok(configs
            .into_iter()
            .map(|config| self.summarize(config))
            .collect())
    }

    pub async fn get_server(&self, server_id: &str) -> Result<ServerSummary, BridgeError> {
        let config = self.repo.get(server_id).await?;
        Ok(self.summarize(config))
    }

    fn summarize(&self, config: ServerConfig) -> ServerSummary {
        let status = self.supervisor.status(&config.id);
        let tool_count = self.catalog.count(&config.id);
        ServerSummary {
            config,
            status,
            tool_count,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub async fn start_server(&self, server_id: &str) -> Result<ServerStatus, BridgeError> {
        let config = self.repo.get(server_id).await?;
        self.supervisor.start(&config).await
    }

    pub async fn stop_server(&self, server_id: &str) -> Result<ServerStatus, BridgeError> {
        self.repo.get(server_id).await?;
        self.supervisor.stop(server_id).await
    }

    /// Stop (if live) and start again with the current stored configuration.
    pub async fn restart_server(&self, server_id: &str) -> Result<ServerStatus, BridgeError> {
        let config = self.repo.get(server_id).await?;
        self.supervisor.restart(&config).await
    }

    pub async fn status(&self, server_id: &str) -> Result<ServerStatus, BridgeError> {
        self.repo.get(server_id).await?;
        Ok(self.supervisor.status(server_id))
    }

    /// Start every configured server; failures are logged, not returned.
    ///
    /// Returns how many servers reached `Running`.
    pub async fn auto_start(&self) -> Result<usize, BridgeError> {
        let configs = self.repo.list().await?;
        let starts = configs.iter().map(|config| self.supervisor.start(config));
        let results = futures_util::future::join_all(starts).await;

        let mut running = 0;
        for (config, result) in configs.iter().zip(results) {
            match result {
                Ok(_) => running += 1,
                Err(e) => {
                    tracing::warn!(server_id = %config.id, error = %e, "Auto-start failed");
                }
            }
        }
        tracing::info!(running, configured = configs.len(), "Auto-start finished");
        Ok(running)
    }

    /// Stop every server and close all event subscriptions.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down bridge");
        self.supervisor.stop_all().await;
        self.events.close_all();
    }

    // =========================================================================
    // Tools
    // =========================================================================

    /// Cached tools of one server. Never waits on the server.
    pub async fn list_tools(&self, server_id: &str) -> Result<Vec<ToolDescriptor>, BridgeError> {
        self.repo.get(server_id).await?;
        Ok(self.catalog.list(server_id).as_ref().clone())
    }

    /// Cached tools of every `Running` server, tagged with the server id.
    pub fn list_all_tools(&self) -> Vec<ServerTool> {
        self.supervisor
            .running_ids()
            .into_iter()
            .flat_map(|server_id| {
                self.catalog
                    .list(&server_id)
                    .iter()
                    .map(|tool| ServerTool {
                        server_id: server_id.clone(),
                        tool: tool.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Re-run tool discovery now.
    pub async fn refresh_tools(&self, server_id: &str) -> Result<Vec<ToolDescriptor>, BridgeError> {
        self.repo.get(server_id).await?;
        self.supervisor.refresh_tools(server_id).await
    }

    /// Route a `tools/call` request and return the server's result.
    pub async fn call_tool(&self, call: ToolCall) -> Result<Value, BridgeError> {
        self.call_tool_cancellable(call, &CancellationToken::new())
            .await
    }

    /// Like [`call_tool`](Self::call_tool); firing `cancel` abandons the
    /// call with `Cancelled`.
    pub async fn call_tool_cancellable(
        &self,
        call: ToolCall,
        cancel: &CancellationToken,
    ) -> Result<Value, BridgeError> {
        self.repo.get(&call.server_id).await?;
        let handle = self.supervisor.running_handle(&call.server_id)?;

        if !self.catalog.allows(&call.server_id, &call.name) {
            return Err(BridgeError::ToolNotFound(format!(
                "{} on server {}",
                call.name, call.server_id
            )));
        }

        let arguments = match call.arguments {
            Value::Null => json!({}),
            Value::Object(_) => call.arguments,
            other => {
                return Err(BridgeError::InvalidRequest(format!(
                    "tool arguments must be an object, got {other}"
                )));
            }
        };

        let external_id = RequestId::from(self.call_ids.fetch_add(1, Ordering::Relaxed));
        let timeout = call.timeout.unwrap_or(self.settings.call_timeout);
        tracing::debug!(server_id = %call.server_id, tool = %call.name, %external_id, "Calling tool");

        let reply = handle
            .request_cancellable(
                external_id,
                "tools/call",
                Some(json!({ "name": call.name, "arguments": arguments })),
                timeout,
                cancel,
            )
            .await?;
        Ok(reply.result)
    }

    // =========================================================================
    // Events and logs
    // =========================================================================

    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        self.events.subscribe(filter)
    }

    /// Recent stderr lines of a server, oldest first.
    pub async fn logs(&self, server_id: &str) -> Result<Vec<LogLine>, BridgeError> {
        self.repo.get(server_id).await?;
        Ok(self.logs.lines(server_id))
    }
}
