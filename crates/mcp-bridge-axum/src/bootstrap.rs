//! Axum server bootstrap - the composition root.
//!
//! This module is the only place where the config store, the bridge service
//! and the HTTP router are wired together.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;

use mcp_bridge_core::BridgeSettings;
use mcp_bridge_core::paths::config_file_path;
use mcp_bridge_core::settings::DEFAULT_PORT;
use mcp_bridge_runtime::BridgeService;
use mcp_bridge_store::JsonConfigRepository;

/// CORS configuration for the web server.
#[derive(Debug, Clone, Default)]
pub enum CorsConfig {
    /// Allow all origins.
    #[default]
    AllowAll,
    /// Allow specific origins.
    AllowOrigins(Vec<String>),
}

/// Server configuration for the Axum adapter.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Interface to bind.
    pub host: String,
    /// Port for the HTTP server.
    pub port: u16,
    /// Server config store file. Defaults to `<data dir>/servers.json`.
    pub config_path: Option<PathBuf>,
    /// Start every configured server after boot.
    pub auto_start: bool,
    /// CORS configuration.
    pub cors: CorsConfig,
    /// Runtime tunables.
    pub settings: BridgeSettings,
}

impl BridgeConfig {
    /// Defaults, with tunables read from `MCP_BRIDGE_*` environment variables.
    pub fn with_defaults() -> Self {
        let settings = BridgeSettings::from_env();
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            config_path: None,
            auto_start: settings.auto_start,
            cors: CorsConfig::default(),
            settings,
        }
    }

    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Set CORS to allow specific origins.
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.cors = CorsConfig::AllowOrigins(origins);
        self
    }
}

/// Application context for the Axum adapter.
pub struct AxumContext {
    /// The bridge facade.
    pub service: Arc<BridgeService>,
    /// Effective runtime tunables.
    pub settings: BridgeSettings,
}

/// Open the config store and build the bridge service.
///
/// With `auto_start` set, configured servers are started in the background;
/// the returned context is usable right away.
pub async fn bootstrap(config: &BridgeConfig) -> Result<AxumContext> {
    let config_path = match config.config_path {
        Some(ref path) => path.clone(),
        None => config_file_path()?,
    };
    tracing::info!(
        target: "mcp_bridge.paths",
        config_path = %config_path.display(),
        "Axum bootstrap resolved paths"
    );

    let repo = JsonConfigRepository::open(config_path).await?;
    let settings = config.settings.clone().normalized();
    let service = Arc::new(BridgeService::new(Arc::new(repo), settings.clone()));

    if config.auto_start {
        tokio::spawn({
            let service = Arc::clone(&service);
            async move {
                if let Err(e) = service.auto_start().await {
                    tracing::warn!(error = %e, "Auto-start could not read server configurations");
                }
            }
        });
    }

    Ok(AxumContext { service, settings })
}

/// Run the web server until Ctrl-C, then stop every server.
pub async fn start_server(config: BridgeConfig) -> Result<()> {
    let ctx = bootstrap(&config).await?;
    let service = Arc::clone(&ctx.service);
    let app = crate::routes::create_router(ctx, &config.cors);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("mcp-bridge listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(service))
        .await?;
    tracing::info!("mcp-bridge stopped");
    Ok(())
}

/// Resolves after Ctrl-C once every server is stopped and event streams are
/// closed, so open SSE connections do not hold up the graceful shutdown.
async fn shutdown_signal(service: Arc<BridgeService>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    service.shutdown().await;
}
