//! `mcp-bridge` - serve configured MCP servers over HTTP + SSE.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mcp_bridge_axum::{BridgeConfig, start_server};
use mcp_bridge_core::settings::DEFAULT_PORT;

#[derive(Debug, Parser)]
#[command(name = "mcp-bridge", version, about = "Bridge stdio MCP servers to HTTP and SSE clients")]
struct Cli {
    /// Interface to bind
    #[arg(long, env = "MCP_BRIDGE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "MCP_BRIDGE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Server configuration file (default: <data dir>/mcp-bridge/servers.json)
    #[arg(short, long, env = "MCP_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Start every configured server at boot
    #[arg(long)]
    auto_start: bool,

    /// Allowed CORS origin (repeatable); all origins are allowed when omitted
    #[arg(long = "allow-origin", value_name = "ORIGIN")]
    allow_origins: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before anything reads them
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = BridgeConfig::with_defaults();
    config.host = cli.host;
    config.port = cli.port;
    config.auto_start |= cli.auto_start;
    if let Some(path) = cli.config {
        config = config.with_config_path(path);
    }
    if !cli.allow_origins.is_empty() {
        config = config.with_allowed_origins(cli.allow_origins);
    }

    start_server(config).await
}
