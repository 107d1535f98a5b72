//! Runtime tunables for the bridge.
//!
//! Defaults suit interactive use; every value can be overridden through an
//! `MCP_BRIDGE_*` environment variable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default port of the HTTP+SSE endpoint.
pub const DEFAULT_PORT: u16 = 8765;

const ENV_CALL_TIMEOUT_MS: &str = "MCP_BRIDGE_CALL_TIMEOUT_MS";
const ENV_HANDSHAKE_TIMEOUT_MS: &str = "MCP_BRIDGE_HANDSHAKE_TIMEOUT_MS";
const ENV_STOP_GRACE_MS: &str = "MCP_BRIDGE_STOP_GRACE_MS";
const ENV_QUEUE_CAPACITY: &str = "MCP_BRIDGE_QUEUE_CAPACITY";
const ENV_LOG_LINES: &str = "MCP_BRIDGE_LOG_LINES";
const ENV_AUTO_START: &str = "MCP_BRIDGE_AUTO_START";

/// Runtime settings shared by the supervisor, router and broadcaster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSettings {
    /// Timeout applied to routed calls that do not specify their own.
    pub call_timeout: Duration,
    /// Timeout for each step of the discovery handshake.
    pub handshake_timeout: Duration,
    /// How long a stopping process gets between SIGTERM and SIGKILL.
    pub stop_grace: Duration,
    /// Capacity of each subscriber's delivery queue.
    pub queue_capacity: usize,
    /// Number of stderr lines kept per server.
    pub log_lines: usize,
    /// Longest accepted stdout frame, in bytes.
    pub max_frame_len: usize,
    /// Interval between SSE keep-alive comments.
    pub keep_alive: Duration,
    /// Start every configured server at boot.
    pub auto_start: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(30),
            stop_grace: Duration::from_secs(5),
            queue_capacity: 256,
            log_lines: 200,
            max_frame_len: 8 * 1024 * 1024,
            keep_alive: Duration::from_secs(30),
            auto_start: false,
        }
    }
}

impl BridgeSettings {
    /// Defaults overridden by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, ENV_CALL_TIMEOUT_MS) {
            settings.call_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_HANDSHAKE_TIMEOUT_MS) {
            settings.handshake_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_STOP_GRACE_MS) {
            settings.stop_grace = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<usize>(&lookup, ENV_QUEUE_CAPACITY) {
            settings.queue_capacity = n;
        }
        if let Some(n) = parse_var::<usize>(&lookup, ENV_LOG_LINES) {
            settings.log_lines = n;
        }
        if let Some(raw) = lookup(ENV_AUTO_START) {
            match parse_bool(&raw) {
                Some(flag) => settings.auto_start = flag,
                None => tracing::warn!(var = ENV_AUTO_START, value = %raw, "Ignoring invalid boolean"),
            }
        }

        settings.normalized()
    }

    /// Clamp values into their usable range.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        // Room for the overflow marker plus one real event.
        self.queue_capacity = self.queue_capacity.max(2);
        self.log_lines = self.log_lines.max(1);
        if self.call_timeout.is_zero() {
            self.call_timeout = Self::default().call_timeout;
        }
        if self.handshake_timeout.is_zero() {
            self.handshake_timeout = Self::default().handshake_timeout;
        }
        self
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = key, value = %raw, "Ignoring invalid numeric setting");
            None
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
