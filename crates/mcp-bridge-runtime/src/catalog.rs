//! Cached tool descriptors per server.
//!
//! Reads never touch the network: [`ToolCatalog::list`] returns whatever the
//! last successful discovery stored. A refresh replaces a server's sequence
//! atomically; a failed refresh leaves the previous one in place.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::{Value, json};

use mcp_bridge_core::{BridgeError, ToolDescriptor};

use crate::connection::ServerHandle;
use crate::protocol::RequestId;

/// Upper bound on `tools/list` pages fetched per refresh.
pub const MAX_TOOL_PAGES: usize = 64;

#[derive(Debug, Default)]
pub struct ToolCatalog {
    tools: RwLock<HashMap<String, Arc<Vec<ToolDescriptor>>>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last cached tools of a server (empty if never discovered).
    pub fn list(&self, server_id: &str) -> Arc<Vec<ToolDescriptor>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(server_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, server_id: &str) -> usize {
        self.list(server_id).len()
    }

    /// Whether `name` is callable according to the cache.
    ///
    /// An empty cache knows nothing and does not reject any name.
    pub fn allows(&self, server_id: &str, name: &str) -> bool {
        let tools = self.list(server_id);
        tools.is_empty() || tools.iter().any(|t| t.name == name)
    }

    /// Replace a server's tools wholesale.
    pub fn replace(&self, server_id: &str, tools: Vec<ToolDescriptor>) {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(server_id.to_string(), Arc::new(tools));
    }

    pub fn remove(&self, server_id: &str) {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(server_id);
    }
}

/// Fetch the complete tool list from a server, following `nextCursor`.
///
/// Entries that do not parse as tool descriptors are skipped.
pub async fn fetch_tools(
    handle: &ServerHandle,
    timeout: Duration,
) -> Result<Vec<ToolDescriptor>, BridgeError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;

    for page in 0..MAX_TOOL_PAGES {
        let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
        let reply = handle
            .request(RequestId::from("tools/list"), "tools/list", params, timeout)
            .await?;

        let (page_tools, next) = parse_tools_page(handle.server_id(), &reply.result)?;
        tools.extend(page_tools);

        match next {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            Some(_) => {
                tracing::warn!(server_id = %handle.server_id(), page, "Server repeated its tools/list cursor");
                break;
            }
            None => return Ok(tools),
        }
    }

    tracing::warn!(
        server_id = %handle.server_id(),
        pages = MAX_TOOL_PAGES,
        "Tool list truncated after page limit"
    );
    Ok(tools)
}

fn parse_tools_page(
    server_id: &str,
    result: &Value,
) -> Result<(Vec<ToolDescriptor>, Option<String>), BridgeError> {
    let entries = match result.get("tools") {
        Some(Value::Array(entries)) => entries.as_slice(),
        None | Some(Value::Null) => &[][..],
        Some(other) => {
            return Err(BridgeError::MalformedMessage(format!(
                "tools/list result has non-array tools: {other}"
            )));
        }
    };

    let tools = entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<ToolDescriptor>(entry.clone()) {
            Ok(tool) => Some(tool),
            Err(e) => {
                tracing::warn!(server_id = %server_id, error = %e, "Skipping invalid tool descriptor");
                None
            }
        })
        .collect();

    let next = result
        .get("nextCursor")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    Ok((tools, next))
}
