//! Tool descriptors advertised by MCP servers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool exposed by an MCP server (one entry of a `tools/list` result).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool arguments, passed through untouched.
    #[serde(default = "default_input_schema")]
    pub input_schema: Value,
}

fn default_input_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: default_input_schema(),
        }
    }
}

/// A tool tagged with the server that provides it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTool {
    pub server_id: String,
    #[serde(flatten)]
    pub tool: ToolDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_mcp_tool_entry() {
        let json = r#"{"name":"read_file","description":"Read a file","inputSchema":{"type":"object","properties":{"path":{"type":"string"}}}}"#;
        let tool: ToolDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "read_file");
        assert_eq!(tool.description.as_deref(), Some("Read a file"));
        assert_eq!(tool.input_schema["properties"]["path"]["type"], "string");
    }

    #[test]
    fn test_missing_schema_defaults_to_object() {
        let tool: ToolDescriptor = serde_json::from_str(r#"{"name":"ping"}"#).unwrap();
        assert_eq!(tool.input_schema["type"], "object");
        assert!(tool.description.is_none());
    }

    #[test]
    fn test_server_tool_is_flattened() {
        let tagged = ServerTool {
            server_id: "fs".to_string(),
            tool: ToolDescriptor::new("ls"),
        };
        let json = serde_json::to_value(&tagged).unwrap();
        assert_eq!(json["serverId"], "fs");
        assert_eq!(json["name"], "ls");
    }
}
