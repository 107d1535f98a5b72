//! JSON-RPC 2.0 message model.
//!
//! Messages are classified structurally:
//!
//! | shape                          | kind           |
//! |--------------------------------|----------------|
//! | `method` + non-null `id`       | request        |
//! | `method`, no `id`              | notification   |
//! | `result` or `error`            | response       |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value, json};

pub const JSONRPC_VERSION: &str = "2.0";

/// Error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// A request id: JSON-RPC allows numbers and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(Number),
    String(String),
}

impl RequestId {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
        }
    }

    /// The id as an unsigned integer, if it is one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            Self::String(_) => None,
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self::Number(id.into())
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// `None` when the peer answered with `"id": null` (e.g. a parse error).
    pub id: Option<RequestId>,
    pub outcome: Result<Value, RpcError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl Message {
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request(Request {
            id: id.into(),
            method: method.into(),
            params,
        })
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification(Notification {
            method: method.into(),
            params,
        })
    }

    pub fn response(id: RequestId, outcome: Result<Value, RpcError>) -> Self {
        Self::Response(Response {
            id: Some(id),
            outcome,
        })
    }

    /// Classify a decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(mut obj) = value else {
            return Err(format!("expected a JSON object, got {}", kind_of(&value)));
        };

        match obj.get("jsonrpc") {
            None => {}
            Some(Value::String(v)) if v == JSONRPC_VERSION => {}
            Some(other) => return Err(format!("unsupported jsonrpc version {other}")),
        }

        let params = obj.remove("params").filter(|p| !p.is_null());
        let id = match obj.remove("id") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(
                RequestId::from_value(&raw).ok_or_else(|| format!("invalid id {raw}"))?,
            ),
        };

        if let Some(method) = obj.remove("method") {
            let Value::String(method) = method else {
                return Err(format!("method must be a string, got {method}"));
            };
            return Ok(match id {
                Some(id) => Self::Request(Request { id, method, params }),
                None => Self::Notification(Notification { method, params }),
            });
        }

        if let Some(error) = obj.remove("error") {
            let error: RpcError = serde_json::from_value(error)
                .map_err(|e| format!("invalid error object: {e}"))?;
            return Ok(Self::Response(Response {
                id,
                outcome: Err(error),
            }));
        }

        if let Some(result) = obj.remove("result") {
            return Ok(Self::Response(Response {
                id,
                outcome: Ok(result),
            }));
        }

        Err("message has neither method nor result/error".to_string())
    }

    pub fn to_value(&self) -> Value {
        // Requests serialize as {"id","jsonrpc","method","params"} with or
        // without serde_json's `preserve_order`.
        let mut obj = Map::new();
        match self {
            Self::Request(req) => {
                obj.insert("id".to_string(), req.id.to_value());
                obj.insert("jsonrpc".to_string(), json!(JSONRPC_VERSION));
                obj.insert("method".to_string(), json!(req.method));
                if let Some(ref params) = req.params {
                    obj.insert("params".to_string(), params.clone());
                }
            }
            Self::Notification(note) => {
                obj.insert("jsonrpc".to_string(), json!(JSONRPC_VERSION));
                obj.insert("method".to_string(), json!(note.method));
                if let Some(ref params) = note.params {
                    obj.insert("params".to_string(), params.clone());
                }
            }
            Self::Response(resp) => {
                obj.insert(
                    "id".to_string(),
                    resp.id.as_ref().map_or(Value::Null, RequestId::to_value),
                );
                obj.insert("jsonrpc".to_string(), json!(JSONRPC_VERSION));
                match resp.outcome {
                    Ok(ref result) => {
                        obj.insert("result".to_string(), result.clone());
                    }
                    Err(ref error) => {
                        obj.insert("error".to_string(), json!(error));
                    }
                }
            }
        }
        Value::Object(obj)
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(req) => Some(&req.method),
            Self::Notification(note) => Some(&note.method),
            Self::Response(_) => None,
        }
    }
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parameters of the `initialize` request.
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": {
            "name": "mcp-bridge",
            "version": env!("CARGO_PKG_VERSION")
        },
        "capabilities": {}
    })
}

/// The parts of an `initialize` result the bridge relies on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub tools: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}
