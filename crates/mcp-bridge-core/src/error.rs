//! Bridge error taxonomy.
//!
//! Every bridge operation that can fail reports a [`BridgeError`]. The
//! [`ErrorKind`] discriminant is the stable, serializable part that clients
//! switch on; the message is for humans.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ports::RepositoryError;

/// Errors surfaced by bridge operations.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// No configuration exists for the given server id.
    #[error("Server not found: {0}")]
    NotFound(String),

    /// `start` on a server that is not `Stopped` or `Crashed`.
    #[error("Server already running: {0}")]
    AlreadyRunning(String),

    /// `stop` on a server that is already `Stopped` or `Crashed`.
    #[error("Server not running: {0}")]
    NotRunning(String),

    /// A routed request addressed a server that is not `Running`.
    #[error("Server {0} is not running")]
    ServerNotRunning(String),

    /// The server process exited while the request was pending.
    #[error("Server {0} crashed")]
    ServerCrashed(String),

    /// The server was stopped while the request was pending.
    #[error("Server {0} was stopped")]
    ServerStopped(String),

    /// Writing to the server failed (closed pipe, dead connection).
    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),

    /// The server process could not be spawned.
    #[error("Failed to spawn server process: {0}")]
    SpawnFailed(String),

    /// The initialize / tool discovery exchange failed.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// No response arrived within the timeout.
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The caller abandoned the request.
    #[error("Request cancelled")]
    Cancelled,

    /// A frame could not be parsed as JSON-RPC.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A configuration entry was rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The tool is not advertised by the server.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The server answered with a JSON-RPC error object.
    #[error("Server returned error: code={code}, message={message}")]
    ServerError {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// The request itself was malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The configuration store failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Stable discriminant of a [`BridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyRunning,
    NotRunning,
    ServerNotRunning,
    ServerCrashed,
    ServerStopped,
    ServerUnavailable,
    SpawnFailed,
    HandshakeFailed,
    Timeout,
    Cancelled,
    MalformedMessage,
    InvalidConfig,
    ToolNotFound,
    ServerError,
    InvalidRequest,
    Storage,
}

impl ErrorKind {
    /// Name used on the wire (matches the serde representation).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::AlreadyRunning => "AlreadyRunning",
            Self::NotRunning => "NotRunning",
            Self::ServerNotRunning => "ServerNotRunning",
            Self::ServerCrashed => "ServerCrashed",
            Self::ServerStopped => "ServerStopped",
            Self::ServerUnavailable => "ServerUnavailable",
            Self::SpawnFailed => "SpawnFailed",
            Self::HandshakeFailed => "HandshakeFailed",
            Self::Timeout => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::MalformedMessage => "MalformedMessage",
            Self::InvalidConfig => "InvalidConfig",
            Self::ToolNotFound => "ToolNotFound",
            Self::ServerError => "ServerError",
            Self::InvalidRequest => "InvalidRequest",
            Self::Storage => "Storage",
        }
    }
}

impl BridgeError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            Self::NotRunning(_) => ErrorKind::NotRunning,
            Self::ServerNotRunning(_) => ErrorKind::ServerNotRunning,
            Self::ServerCrashed(_) => ErrorKind::ServerCrashed,
            Self::ServerStopped(_) => ErrorKind::ServerStopped,
            Self::ServerUnavailable(_) => ErrorKind::ServerUnavailable,
            Self::SpawnFailed(_) => ErrorKind::SpawnFailed,
            Self::HandshakeFailed(_) => ErrorKind::HandshakeFailed,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::MalformedMessage(_) => ErrorKind::MalformedMessage,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Self::ServerError { .. } => ErrorKind::ServerError,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<RepositoryError> for BridgeError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => Self::NotFound(id),
            RepositoryError::Storage(msg) | RepositoryError::Serialization(msg) => {
                Self::Storage(msg)
            }
        }
    }
}

/// User-safe error details carried in statuses, events and import results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&BridgeError> for ErrorInfo {
    fn from(err: &BridgeError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_as_variant_name() {
        let info = ErrorInfo::from(&BridgeError::HandshakeFailed("eof".to_string()));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["kind"], "HandshakeFailed");
        assert_eq!(json["message"], "Handshake failed: eof");
        assert_eq!(ErrorKind::HandshakeFailed.as_str(), "HandshakeFailed");
    }

    #[test]
    fn test_timeout_message_in_millis() {
        let err = BridgeError::Timeout(Duration::from_secs(2));
        assert_eq!(err.to_string(), "Request timed out after 2000ms");
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_repository_not_found_maps_to_not_found() {
        let err: BridgeError = RepositoryError::NotFound("fs".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err: BridgeError = RepositoryError::Storage("disk full".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
