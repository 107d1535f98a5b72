//! HTTP error mapping.
//!
//! Every failure is answered with a JSON body:
//!
//! ```json
//! { "error": "Server fs is not running", "status": 409, "type": "ServerNotRunning" }
//! ```
//!
//! `type` is the stable [`ErrorKind`] name clients switch on.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use mcp_bridge_core::{BridgeError, ErrorKind};

/// Axum-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// A bridge operation failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// The request could not be decoded.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
    /// Stable error type discriminant for client-side handling
    #[serde(rename = "type")]
    error_type: &'static str,
    /// Optional additional metadata for specific error types
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<serde_json::Value>,
}

/// Status code for a bridge error kind.
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound | ErrorKind::ToolNotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyRunning | ErrorKind::NotRunning | ErrorKind::ServerNotRunning => {
            StatusCode::CONFLICT
        }
        ErrorKind::InvalidConfig | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::ServerCrashed
        | ErrorKind::SpawnFailed
        | ErrorKind::HandshakeFailed
        | ErrorKind::MalformedMessage
        | ErrorKind::ServerError => StatusCode::BAD_GATEWAY,
        ErrorKind::ServerStopped | ErrorKind::ServerUnavailable | ErrorKind::Cancelled => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, error_type, metadata) = match &self {
            Self::Bridge(BridgeError::ServerError { code, data, .. }) => (
                status_for(ErrorKind::ServerError),
                ErrorKind::ServerError.as_str(),
                Some(serde_json::json!({ "code": code, "data": data })),
            ),
            Self::Bridge(err) => (status_for(err.kind()), err.kind().as_str(), None),
            Self::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                ErrorKind::InvalidRequest.as_str(),
                None,
            ),
        };

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
            status: status.as_u16(),
            error_type,
            metadata,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for HttpError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_errors_map_to_distinct_statuses() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::AlreadyRunning), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(ErrorKind::HandshakeFailed), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(ErrorKind::ServerStopped),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_server_error_response_carries_code() {
        let response = HttpError::from(BridgeError::ServerError {
            code: -32602,
            message: "bad params".to_string(),
            data: None,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_bad_request_is_invalid_request() {
        let response = HttpError::BadRequest("missing name".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
