//! Tool listing and invocation handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use serde_json::Value;

use mcp_bridge_core::{ServerTool, ToolDescriptor};

use crate::dto::CallToolBody;
use crate::error::HttpError;
use crate::state::AppState;

/// `GET /servers/{id}/tools` - cached tools; never waits on the server.
pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ToolDescriptor>>, HttpError> {
    Ok(Json(state.service.list_tools(&id).await?))
}

/// `GET /tools` - tools of every running server.
pub async fn list_all(State(state): State<AppState>) -> Json<Vec<ServerTool>> {
    Json(state.service.list_all_tools())
}

pub async fn refresh(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ToolDescriptor>>, HttpError> {
    Ok(Json(state.service.refresh_tools(&id).await?))
}

/// `POST /servers/{id}/call` - route a `tools/call` and return its result.
///
/// A client that disconnects abandons the call; the pending request is
/// dropped and a late response is discarded.
pub async fn call(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<CallToolBody>, JsonRejection>,
) -> Result<Json<Value>, HttpError> {
    let Json(body) = body?;
    Ok(Json(state.service.call_tool(body.into_call(id)).await?))
}
