//! Server configuration and lifecycle handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};

use mcp_bridge_core::{ImportOutcome, ServerConfig, ServerStatus, ServerSummary};
use mcp_bridge_runtime::LogLine;

use crate::error::HttpError;
use crate::state::AppState;

/// `POST /servers` - import one or more server configurations.
///
/// The body is read as text so that invalid JSON is reported as
/// `InvalidConfig` like any other rejected document.
pub async fn import(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<Vec<ImportOutcome>>, HttpError> {
    Ok(Json(state.service.import_json(&body).await?))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ServerSummary>>, HttpError> {
    Ok(Json(state.service.list_servers().await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ServerSummary>, HttpError> {
    Ok(Json(state.service.get_server(&id).await?))
}

/// `PUT /servers/{id}` - add or replace one configuration.
///
/// The body's `id` may be omitted; when present it must match the path.
/// A live server keeps its current process until restarted.
pub async fn upsert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ServerConfig>, JsonRejection>,
) -> Result<Json<ServerSummary>, HttpError> {
    let Json(mut config) = body?;
    if config.id.is_empty() {
        config.id.clone_from(&id);
    } else if config.id != id {
        return Err(HttpError::BadRequest(format!(
            "body id {:?} does not match path id {id:?}",
            config.id
        )));
    }

    state.service.upsert_server(config).await?;
    Ok(Json(state.service.get_server(&id).await?))
}

/// `DELETE /servers/{id}` - stop if live, then forget the server.
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ServerConfig>, HttpError> {
    Ok(Json(state.service.remove_server(&id).await?))
}

pub async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ServerStatus>, HttpError> {
    Ok(Json(state.service.start_server(&id).await?))
}

pub async fn stop(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ServerStatus>, HttpError> {
    Ok(Json(state.service.stop_server(&id).await?))
}

pub async fn restart(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ServerStatus>, HttpError> {
    Ok(Json(state.service.restart_server(&id).await?))
}

pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ServerStatus>, HttpError> {
    Ok(Json(state.service.status(&id).await?))
}

/// `GET /servers/{id}/logs` - recent stderr output, oldest first.
pub async fn logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<LogLine>>, HttpError> {
    Ok(Json(state.service.logs(&id).await?))
}
