//! HTTP + SSE adapter for mcp-bridge.
//!
//! Exposes [`BridgeService`](mcp_bridge_runtime::BridgeService) over a small
//! JSON API and a server-sent event stream:
//!
//! | Route | Operation |
//! |---|---|
//! | `POST /servers` | import server configurations |
//! | `GET /servers` | list servers with status |
//! | `GET /servers/{id}` / `DELETE /servers/{id}` | inspect / remove one server |
//! | `PUT /servers/{id}` | add or replace one server configuration |
//! | `POST /servers/{id}/start` `/stop` `/restart` | lifecycle |
//! | `GET /servers/{id}/status` | status snapshot |
//! | `GET /servers/{id}/tools` | cached tools |
//! | `POST /servers/{id}/tools/refresh` | re-run discovery |
//! | `POST /servers/{id}/call` | call a tool |
//! | `GET /servers/{id}/logs` | recent stderr lines |
//! | `GET /tools` | tools of every running server |
//! | `GET /events?servers=a,b` | event stream |
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use http_body_util as _;
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tower as _;

// Used by main.rs binary
use clap as _;
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod sse;
pub mod state;

// Re-export primary types
pub use bootstrap::{AxumContext, BridgeConfig, CorsConfig, bootstrap, start_server};
pub use error::HttpError;
pub use routes::create_router;
pub use state::AppState;
