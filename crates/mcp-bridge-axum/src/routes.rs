//! Route definitions and router construction.

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bootstrap::{AxumContext, CorsConfig};
use crate::handlers;
use crate::state::AppState;

/// Build CORS layer from configuration.
fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    match config {
        CorsConfig::AllowAll => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsConfig::AllowOrigins(origins) => {
            let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

/// Bridge API routes, without state applied.
pub(crate) fn api_routes() -> Router<AppState> {
    Router::new()
        // Configuration
        .route(
            "/servers",
            get(handlers::servers::list).post(handlers::servers::import),
        )
        .route(
            "/servers/{id}",
            get(handlers::servers::get)
                .put(handlers::servers::upsert)
                .delete(handlers::servers::remove),
        )
        // Lifecycle
        .route("/servers/{id}/start", post(handlers::servers::start))
        .route("/servers/{id}/stop", post(handlers::servers::stop))
        .route("/servers/{id}/restart", post(handlers::servers::restart))
        .route("/servers/{id}/status", get(handlers::servers::status))
        .route("/servers/{id}/logs", get(handlers::servers::logs))
        // Tools
        .route("/servers/{id}/tools", get(handlers::tools::list))
        .route(
            "/servers/{id}/tools/refresh",
            post(handlers::tools::refresh),
        )
        .route("/servers/{id}/call", post(handlers::tools::call))
        .route("/tools", get(handlers::tools::list_all))
        // Events
        .route("/events", get(handlers::events::stream))
}

/// Create the application router.
pub fn create_router(ctx: AxumContext, cors_config: &CorsConfig) -> Router {
    let state: AppState = Arc::new(ctx);
    let cors = build_cors_layer(cors_config);

    Router::new()
        .route("/health", get(health_check))
        .merge(api_routes().with_state(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "OK"
}
