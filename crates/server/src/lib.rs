//! Carrier gateway and admin HTTP surface
//!
//! One axum router serves three concerns: the carrier media-stream
//! WebSocket, the outbound-call trigger, and the persona/document admin
//! endpoints.

pub mod admin;
pub mod gateway;
pub mod outbound;
pub mod registry;
pub mod state;

pub use registry::SessionRegistry;
pub use state::AppState;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use voicebot_config::constants;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let ws_path = state.settings.server.ws_path.clone();

    Router::new()
        // Carrier media stream
        .route(&ws_path, get(gateway::ws_handler))
        // Outbound call trigger
        .route("/api/calls", post(outbound::trigger_call))
        // Persona admin
        .route(
            "/api/persona",
            get(admin::get_persona).put(admin::update_persona),
        )
        // Knowledge document admin
        .route(
            "/api/documents",
            post(admin::upload_document).get(admin::list_documents),
        )
        .route(
            "/api/documents/:id",
            get(admin::get_document).delete(admin::delete_document),
        )
        // Health check
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(constants::MAX_DOCUMENT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check
async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "active_sessions": state.registry.count(),
    }))
}
