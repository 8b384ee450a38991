pub mod call;
pub mod config;
pub mod db;
pub mod envelope;
pub mod error;
pub mod http;
pub mod nonce_memo;
pub mod registry;
pub mod repo;
pub mod ringing;
pub mod sharded;
pub mod state;
pub mod ws;

pub use state::AppState;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the hub's router: one WebSocket upgrade endpoint plus the small
/// REST surface around it (TURN credentials, call-session tokens,
/// conversation/message history, file upload). There is no dashboard to
/// fall back to -- unmatched paths just 404.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::handle_upgrade))
        .route(
            "/api/call-session-token",
            post(http::call_token::issue_call_session_token),
        )
        .route("/api/ice", get(http::ice::get_ice_config))
        .route(
            "/api/conversations/:address",
            get(http::conversations::list_conversations),
        )
        .route(
            "/api/messages/:convo_id",
            get(http::messages::list_messages),
        )
        .route("/api/upload", post(http::upload::upload_file))
        .route("/api/files/:file_id", get(http::files::get_file))
        .route("/api/health", get(http::health::healthz))
        .route("/healthz", get(http::health::healthz))
        .route("/readyz", get(http::health::readyz))
        .fallback(fallback_404)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}
