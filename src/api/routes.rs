//! Route definitions

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::server::AppState;
use super::websocket;

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            // get() would also answer HEAD; only GET serves the page
            get(handlers::page::index)
                .head(handlers::page::method_not_allowed)
                .fallback(handlers::page::method_not_allowed),
        )
        .route("/health", get(handlers::health::health_check))
        .route("/ws", get(websocket::chat_ws))
        .fallback(handlers::page::not_found)
        .with_state(state)
}
