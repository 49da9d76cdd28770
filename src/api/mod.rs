//! HTTP layer: REST handlers and router composition.
//!
//! REST endpoints are mounted under `/api/v1`; `/health` and the
//! subscription WebSocket live at the root.

pub mod handlers;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// Builds the application: REST routes, the subscription endpoint at
/// `ws_path`, and the tracing and CORS layers.
pub fn build_app(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .merge(build_router())
        .route(ws_path, get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
