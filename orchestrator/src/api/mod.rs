//! API module for the Containly orchestrator
//!
//! Provides:
//! - The terminal WebSocket endpoint
//! - Admin session endpoints
//! - Health and metrics

mod auth;
mod error;
mod handlers;

use std::sync::Arc;

use axum::{
    routing::{delete, get},
    Router,
};

use crate::AppState;

pub use auth::AdminAuth;
pub use error::ApiError;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check (no auth)
        .route("/health", get(handlers::health::health_check))
        // Prometheus metrics (no auth for scraping)
        .route("/metrics", get(crate::metrics::metrics_handler))
        // Interactive terminals
        .route("/ws/terminal", get(handlers::terminal::terminal_socket_handler))
        // API v1 routes
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new().nest("/admin", admin_routes())
}

/// Admin API routes
fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", get(handlers::admin::list_sessions))
        .route("/sessions/:session_id", delete(handlers::admin::close_session))
}
