//! Admin session handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::api::{AdminAuth, ApiError};
use crate::models::SessionListResponse;
use crate::terminal::{CloseReason, SessionId};
use crate::AppState;

/// List all live terminal sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Json<SessionListResponse> {
    let sessions = state.sessions.list().await;
    let total = sessions.len();

    Json(SessionListResponse { sessions, total })
}

/// Close a terminal session
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session_id = SessionId::new(session_id);

    // Surfaces SessionNotFound as 404
    state.sessions.lookup(&session_id).await?;

    state
        .sessions
        .close_with_reason(&session_id, CloseReason::Requested)
        .await;

    info!(session_id = %session_id, "Admin closed terminal session");

    Ok(StatusCode::NO_CONTENT)
}
