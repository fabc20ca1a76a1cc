//! Prometheus metrics export
//!
//! Provides metrics endpoint for monitoring and alerting

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::AppState;

/// Prometheus metrics recorder
static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Calling this again is a no-op.
pub fn init_metrics() -> Result<()> {
    METRICS_HANDLE
        .get_or_try_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .context("Failed to install Prometheus recorder")
        })
        .map(|_| ())
}

/// Record a successfully opened terminal session
pub fn record_session_opened() {
    counter!("containly_sessions_opened_total").increment(1);
    gauge!("containly_active_sessions").increment(1.0);
}

/// Record a terminal session reaching `Closed`
pub fn record_session_closed(reason: &str) {
    counter!("containly_sessions_closed_total", "reason" => reason.to_string()).increment(1);
    gauge!("containly_active_sessions").decrement(1.0);
}

/// Record a rejected open request
pub fn record_open_failure(kind: &str) {
    counter!("containly_session_open_failures_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_idle_expiry() {
    counter!("containly_sessions_expired_total").increment(1);
}

pub fn record_input_bytes(bytes: u64) {
    counter!("containly_terminal_input_bytes_total").increment(bytes);
}

pub fn record_output_bytes(bytes: u64) {
    counter!("containly_terminal_output_bytes_total").increment(bytes);
}

/// Prometheus metrics endpoint handler
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(handle) = METRICS_HANDLE.get() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [("Content-Type", "text/plain; version=0.0.4")],
            "metrics disabled\n".to_string(),
        );
    };

    // Resync the gauge with the registry
    gauge!("containly_active_sessions").set(state.sessions.active_count().await as f64);

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        handle.render(),
    )
}
