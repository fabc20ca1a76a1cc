//! Containly orchestrator - container host console
//!
//! Serves the terminal WebSocket, the admin API and health/metrics endpoints,
//! backed by the local Docker daemon.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::http::HeaderName;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use containly_orchestrator::api::create_router;
use containly_orchestrator::config::AppConfig;
use containly_orchestrator::logging::init_logging;
use containly_orchestrator::terminal::{CloseReason, DockerStreamProvider, IdleReaper, StreamProvider};
use containly_orchestrator::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_logging(&config.log_level, &config.log_dir)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Containly orchestrator"
    );

    if config.metrics.enabled {
        containly_orchestrator::metrics::init_metrics()?;
        info!("Prometheus metrics initialized");
    }

    // Connect to the container runtime
    let runtime = Arc::new(DockerStreamProvider::connect(&config.runtime)?);
    match runtime.runtime_version().await {
        Some(version) => info!(%version, "Connected to Docker"),
        None => warn!("Docker is not reachable; terminals will fail until it is"),
    }

    let state = AppState::new(config.clone(), runtime);

    // Close sessions nobody has typed into for a while
    let reaper = IdleReaper::new(
        state.sessions.clone(),
        config.terminal.idle_ttl(),
        config.terminal.sweep_interval(),
    )
    .spawn();

    // Build the router with all routes and middleware
    let x_request_id = HeaderName::from_static("x-request-id");
    let app = create_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Bind to address
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(%addr, "Listening on");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");

    reaper.abort();
    let closed = state.sessions.close_all(CloseReason::Shutdown).await;
    if closed > 0 {
        warn!(sessions = closed, "Closed open terminal sessions");
    }

    info!("Containly orchestrator stopped");
    Ok(())
}

/// Handle shutdown signals gracefully
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
