//! Containly orchestrator library
//!
//! Opens interactive shells inside running containers and bridges them to
//! browser clients over a WebSocket. The session bridge lives in [`terminal`].

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod terminal;

use terminal::{ConnectionHub, SessionManager, SessionRegistry, StreamProvider, Transport};

/// Application state shared across all handlers
pub struct AppState {
    pub config: config::AppConfig,
    pub sessions: Arc<SessionManager>,
    pub hub: Arc<ConnectionHub>,
    pub runtime: Arc<dyn StreamProvider>,
}

impl AppState {
    /// Wire the session bridge to `runtime`, delivering through a fresh connection hub
    pub fn new(config: config::AppConfig, runtime: Arc<dyn StreamProvider>) -> Arc<Self> {
        let hub = Arc::new(ConnectionHub::new(config.terminal.outbound_buffer));
        let transport: Arc<dyn Transport> = hub.clone();

        let sessions = Arc::new(SessionManager::new(
            Arc::new(SessionRegistry::new()),
            runtime.clone(),
            transport,
            config.terminal.clone(),
        ));

        Arc::new(Self {
            config,
            sessions,
            hub,
            runtime,
        })
    }
}
