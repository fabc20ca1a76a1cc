//! Configuration module for the Containly orchestrator
//!
//! Supports configuration via:
//! - YAML/TOML config files
//! - Environment variables (with CONTAINLY_ prefix)

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for the JSON log file
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Container runtime connection
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Interactive terminal sessions
    #[serde(default)]
    pub terminal: TerminalConfig,

    /// Security settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Docker Engine connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Unix socket path; the platform default is used when unset
    #[serde(default)]
    pub docker_socket: Option<String>,

    /// Timeout for individual API requests in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Terminal session bridge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Command started inside the container
    #[serde(default = "default_shell_command")]
    pub shell_command: Vec<String>,

    /// How long the output pump waits for data before re-checking the session
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Sessions without input for this long are closed
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,

    /// How often the idle reaper runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Upper bound on a single stream write or close
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,

    /// Upper bound on opening a stream
    #[serde(default = "default_open_timeout")]
    pub open_timeout_secs: u64,

    /// Outbound events queued per client connection
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Send a newline after opening so the shell prints its prompt
    #[serde(default = "default_true")]
    pub prime_prompt: bool,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    /// Bearer token for the admin API; the admin API is disabled when unset
    #[serde(default)]
    pub admin_token: Option<String>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_request_timeout() -> u64 {
    120
}

fn default_shell_command() -> Vec<String> {
    vec!["/bin/sh".to_string()]
}

fn default_poll_timeout_ms() -> u64 {
    500
}

fn default_idle_ttl() -> u64 {
    3600 // 1 hour
}

fn default_sweep_interval() -> u64 {
    1800 // 30 minutes
}

fn default_close_grace_ms() -> u64 {
    2000
}

fn default_open_timeout() -> u64 {
    10
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_true() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_socket: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell_command: default_shell_command(),
            poll_timeout_ms: default_poll_timeout_ms(),
            idle_ttl_secs: default_idle_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            close_grace_ms: default_close_grace_ms(),
            open_timeout_secs: default_open_timeout(),
            outbound_buffer: default_outbound_buffer(),
            prime_prompt: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            runtime: RuntimeConfig::default(),
            terminal: TerminalConfig::default(),
            security: SecurityConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl TerminalConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Load from config file if present
            .add_source(config::File::with_name("config/containly").required(false))
            .add_source(config::File::with_name("/etc/containly/config").required(false))
            // Override with environment variables (CONTAINLY_ prefix)
            .add_source(
                config::Environment::with_prefix("CONTAINLY")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(" ")
                    .with_list_parse_key("terminal.shell_command"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        let terminal = &self.terminal;
        if terminal.shell_command.is_empty() || terminal.shell_command[0].trim().is_empty() {
            anyhow::bail!("terminal.shell_command cannot be empty");
        }

        if terminal.poll_timeout_ms == 0 {
            anyhow::bail!("terminal.poll_timeout_ms cannot be 0");
        }

        if terminal.idle_ttl_secs == 0 || terminal.sweep_interval_secs == 0 {
            anyhow::bail!("terminal idle TTL and sweep interval must be positive");
        }

        if terminal.close_grace_ms == 0 {
            anyhow::bail!("terminal.close_grace_ms cannot be 0");
        }

        if terminal.open_timeout_secs == 0 {
            anyhow::bail!("terminal.open_timeout_secs cannot be 0");
        }

        if terminal.outbound_buffer == 0 {
            anyhow::bail!("terminal.outbound_buffer cannot be 0");
        }

        if let Some(token) = &self.security.admin_token {
            if token.len() < 16 {
                anyhow::bail!("Admin token must be at least 16 characters");
            }
        }

        Ok(())
    }
}
