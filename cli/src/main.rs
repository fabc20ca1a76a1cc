//! Containly CLI - admin client for the Containly orchestrator
//!
//! Checks server health and lists or closes live terminal sessions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

/// Containly CLI - inspect and manage terminal sessions
#[derive(Parser)]
#[command(name = "containly")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Admin CLI for the Containly orchestrator", long_about = None)]
struct Cli {
    /// Orchestrator URL
    #[arg(short, long, default_value = "http://127.0.0.1:5001")]
    api_url: String,

    /// Admin token for the session endpoints
    #[arg(short, long, env = "CONTAINLY_ADMIN_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get server health status
    Health,

    /// List open terminal sessions
    Sessions {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Close a terminal session
    Close {
        /// Session id as shown by `sessions`
        session_id: String,
    },
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    active_sessions: u64,
    runtime_version: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionSummary {
    session_id: String,
    container_id: String,
    state: String,
    created_at: String,
    last_activity: String,
    idle_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionListResponse {
    sessions: Vec<SessionSummary>,
    total: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.api_url))
                .send()
                .context("Failed to get health")?;

            if !response.status().is_success() {
                anyhow::bail!("Health check failed: {}", response.status());
            }

            let health: HealthResponse = response.json().context("Failed to parse response")?;

            println!("{}", "Containly Orchestrator Status".bright_cyan().bold());
            println!("{}", "=".repeat(40).bright_blue());
            println!("{} {}", "Status:".cyan(),
                if health.status == "healthy" {
                    health.status.green()
                } else {
                    health.status.yellow()
                }
            );
            println!("{} {}", "Version:".cyan(), health.version);
            println!("{} {}s", "Uptime:".cyan(), health.uptime_seconds);
            println!("{} {}", "Active Sessions:".cyan(), health.active_sessions);
            println!("{} {}", "Docker:".cyan(),
                match health.runtime_version {
                    Some(version) => version.normal(),
                    None => "unreachable".red(),
                }
            );
        }

        Commands::Sessions { output } => {
            let request = client.get(format!("{}/api/v1/admin/sessions", cli.api_url));
            let response = send_admin(request, cli.token.as_deref())
                .context("Failed to list sessions")?;

            let result: SessionListResponse =
                response.json().context("Failed to parse response")?;

            if output == "json" {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            if result.sessions.is_empty() {
                println!("{}", "No open sessions".yellow());
                return Ok(());
            }

            println!("{}", format!("Open sessions ({})", result.total).bright_cyan().bold());
            for session in &result.sessions {
                let state = if session.state == "active" {
                    session.state.green()
                } else {
                    session.state.yellow()
                };
                println!(
                    "  {} {} {} idle {}s",
                    session.session_id.bold(),
                    session.container_id,
                    state,
                    session.idle_seconds
                );
            }
        }

        Commands::Close { session_id } => {
            let request = client.delete(format!(
                "{}/api/v1/admin/sessions/{}",
                cli.api_url, session_id
            ));
            send_admin(request, cli.token.as_deref()).context("Failed to close session")?;

            println!("{} {}", "✓ Closed:".green(), session_id);
        }
    }

    Ok(())
}

/// Send an admin request, turning error bodies into readable failures
fn send_admin(request: RequestBuilder, token: Option<&str>) -> Result<Response> {
    let token = token.context("An admin token is required (--token or CONTAINLY_ADMIN_TOKEN)")?;

    let response = request.bearer_auth(token).send()?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<ErrorResponse>()
        .map(|e| e.message)
        .unwrap_or_else(|_| "Unknown error".to_string());
    anyhow::bail!("Request failed ({}): {}", status, message)
}
