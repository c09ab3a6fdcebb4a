//! MSSQL MCP Server - Main entry point.
//!
//! Serves MCP tools for Microsoft SQL Server over stdio. Connection settings
//! come from the environment (optionally loaded from a `.env` file).

use clap::Parser;
use mssql_mcp_server::config::{Config, EnvSettings, SettingsSource};
use mssql_mcp_server::db::{ConnectionManager, allowed_databases};
use mssql_mcp_server::transport::{StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs always go to stderr; stdout carries the MCP protocol.
fn init_tracing(config: &Config) {
    if !config.enable_logs {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let config = Config::parse();
    init_tracing(&config);

    info!(
        readonly = config.readonly,
        "Starting MSSQL MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let settings = EnvSettings.load();
    let allowed = allowed_databases(&settings);
    if allowed.is_empty() {
        warn!("DATABASES is not set; any database name will be accepted");
    } else {
        info!(databases = %allowed.join(", "), "Allowed databases");
    }
    match settings.default_database() {
        Some(name) => info!(database = %name, "Default database"),
        None => warn!("DATABASE_NAME is not set; every tool call must pass databaseName"),
    }

    // Pools are created lazily on first use
    let connection_manager = Arc::new(ConnectionManager::from_env());

    let transport = StdioTransport::new(connection_manager, config.readonly);
    info!(transport = transport.name(), "Using transport");

    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
