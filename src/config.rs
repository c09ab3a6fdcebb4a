//! Configuration handling for the MSSQL MCP Server.
//!
//! Process-level flags (read-only mode, logging) are parsed once at startup via
//! clap. Database settings are different: the allow-list, default database and
//! connection parameters are re-read from the environment on every request, so
//! they are modelled as a [`SettingsSource`] that hands out fresh snapshots.

use clap::Parser;
use std::time::Duration;

pub const DEFAULT_SERVER_NAME: &str = "localhost";
pub const DEFAULT_SERVER_PORT: u16 = 1433;
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;

// Environment variable names for database settings
pub const ENV_DATABASES: &str = "DATABASES";
pub const ENV_DATABASE_NAME: &str = "DATABASE_NAME";
pub const ENV_SERVER_NAME: &str = "SERVER_NAME";
pub const ENV_SERVER_PORT: &str = "SERVER_PORT";
pub const ENV_DB_USER: &str = "DB_USER";
pub const ENV_DB_PASSWORD: &str = "DB_PASSWORD";
pub const ENV_TRUST_SERVER_CERTIFICATE: &str = "TRUST_SERVER_CERTIFICATE";
pub const ENV_CONNECTION_TIMEOUT: &str = "CONNECTION_TIMEOUT";

/// Snapshot of the database-related settings.
///
/// Fields hold the raw values as found in the environment; the accessor
/// methods apply defaults and parsing.
#[derive(Debug, Clone, Default)]
pub struct DatabaseSettings {
    /// Comma-separated allow-list (`DATABASES`).
    pub databases: Option<String>,
    /// Default database (`DATABASE_NAME`).
    pub database_name: Option<String>,
    pub server_name: Option<String>,
    pub server_port: Option<String>,
    pub user: Option<String>,
    /// Sensitive - never logged.
    pub password: Option<String>,
    pub trust_server_certificate: Option<String>,
    /// Seconds, as text.
    pub connection_timeout: Option<String>,
}

impl DatabaseSettings {
    /// Build a snapshot from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            databases: lookup(ENV_DATABASES),
            database_name: lookup(ENV_DATABASE_NAME),
            server_name: lookup(ENV_SERVER_NAME),
            server_port: lookup(ENV_SERVER_PORT),
            user: lookup(ENV_DB_USER),
            password: lookup(ENV_DB_PASSWORD),
            trust_server_certificate: lookup(ENV_TRUST_SERVER_CERTIFICATE),
            connection_timeout: lookup(ENV_CONNECTION_TIMEOUT),
        }
    }

    /// Build a snapshot from the current process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// The default database, trimmed. `None` when unset or blank.
    pub fn default_database(&self) -> Option<&str> {
        self.database_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// SQL Server host (default: localhost).
    pub fn server_name(&self) -> &str {
        self.server_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SERVER_NAME)
    }

    /// SQL Server TCP port (default: 1433).
    pub fn server_port(&self) -> u16 {
        self.server_port
            .as_deref()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    /// Trust the server certificate unless explicitly set to `false`.
    pub fn trust_server_certificate(&self) -> bool {
        !self
            .trust_server_certificate
            .as_deref()
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("false"))
    }

    /// Connection timeout; unparsable or zero values fall back to 30 seconds.
    pub fn connection_timeout(&self) -> Duration {
        let secs = self
            .connection_timeout
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_CONNECTION_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }
}

/// Where database settings come from.
///
/// Implementations must return a fresh snapshot on each call; callers never
/// cache the result across requests.
pub trait SettingsSource: Send + Sync {
    fn load(&self) -> DatabaseSettings;
}

/// Reads the process environment on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSettings;

impl SettingsSource for EnvSettings {
    fn load(&self) -> DatabaseSettings {
        DatabaseSettings::from_env()
    }
}

/// A fixed snapshot, mostly useful in tests.
impl SettingsSource for DatabaseSettings {
    fn load(&self) -> DatabaseSettings {
        self.clone()
    }
}

/// Configuration for the MSSQL MCP Server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mssql-mcp-server",
    about = "MCP server for SQL Server - enables AI assistants to run guarded queries",
    version,
    author
)]
pub struct Config {
    /// Expose only the read tools (list_table, read_data, describe_table)
    #[arg(long, env = "READONLY")]
    pub readonly: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (disabled by default to avoid interfering with stdio transport)
    #[arg(long, env = "MCP_ENABLE_LOGS")]
    pub enable_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            readonly: false,
            log_level: "info".to_string(),
            json_logs: false,
            enable_logs: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
