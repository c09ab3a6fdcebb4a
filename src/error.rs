//! Error types for the MSSQL MCP Server.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each error variant provides actionable messages to help AI assistants understand
//! and recover from error conditions.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// SQL Server error number, e.g. 208 for "Invalid object name"
        code: Option<u32>,
        suggestion: String,
    },

    #[error(
        "Invalid or disallowed database. Allowed: {allowed}. Use databaseName parameter to target a specific database."
    )]
    InvalidDatabase { allowed: String },

    #[error("Security validation failed: {reason}")]
    ValidationRejected { reason: String },

    #[error("Permission denied: {operation} - {reason}")]
    Permission { operation: String, reason: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL Server error number.
    pub fn database(
        message: impl Into<String>,
        code: Option<u32>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            code,
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid database error listing what may be used instead.
    ///
    /// An empty allow-list points at the `DATABASE_NAME` setting.
    pub fn invalid_database(allowed: &[String]) -> Self {
        let allowed = if allowed.is_empty() {
            "DATABASE_NAME".to_string()
        } else {
            allowed.join(", ")
        };
        Self::InvalidDatabase { allowed }
    }

    /// Create a validation error carrying the validator's reason verbatim.
    pub fn validation_rejected(reason: impl Into<String>) -> Self {
        Self::ValidationRejected {
            reason: reason.into(),
        }
    }

    /// Create a permission error.
    pub fn permission(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permission {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert tiberius errors to DbError.
impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error as TdsError;

        match err {
            TdsError::Server(token) => DbError::database(
                token.message().to_string(),
                Some(token.code()),
                "Check the SQL syntax and referenced objects",
            ),
            TdsError::Io { .. } => DbError::connection(
                format!("I/O error: {}", err),
                "Check network connectivity and database server status",
            ),
            TdsError::Tls(_) => DbError::connection(
                format!("TLS error: {}", err),
                "Verify TLS configuration and TRUST_SERVER_CERTIFICATE",
            ),
            TdsError::Routing { .. } => DbError::connection(
                format!("Server requested routing: {}", err),
                "Connect to the server the routing response points at",
            ),
            TdsError::Protocol(_) => DbError::connection(
                format!("Protocol error: {}", err),
                "Check database server compatibility",
            ),
            _ => DbError::database(
                err.to_string(),
                None,
                "Check the SQL statement and parameter types",
            ),
        }
    }
}

/// Convert bb8-tiberius connection manager errors to DbError.
impl From<bb8_tiberius::Error> for DbError {
    fn from(err: bb8_tiberius::Error) -> Self {
        match err {
            bb8_tiberius::Error::Tiberius(inner) => inner.into(),
            bb8_tiberius::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check SERVER_NAME, SERVER_PORT and that SQL Server accepts TCP connections",
            ),
        }
    }
}

/// Convert bb8 pool checkout errors to DbError.
impl From<bb8::RunError<bb8_tiberius::Error>> for DbError {
    fn from(err: bb8::RunError<bb8_tiberius::Error>) -> Self {
        match err {
            bb8::RunError::User(inner) => inner.into(),
            bb8::RunError::TimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "Increase CONNECTION_TIMEOUT or check database server load",
            ),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// Includes the suggestion field in the `data` object when available.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        match &err {
            // Caller-correctable input -> invalid_params
            DbError::InvalidInput { .. }
            | DbError::Permission { .. }
            | DbError::ValidationRejected { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), suggestion_data(err.suggestion()))
            }

            DbError::InvalidDatabase { .. } => rmcp::ErrorData::resource_not_found(
                err.to_string(),
                suggestion_data(Some(
                    "Omit databaseName to use the default database, or pick one of the allowed names",
                )),
            ),

            // Connection, Timeout -> internal_error (with implicit retryable flag)
            DbError::Connection { suggestion, .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(Some(suggestion)))
            }
            DbError::Timeout { .. } => rmcp::ErrorData::internal_error(
                err.to_string(),
                suggestion_data(Some(
                    "Consider increasing CONNECTION_TIMEOUT or checking server availability",
                )),
            ),

            // Database errors -> invalid_params with the error number in the message
            DbError::Database {
                message,
                code,
                suggestion,
            } => {
                let msg = match code {
                    Some(code) => format!("{} (error {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, suggestion_data(Some(suggestion)))
            }

            DbError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(err.suggestion()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database("Incorrect syntax", Some(102), "Check SQL syntax");
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("connect", 30).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::permission("write", "read-only").is_retryable());
        assert!(!DbError::validation_rejected("nope").is_retryable());
    }

    #[test]
    fn test_invalid_database_lists_allowed_names() {
        let allowed = vec!["ProdDB".to_string(), "StagingDB".to_string()];
        let err = DbError::invalid_database(&allowed);
        assert_eq!(
            err.to_string(),
            "Invalid or disallowed database. Allowed: ProdDB, StagingDB. Use databaseName parameter to target a specific database."
        );
    }

    #[test]
    fn test_invalid_database_names_setting_when_list_empty() {
        let err = DbError::invalid_database(&[]);
        assert!(err.to_string().contains("Allowed: DATABASE_NAME."));
    }

    #[test]
    fn test_validation_rejected_keeps_reason_verbatim() {
        let err = DbError::validation_rejected("Query must start with SELECT for security reasons");
        assert_eq!(
            err.to_string(),
            "Security validation failed: Query must start with SELECT for security reasons"
        );
    }

    // Tests for From<DbError> for rmcp::ErrorData

    #[test]
    fn test_invalid_input_maps_to_invalid_params() {
        let err = DbError::invalid_input("bad input");
        let mcp_err: rmcp::ErrorData = err.into();
        // invalid_params uses -32602
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_validation_rejected_maps_to_invalid_params() {
        let err = DbError::validation_rejected("Multiple SQL statements are not allowed.");
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_invalid_database_maps_to_resource_not_found() {
        let err = DbError::invalid_database(&["ProdDB".to_string()]);
        let mcp_err: rmcp::ErrorData = err.into();
        // resource_not_found uses -32002 in rmcp
        assert_eq!(mcp_err.code.0, -32002);
        assert!(mcp_err.message.contains("ProdDB"));
    }

    #[test]
    fn test_connection_maps_to_internal_error() {
        let err = DbError::connection("failed", "try again");
        let mcp_err: rmcp::ErrorData = err.into();
        // internal_error uses -32603
        assert_eq!(mcp_err.code.0, -32603);
    }

    #[test]
    fn test_timeout_maps_to_internal_error() {
        let err = DbError::timeout("connect", 30);
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32603);
    }

    #[test]
    fn test_database_error_includes_error_number() {
        let err = DbError::database("Invalid object name 'x'", Some(208), "check objects");
        let mcp_err: rmcp::ErrorData = err.into();
        assert!(mcp_err.message.contains("208"));
    }

    #[test]
    fn test_connection_error_includes_suggestion_in_data() {
        let err = DbError::connection("failed", "try reconnecting");
        let mcp_err: rmcp::ErrorData = err.into();
        assert!(mcp_err.data.is_some());
        let data = mcp_err.data.unwrap();
        assert_eq!(data["suggestion"], "try reconnecting");
    }
}
