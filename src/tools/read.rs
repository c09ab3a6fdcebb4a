//! Query execution tool.
//!
//! This module implements the `read_data` MCP tool. The database name is
//! resolved first, then the query text goes through the
//! [`sql_validator`](crate::tools::sql_validator), and only then is a
//! connection acquired.

use crate::db::mssql::MssqlConnector;
use crate::db::{ConnectionManager, Connector, DatabaseHandle};
use crate::error::{DbError, DbResult};
use crate::models::MAX_ROW_LIMIT;
use crate::tools::sql_validator;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};

/// Characters of the query echoed into logs on rejection / execution.
const REJECTED_PREVIEW_CHARS: usize = 100;
const EXECUTED_PREVIEW_CHARS: usize = 200;

/// Input for the read_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadDataInput {
    /// SQL SELECT query to execute (must start with SELECT and cannot contain destructive operations). Example: SELECT * FROM movies WHERE genre = 'comedy'
    pub query: String,
    /// Name of the database to query (optional). Omit to use the default database.
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Output from the read_data tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadDataOutput {
    pub message: String,
    /// Result rows keyed by (sanitized) column name
    pub data: Vec<serde_json::Map<String, JsonValue>>,
    /// Number of rows returned
    pub record_count: usize,
    /// Number of rows the query produced before capping
    pub total_records: usize,
}

/// Handler for the read_data tool.
pub struct ReadDataToolHandler<C: Connector = MssqlConnector> {
    connection_manager: Arc<ConnectionManager<C>>,
}

impl<C: Connector> ReadDataToolHandler<C> {
    pub fn new(connection_manager: Arc<ConnectionManager<C>>) -> Self {
        Self { connection_manager }
    }

    /// Handle the read_data tool call.
    pub async fn read_data(&self, input: ReadDataInput) -> DbResult<ReadDataOutput> {
        let database = self
            .connection_manager
            .resolve(input.database_name.as_deref())?;

        if let Err(rejection) = sql_validator::validate_read_query(&input.query) {
            warn!(
                database = %database,
                reason = %rejection,
                query = %preview(&input.query, REJECTED_PREVIEW_CHARS),
                "Security validation failed for query"
            );
            return Err(rejection.into());
        }

        info!(
            database = %database,
            query = %preview(&input.query, EXECUTED_PREVIEW_CHARS),
            "Executing validated SELECT query"
        );

        let handle = self.connection_manager.pools().get_handle(&database).await?;
        let result = handle
            .query(&input.query, &[])
            .await
            .map_err(sanitize_execution_error)?;

        let total_records = result.rows.len();
        if total_records > MAX_ROW_LIMIT {
            warn!(
                total_records = total_records,
                limit = MAX_ROW_LIMIT,
                "Query returned too many records, limiting"
            );
        }

        let data: Vec<_> = result
            .rows
            .into_iter()
            .take(MAX_ROW_LIMIT)
            .map(sanitize_row)
            .collect();
        let record_count = data.len();

        info!(
            database = %database,
            record_count = record_count,
            execution_time_ms = result.execution_time_ms,
            "Query executed"
        );

        let mut message = format!(
            "Query executed successfully. Retrieved {} record(s)",
            record_count
        );
        if record_count != total_records {
            message.push_str(&format!(" (limited from {} total records)", total_records));
        }

        Ok(ReadDataOutput {
            message,
            data,
            record_count,
            total_records,
        })
    }
}

/// Keep only `[A-Za-z0-9_\s.-]` in a column name.
pub fn sanitize_column_name(name: &str) -> String {
    name.chars()
        .filter(|c| {
            c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '.' | '-')
        })
        .collect()
}

fn sanitize_row(row: serde_json::Map<String, JsonValue>) -> serde_json::Map<String, JsonValue> {
    row.into_iter()
        .map(|(key, value)| {
            let sanitized = sanitize_column_name(&key);
            if sanitized != key {
                warn!(original = %key, sanitized = %sanitized, "Column name sanitized");
            }
            (sanitized, value)
        })
        .collect()
}

/// Only "Invalid object name" errors are passed through; anything else could
/// leak server internals.
fn sanitize_execution_error(err: DbError) -> DbError {
    match err {
        DbError::Database { message, code, .. } if message.contains("Invalid object name") => {
            DbError::database(
                format!("Failed to execute query: {}", message),
                code,
                "Check the table name; use list_table to see available tables",
            )
        }
        other => {
            warn!(error = %other, "Error executing query");
            DbError::database(
                "Failed to execute query: Database query execution failed",
                None,
                "Check the query and referenced objects",
            )
        }
    }
}

/// Truncate to `max` characters, appending "..." when shortened.
fn preview(query: &str, max: usize) -> String {
    match query.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &query[..idx]),
        None => query.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_data_input_deserialization() {
        let json = r#"{"query": "SELECT * FROM movies", "databaseName": "ProdDB"}"#;
        let input: ReadDataInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.query, "SELECT * FROM movies");
        assert_eq!(input.database_name.as_deref(), Some("ProdDB"));

        let input: ReadDataInput = serde_json::from_str(r#"{"query": "SELECT 1"}"#).unwrap();
        assert!(input.database_name.is_none());
    }

    #[test]
    fn test_sanitize_column_name() {
        assert_eq!(sanitize_column_name("user_id"), "user_id");
        assert_eq!(sanitize_column_name("first name"), "first name");
        assert_eq!(sanitize_column_name("a.b-c"), "a.b-c");
        assert_eq!(sanitize_column_name("total$<script>"), "totalscript");
        assert_eq!(sanitize_column_name(""), "");
    }

    #[test]
    fn test_sanitize_execution_error_passes_invalid_object_name() {
        let err = DbError::database("Invalid object name 'nope'.", Some(208), "x");
        let sanitized = sanitize_execution_error(err);
        assert!(sanitized.to_string().contains("Invalid object name 'nope'."));
    }

    #[test]
    fn test_sanitize_execution_error_hides_other_errors() {
        let err = DbError::database("Login failed for user 'sa' on host 10.0.0.5", Some(18456), "x");
        let sanitized = sanitize_execution_error(err);
        let text = sanitized.to_string();
        assert!(text.contains("Database query execution failed"));
        assert!(!text.contains("10.0.0.5"));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("SELECT 1", 200), "SELECT 1");
        assert_eq!(preview("ééééé", 3), "ééé...");
    }

    #[test]
    fn test_output_serializes_camel_case() {
        let output = ReadDataOutput {
            message: "ok".to_string(),
            data: Vec::new(),
            record_count: 0,
            total_records: 0,
        };
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"recordCount\":0"));
        assert!(json.contains("\"totalRecords\":0"));
    }
}
