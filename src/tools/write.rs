//! Data modification tools.
//!
//! This module implements the `insert_data` and `update_data` MCP tools.
//! Values are always bound as parameters; identifiers are validated and
//! bracket-quoted.

use crate::db::mssql::MssqlConnector;
use crate::db::{ConnectionManager, Connector, DatabaseHandle};
use crate::error::{DbError, DbResult};
use crate::models::SqlParam;
use crate::tools::identifier::{quote, quote_qualified, validate_identifier};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::info;

/// SQL Server accepts at most 2100 parameters per request.
pub const MAX_PARAMETERS: usize = 2100;

/// Input for the insert_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InsertDataInput {
    /// Name of the table to insert into; may be qualified as `schema.table`
    pub table_name: String,
    /// A record object, or an array of record objects with identical columns
    pub data: JsonValue,
    /// Name of the database to use (optional). Omit to use the default database.
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Output from the insert_data tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InsertDataOutput {
    pub message: String,
    pub records_inserted: u64,
}

/// Input for the update_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDataInput {
    /// Name of the table to update; may be qualified as `schema.table`
    pub table_name: String,
    /// Column/value pairs to set
    pub updates: Map<String, JsonValue>,
    /// WHERE clause (without the WHERE keyword) selecting the rows to update. Required.
    pub where_clause: String,
    /// Name of the database to use (optional). Omit to use the default database.
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Output from the update_data tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDataOutput {
    pub message: String,
    pub rows_affected: u64,
}

/// Build a multi-row parameterized INSERT.
///
/// Every record must have exactly the column set of the first one.
pub fn build_insert(table_name: &str, data: &JsonValue) -> DbResult<(String, Vec<SqlParam>)> {
    let records: Vec<&Map<String, JsonValue>> = match data {
        JsonValue::Object(record) => vec![record],
        JsonValue::Array(items) => items
            .iter()
            .map(|item| {
                item.as_object().ok_or_else(|| {
                    DbError::invalid_input("Every element of data must be an object")
                })
            })
            .collect::<DbResult<_>>()?,
        _ => {
            return Err(DbError::invalid_input(
                "data must be an object or an array of objects",
            ));
        }
    };

    let first = records
        .first()
        .ok_or_else(|| DbError::invalid_input("No data provided for insert"))?;
    let columns: Vec<&String> = first.keys().collect();
    if columns.is_empty() {
        return Err(DbError::invalid_input("Records must have at least one column"));
    }
    for column in &columns {
        validate_identifier("Column name", column)?;
    }

    let param_count = records.len() * columns.len();
    if param_count > MAX_PARAMETERS {
        return Err(DbError::invalid_input(format!(
            "Insert needs {} parameters; SQL Server allows at most {}. Split the data into smaller batches.",
            param_count, MAX_PARAMETERS
        )));
    }

    let mut params = Vec::with_capacity(param_count);
    let mut value_rows = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        if record.len() != columns.len() || !columns.iter().all(|c| record.contains_key(*c)) {
            return Err(DbError::invalid_input(format!(
                "Record {} has different columns than the first record. All records must have the same columns.",
                index
            )));
        }
        let placeholders: Vec<String> = columns
            .iter()
            .map(|column| {
                params.push(SqlParam::from(&record[column.as_str()]));
                format!("@P{}", params.len())
            })
            .collect();
        value_rows.push(format!("({})", placeholders.join(", ")));
    }

    let column_list: Vec<String> = columns.iter().map(|c| quote(c)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_qualified("Table name", table_name)?,
        column_list.join(", "),
        value_rows.join(", ")
    );
    Ok((sql, params))
}

/// Build a parameterized UPDATE with a caller-supplied WHERE clause.
pub fn build_update(
    table_name: &str,
    updates: &Map<String, JsonValue>,
    where_clause: &str,
) -> DbResult<(String, Vec<SqlParam>)> {
    if updates.is_empty() {
        return Err(DbError::invalid_input("No columns provided to update"));
    }

    let where_clause = where_clause.trim();
    if where_clause.is_empty() {
        return Err(DbError::invalid_input(
            "WHERE clause is required for security reasons",
        ));
    }
    if where_clause.contains(';') || where_clause.contains("--") || where_clause.contains("/*") {
        return Err(DbError::invalid_input(
            "WHERE clause may not contain ';' or SQL comments",
        ));
    }

    let mut params = Vec::with_capacity(updates.len());
    let mut assignments = Vec::with_capacity(updates.len());
    for (column, value) in updates {
        validate_identifier("Column name", column)?;
        params.push(SqlParam::from(value));
        assignments.push(format!("{} = @P{}", quote(column), params.len()));
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_qualified("Table name", table_name)?,
        assignments.join(", "),
        where_clause
    );
    Ok((sql, params))
}

/// Handler for data modification.
pub struct WriteToolHandler<C: Connector = MssqlConnector> {
    connection_manager: Arc<ConnectionManager<C>>,
}

impl<C: Connector> WriteToolHandler<C> {
    pub fn new(connection_manager: Arc<ConnectionManager<C>>) -> Self {
        Self { connection_manager }
    }

    /// Handle the insert_data tool call.
    pub async fn insert_data(&self, input: InsertDataInput) -> DbResult<InsertDataOutput> {
        let (sql, params) = build_insert(&input.table_name, &input.data)?;
        let handle = self
            .connection_manager
            .acquire(input.database_name.as_deref())
            .await?;

        let records_inserted = handle.execute(&sql, &params).await?;

        info!(
            table = %input.table_name,
            records_inserted = records_inserted,
            "Inserted data"
        );

        Ok(InsertDataOutput {
            message: format!(
                "Successfully inserted {} record(s) into {}",
                records_inserted, input.table_name
            ),
            records_inserted,
        })
    }

    /// Handle the update_data tool call.
    pub async fn update_data(&self, input: UpdateDataInput) -> DbResult<UpdateDataOutput> {
        let (sql, params) = build_update(&input.table_name, &input.updates, &input.where_clause)?;
        let handle = self
            .connection_manager
            .acquire(input.database_name.as_deref())
            .await?;

        let rows_affected = handle.execute(&sql, &params).await?;

        info!(
            table = %input.table_name,
            rows_affected = rows_affected,
            "Updated data"
        );

        Ok(UpdateDataOutput {
            message: format!(
                "Update completed successfully. {} row(s) affected",
                rows_affected
            ),
            rows_affected,
        })
    }
}
