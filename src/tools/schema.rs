//! Schema introspection tools.
//!
//! This module implements the `list_table` and `describe_table` MCP tools.
//! Both read INFORMATION_SCHEMA views with caller input bound as parameters.

use crate::db::mssql::MssqlConnector;
use crate::db::{ConnectionManager, Connector, DatabaseHandle};
use crate::error::{DbError, DbResult};
use crate::models::{SqlParam, TableColumn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

/// Input for the list_table tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListTableInput {
    /// Schemas to filter by (optional)
    #[serde(default)]
    pub parameters: Option<Vec<String>>,
    /// Name of the database to use (optional). Omit to use the default database.
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Output from the list_table tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListTableOutput {
    pub message: String,
    /// Table names as `schema.table`
    pub items: Vec<String>,
}

/// Input for the describe_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DescribeTableInput {
    /// Name of the table to describe; may be qualified as `schema.table`
    pub table_name: String,
    /// Name of the database to use (optional). Omit to use the default database.
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Output from the describe_table tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DescribeTableOutput {
    pub table_name: String,
    pub columns: Vec<TableColumn>,
}

/// Build the list_table statement for `schema_count` bound schema filters.
pub fn list_tables_sql(schema_count: usize) -> String {
    let mut sql = String::from(
        "SELECT TABLE_SCHEMA + '.' + TABLE_NAME AS name \
         FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_TYPE = 'BASE TABLE'",
    );
    if schema_count > 0 {
        let placeholders: Vec<String> = (1..=schema_count).map(|i| format!("@P{}", i)).collect();
        sql.push_str(&format!(" AND TABLE_SCHEMA IN ({})", placeholders.join(", ")));
    }
    sql.push_str(" ORDER BY TABLE_SCHEMA, TABLE_NAME");
    sql
}

/// Build the describe_table statement and its parameters.
///
/// A `schema.table` name filters on both parts; a bare name matches the table
/// in any schema.
pub fn describe_table_sql(table_name: &str) -> (String, Vec<SqlParam>) {
    let base = "SELECT COLUMN_NAME AS name, DATA_TYPE AS type \
                FROM INFORMATION_SCHEMA.COLUMNS \
                WHERE TABLE_NAME = @P1";
    match table_name.split_once('.') {
        Some((schema, table)) => (
            format!("{} AND TABLE_SCHEMA = @P2 ORDER BY ORDINAL_POSITION", base),
            vec![SqlParam::from(table), SqlParam::from(schema)],
        ),
        None => (
            format!("{} ORDER BY ORDINAL_POSITION", base),
            vec![SqlParam::from(table_name)],
        ),
    }
}

fn string_field(row: &serde_json::Map<String, JsonValue>, key: &str) -> Option<String> {
    row.get(key).and_then(JsonValue::as_str).map(String::from)
}

/// Handler for schema introspection.
pub struct SchemaToolHandler<C: Connector = MssqlConnector> {
    connection_manager: Arc<ConnectionManager<C>>,
}

impl<C: Connector> SchemaToolHandler<C> {
    pub fn new(connection_manager: Arc<ConnectionManager<C>>) -> Self {
        Self { connection_manager }
    }

    /// Handle the list_table tool call.
    pub async fn list_table(&self, input: ListTableInput) -> DbResult<ListTableOutput> {
        let schemas: Vec<String> = input
            .parameters
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let handle = self
            .connection_manager
            .acquire(input.database_name.as_deref())
            .await?;

        let sql = list_tables_sql(schemas.len());
        let params: Vec<SqlParam> = schemas.iter().map(|s| SqlParam::from(s.as_str())).collect();
        let result = handle.query(&sql, &params).await?;

        let items: Vec<String> = result
            .rows
            .iter()
            .filter_map(|row| string_field(row, "name"))
            .collect();

        info!(table_count = items.len(), "Listed tables");

        Ok(ListTableOutput {
            message: "List tables executed successfully".to_string(),
            items,
        })
    }

    /// Handle the describe_table tool call.
    pub async fn describe_table(
        &self,
        input: DescribeTableInput,
    ) -> DbResult<DescribeTableOutput> {
        let table_name = input.table_name.trim();
        if table_name.is_empty() {
            return Err(DbError::invalid_input("Table name cannot be empty"));
        }

        let handle = self
            .connection_manager
            .acquire(input.database_name.as_deref())
            .await?;

        let (sql, params) = describe_table_sql(table_name);
        let result = handle.query(&sql, &params).await?;

        let columns: Vec<TableColumn> = result
            .rows
            .iter()
            .filter_map(|row| {
                Some(TableColumn::new(
                    string_field(row, "name")?,
                    string_field(row, "type")?,
                ))
            })
            .collect();

        info!(table = %table_name, column_count = columns.len(), "Described table");

        Ok(DescribeTableOutput {
            table_name: table_name.to_string(),
            columns,
        })
    }
}
