//! Schema modification tools.
//!
//! This module implements the `create_table`, `create_index` and `drop_table`
//! MCP tools. These statements cannot take bound identifiers, so every name is
//! validated and bracket-quoted before it is spliced in.

use crate::db::mssql::MssqlConnector;
use crate::db::{ConnectionManager, Connector, DatabaseHandle};
use crate::error::{DbError, DbResult};
use crate::models::ColumnDefinition;
use crate::tools::identifier::{quote, quote_qualified, validate_identifier};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Input for the create_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTableInput {
    /// Name of the table to create; may be qualified as `schema.table`
    pub table_name: String,
    /// Column definitions
    pub columns: Vec<ColumnDefinition>,
    /// Name of the database to use (optional). Omit to use the default database.
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Input for the create_index tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateIndexInput {
    /// Name of the schema containing the table
    #[serde(default)]
    pub schema_name: Option<String>,
    /// Name of the table to create index on
    pub table_name: String,
    /// Name for the new index
    pub index_name: String,
    /// Column names to include in the index
    pub columns: Vec<String>,
    /// Whether the index should enforce uniqueness (default: false)
    #[serde(default)]
    pub is_unique: bool,
    /// Whether the index should be clustered (default: false)
    #[serde(default)]
    pub is_clustered: bool,
    /// Name of the database to use (optional). Omit to use the default database.
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Input for the drop_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DropTableInput {
    /// Name of the table to drop
    pub table_name: String,
    /// Name of the database to use (optional). Omit to use the default database.
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Output from the DDL tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DdlOutput {
    pub message: String,
    /// The statement that was executed
    pub statement: String,
}

/// Build a CREATE TABLE statement.
pub fn build_create_table(table_name: &str, columns: &[ColumnDefinition]) -> DbResult<String> {
    if columns.is_empty() {
        return Err(DbError::invalid_input("At least one column is required"));
    }

    let definitions = columns
        .iter()
        .map(|column| {
            validate_identifier("Column name", &column.name)?;
            let data_type = column.data_type.trim();
            if data_type.is_empty() {
                return Err(DbError::invalid_input(format!(
                    "Column '{}' needs a type",
                    column.name
                )));
            }
            if data_type.contains(';') || data_type.contains("--") || data_type.contains("/*") {
                return Err(DbError::invalid_input(format!(
                    "Invalid type for column '{}'. Types may not contain ';' or SQL comments.",
                    column.name
                )));
            }
            Ok(format!("{} {}", quote(&column.name), data_type))
        })
        .collect::<DbResult<Vec<_>>>()?;

    Ok(format!(
        "CREATE TABLE {} ({})",
        quote_qualified("Table name", table_name)?,
        definitions.join(", ")
    ))
}

/// Build a CREATE INDEX statement.
pub fn build_create_index(input: &CreateIndexInput) -> DbResult<String> {
    if input.columns.is_empty() {
        return Err(DbError::invalid_input(
            "At least one column is required for an index",
        ));
    }

    let index_name = validate_identifier("Index name", &input.index_name)?;
    let table = quote(validate_identifier("Table name", &input.table_name)?);
    let table_ref = match input.schema_name.as_deref().filter(|s| !s.is_empty()) {
        Some(schema) => format!("{}.{}", quote(validate_identifier("Schema name", schema)?), table),
        None => table,
    };
    let columns = input
        .columns
        .iter()
        .map(|c| validate_identifier("Column name", c).map(quote))
        .collect::<DbResult<Vec<_>>>()?;

    let mut index_type = if input.is_clustered {
        "CLUSTERED".to_string()
    } else {
        "NONCLUSTERED".to_string()
    };
    if input.is_unique {
        index_type = format!("UNIQUE {}", index_type);
    }

    Ok(format!(
        "CREATE {} INDEX {} ON {} ({})",
        index_type,
        quote(index_name),
        table_ref,
        columns.join(", ")
    ))
}

/// Build a DROP TABLE statement. Only unqualified names are accepted.
pub fn build_drop_table(table_name: &str) -> DbResult<String> {
    validate_identifier("Table name", table_name)
        .map_err(|_| DbError::invalid_input("Invalid table name."))?;
    Ok(format!("DROP TABLE {}", quote(table_name)))
}

/// Handler for schema modification.
pub struct DdlToolHandler<C: Connector = MssqlConnector> {
    connection_manager: Arc<ConnectionManager<C>>,
}

impl<C: Connector> DdlToolHandler<C> {
    pub fn new(connection_manager: Arc<ConnectionManager<C>>) -> Self {
        Self { connection_manager }
    }

    async fn run(&self, database_name: Option<&str>, statement: &str) -> DbResult<()> {
        let handle = self.connection_manager.acquire(database_name).await?;
        handle.execute(statement, &[]).await?;
        Ok(())
    }

    /// Handle the create_table tool call.
    pub async fn create_table(&self, input: CreateTableInput) -> DbResult<DdlOutput> {
        let statement = build_create_table(&input.table_name, &input.columns)?;
        self.run(input.database_name.as_deref(), &statement).await?;
        info!(table = %input.table_name, "Created table");
        Ok(DdlOutput {
            message: format!("Table '{}' created successfully.", input.table_name),
            statement,
        })
    }

    /// Handle the create_index tool call.
    pub async fn create_index(&self, input: CreateIndexInput) -> DbResult<DdlOutput> {
        let statement = build_create_index(&input)?;
        self.run(input.database_name.as_deref(), &statement).await?;
        info!(index = %input.index_name, table = %input.table_name, "Created index");
        Ok(DdlOutput {
            message: format!(
                "Index [{}] created successfully on table [{}]",
                input.index_name, input.table_name
            ),
            statement,
        })
    }

    /// Handle the drop_table tool call.
    pub async fn drop_table(&self, input: DropTableInput) -> DbResult<DdlOutput> {
        let statement = build_drop_table(&input.table_name)?;
        self.run(input.database_name.as_deref(), &statement).await?;
        info!(table = %input.table_name, "Dropped table");
        Ok(DdlOutput {
            message: format!("Table '{}' dropped successfully.", input.table_name),
            statement,
        })
    }
}
