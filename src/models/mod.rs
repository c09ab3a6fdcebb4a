//! Data models for the MSSQL MCP Server.
//!
//! This module re-exports all model types used throughout the application.

pub mod query;
pub mod schema;

// Re-export commonly used types
pub use query::{ColumnMetadata, MAX_ROW_LIMIT, QueryResult, SqlParam};
pub use schema::{ColumnDefinition, TableColumn};
