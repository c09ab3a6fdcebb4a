//! MCP tool implementations.
//!
//! This module contains all database tool handlers:
//! - `read_data`: Execute validated SELECT queries
//! - `list_table`: List base tables, optionally filtered by schema
//! - `describe_table`: Get column names and types for a table
//! - `insert_data` / `update_data`: Parameterized data modification
//! - `create_table` / `create_index` / `drop_table`: Schema modification
//! - `sql_validator`: Read-only query validation
//! - `identifier`: Identifier checks for generated statements

pub mod ddl;
pub mod identifier;
pub mod read;
pub mod schema;
pub mod sql_validator;
pub mod write;

pub use ddl::{CreateIndexInput, CreateTableInput, DdlOutput, DdlToolHandler, DropTableInput};
pub use read::{ReadDataInput, ReadDataOutput, ReadDataToolHandler};
pub use schema::{
    DescribeTableInput, DescribeTableOutput, ListTableInput, ListTableOutput, SchemaToolHandler,
};
pub use sql_validator::{QueryRejection, validate_read_query, validate_read_query_value};
pub use write::{
    InsertDataInput, InsertDataOutput, UpdateDataInput, UpdateDataOutput, WriteToolHandler,
};
