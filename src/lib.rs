//! MSSQL MCP Server Library
//!
//! MCP (Model Context Protocol) tools that let AI assistants query and manage
//! a Microsoft SQL Server database. Read queries pass through a pattern-based
//! safety validator, caller-supplied database names are checked against an
//! allow-list, and one connection pool is kept per database.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::DbService;
