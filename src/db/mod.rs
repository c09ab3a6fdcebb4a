//! Database access layer.
//!
//! This module provides database access functionality:
//! - Database name resolution against the allow-list
//! - Per-database connection pool management
//! - The SQL Server backend

pub mod manager;
pub mod mssql;
pub mod pool;
pub mod resolver;

pub use manager::ConnectionManager;
pub use mssql::{ConnectionOptions, MssqlConnector, MssqlHandle};
pub use pool::{Connector, DatabaseHandle, DatabasePoolManager, MAX_ACQUIRE_ATTEMPTS, PoolEntry};
pub use resolver::{DatabaseResolver, ResolveError, allowed_databases, resolve_database_name};
