//! Shared test doubles: an in-memory connector that records what it is asked
//! to do, so pool and tool behavior can be checked without a SQL Server.

#![allow(dead_code)]

use async_trait::async_trait;
use mssql_mcp_server::config::DatabaseSettings;
use mssql_mcp_server::db::{ConnectionManager, Connector, DatabaseHandle};
use mssql_mcp_server::error::{DbError, DbResult};
use mssql_mcp_server::models::{QueryResult, SqlParam};
use serde_json::{Map, Value as JsonValue};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded call against a fake handle.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub database: String,
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// State shared between a [`FakeConnector`] and every handle it creates.
#[derive(Default)]
pub struct FakeState {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_close: AtomicBool,
    pub connect_delay_ms: AtomicUsize,
    pub calls: Mutex<Vec<RecordedCall>>,
    pub rows: Mutex<Vec<Map<String, JsonValue>>>,
    /// Server error (number, message) returned by every query and execute
    pub query_error: Mutex<Option<(u32, String)>>,
    pub rows_affected: AtomicUsize,
}

#[derive(Clone)]
pub struct FakeConnector {
    pub state: Arc<FakeState>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeState::default()),
        }
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.state
            .connect_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn set_rows(&self, rows: Vec<Map<String, JsonValue>>) {
        *self.state.rows.lock().unwrap() = rows;
    }

    pub fn set_query_error(&self, code: u32, message: &str) {
        *self.state.query_error.lock().unwrap() = Some((code, message.to_string()));
    }

    pub fn set_rows_affected(&self, n: usize) {
        self.state.rows_affected.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Handle = FakeHandle;

    async fn connect(&self, database: &str) -> DbResult<FakeHandle> {
        let delay = self.state.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(DbError::connection(
                format!("Login failed for database '{}'", database),
                "Check credentials",
            ));
        }
        Ok(FakeHandle {
            database: database.to_string(),
            connected: Arc::new(AtomicBool::new(true)),
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Clone)]
pub struct FakeHandle {
    pub database: String,
    pub connected: Arc<AtomicBool>,
    state: Arc<FakeState>,
}

impl std::fmt::Debug for FakeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeHandle")
            .field("database", &self.database)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl FakeHandle {
    /// Make the liveness check fail from now on.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn record(&self, sql: &str, params: &[SqlParam]) {
        self.state.calls.lock().unwrap().push(RecordedCall {
            database: self.database.clone(),
            sql: sql.to_string(),
            params: params.to_vec(),
        });
    }
}

#[async_trait]
impl DatabaseHandle for FakeHandle {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> DbResult<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(DbError::connection("Connection is closed", "Reconnect"));
        }
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[SqlParam]) -> DbResult<QueryResult> {
        self.record(sql, params);
        if let Some((code, message)) = self.state.query_error.lock().unwrap().clone() {
            return Err(DbError::database(message, Some(code), "Check the statement"));
        }
        Ok(QueryResult {
            columns: Vec::new(),
            rows: self.state.rows.lock().unwrap().clone(),
            execution_time_ms: 1,
        })
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        self.record(sql, params);
        if let Some((code, message)) = self.state.query_error.lock().unwrap().clone() {
            return Err(DbError::database(message, Some(code), "Check the statement"));
        }
        Ok(self.state.rows_affected.load(Ordering::SeqCst) as u64)
    }
}

/// Settings with an optional allow-list and default database.
pub fn settings(databases: Option<&str>, default: Option<&str>) -> DatabaseSettings {
    DatabaseSettings {
        databases: databases.map(String::from),
        database_name: default.map(String::from),
        ..Default::default()
    }
}

/// A connection manager over a fake connector, plus the connector for inspection.
pub fn fake_manager(
    databases: Option<&str>,
    default: Option<&str>,
) -> (Arc<ConnectionManager<FakeConnector>>, FakeConnector) {
    let connector = FakeConnector::new();
    let manager = ConnectionManager::new(Arc::new(settings(databases, default)), connector.clone());
    (Arc::new(manager), connector)
}

/// Build a JSON row from key/value pairs.
pub fn row(pairs: &[(&str, JsonValue)]) -> Map<String, JsonValue> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
