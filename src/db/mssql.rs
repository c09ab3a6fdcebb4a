//! SQL Server backend using `tiberius` over a `bb8` connection pool.

use crate::config::{DatabaseSettings, SettingsSource};
use crate::db::pool::{Connector, DatabaseHandle};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnMetadata, QueryResult, SqlParam};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bb8::Pool;
use bb8_tiberius::ConnectionManager as TdsConnectionManager;
use serde_json::{Map, Value as JsonValue};
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tiberius::{AuthMethod, ColumnData, Config, EncryptionLevel, FromSql, Row, ToSql};
use tracing::{debug, info};

const MAX_POOL_SIZE: u32 = 10;

/// Per-database connection parameters derived from the process-wide settings.
#[derive(Clone)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: Option<String>,
    /// Sensitive - not logged.
    pub password: Option<String>,
    pub trust_server_certificate: bool,
    /// Always false: only the login exchange is encrypted.
    pub encrypt: bool,
    pub connection_timeout: Duration,
}

impl ConnectionOptions {
    /// Build the options for connecting to `database`.
    pub fn for_database(settings: &DatabaseSettings, database: &str) -> Self {
        Self {
            host: settings.server_name().to_string(),
            port: settings.server_port(),
            database: database.to_string(),
            user: settings
                .user
                .as_deref()
                .filter(|u| !u.is_empty())
                .map(String::from),
            password: settings.password.clone(),
            trust_server_certificate: settings.trust_server_certificate(),
            encrypt: false,
            connection_timeout: settings.connection_timeout(),
        }
    }

    /// Connection timeout in milliseconds.
    pub fn connection_timeout_ms(&self) -> u64 {
        self.connection_timeout.as_millis() as u64
    }

    /// Translate into a tiberius configuration.
    pub fn to_tiberius_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.host);
        config.port(self.port);
        config.database(&self.database);
        if let Some(user) = &self.user {
            config.authentication(AuthMethod::sql_server(
                user,
                self.password.as_deref().unwrap_or_default(),
            ));
        }
        if self.trust_server_certificate {
            config.trust_cert();
        }
        config.encryption(if self.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });
        config
    }
}

impl std::fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .field("encrypt", &self.encrypt)
            .field("connection_timeout", &self.connection_timeout)
            .finish_non_exhaustive()
    }
}

/// Connects to SQL Server with settings read at connect time.
#[derive(Clone)]
pub struct MssqlConnector {
    settings: Arc<dyn SettingsSource>,
}

impl MssqlConnector {
    pub fn new(settings: Arc<dyn SettingsSource>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for MssqlConnector {
    type Handle = MssqlHandle;

    async fn connect(&self, database: &str) -> DbResult<MssqlHandle> {
        let options = ConnectionOptions::for_database(&self.settings.load(), database);
        MssqlHandle::connect(&options).await
    }
}

/// A pooled SQL Server connection bound to one database.
#[derive(Clone)]
pub struct MssqlHandle {
    pool: Pool<TdsConnectionManager>,
    database: Arc<str>,
    closed: Arc<AtomicBool>,
}

impl MssqlHandle {
    /// Establish the pool and verify it with a test query.
    pub async fn connect(options: &ConnectionOptions) -> DbResult<Self> {
        info!(
            host = %options.host,
            port = options.port,
            database = %options.database,
            "Connecting to SQL Server"
        );

        let timeout = options.connection_timeout;
        let manager = TdsConnectionManager::new(options.to_tiberius_config());

        let connect = async {
            let pool = Pool::builder()
                .max_size(MAX_POOL_SIZE)
                .min_idle(Some(1))
                .connection_timeout(timeout)
                .build(manager)
                .await?;

            {
                let mut conn = pool.get().await?;
                conn.simple_query("SELECT 1").await?.into_results().await?;
            }

            Ok::<_, DbError>(pool)
        };

        let pool = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| DbError::timeout("connect", timeout.as_secs()))??;

        debug!(database = %options.database, "SQL Server connection verified");

        Ok(Self {
            pool,
            database: Arc::from(options.database.as_str()),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

#[async_trait]
impl DatabaseHandle for MssqlHandle {
    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.pool.state().connections > 0
    }

    async fn close(&self) -> DbResult<()> {
        // bb8 releases connections once the last pool clone is dropped
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[SqlParam]) -> DbResult<QueryResult> {
        let start = Instant::now();
        let mut conn = self.pool.get().await?;

        let bound: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let rows = conn.query(sql, &bound).await?.into_first_result().await?;

        let columns = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|c| {
                        ColumnMetadata::new(
                            c.name(),
                            format!("{:?}", c.column_type()).to_lowercase(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        let rows = rows.into_iter().map(row_to_json).collect();

        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        let mut conn = self.pool.get().await?;
        let bound: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let result = conn.execute(sql, &bound).await?;
        Ok(result.rows_affected().iter().sum())
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            SqlParam::Null => ColumnData::String(None),
            SqlParam::Bool(b) => ColumnData::Bit(Some(*b)),
            SqlParam::Int(i) => ColumnData::I64(Some(*i)),
            SqlParam::Float(f) => ColumnData::F64(Some(*f)),
            SqlParam::String(s) => ColumnData::String(Some(Cow::Borrowed(s.as_str()))),
        }
    }
}

/// Convert a result row into a JSON object keyed by column name.
fn row_to_json(row: Row) -> Map<String, JsonValue> {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    names
        .into_iter()
        .zip(row)
        .map(|(name, data)| (name, cell_to_json(&data)))
        .collect()
}

/// Convert a single cell to JSON.
///
/// Decimals are rendered as strings to keep their precision, binary as base64
/// and temporal values as ISO 8601 text.
fn cell_to_json(data: &ColumnData<'static>) -> JsonValue {
    let value = match data {
        ColumnData::U8(v) => v.map(JsonValue::from),
        ColumnData::I16(v) => v.map(JsonValue::from),
        ColumnData::I32(v) => v.map(JsonValue::from),
        ColumnData::I64(v) => v.map(JsonValue::from),
        ColumnData::F32(v) => v.map(|f| JsonValue::from(f as f64)),
        ColumnData::F64(v) => v.map(JsonValue::from),
        ColumnData::Bit(v) => v.map(JsonValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| JsonValue::String(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| JsonValue::String(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| JsonValue::String(STANDARD.encode(b))),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| JsonValue::String(x.clone().into_owned().into_string())),
        ColumnData::Numeric(_) => from_cell::<rust_decimal::Decimal>(data)
            .map(|d| JsonValue::String(d.to_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            from_cell::<chrono::NaiveDateTime>(data).map(|dt| {
                JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
            })
        }
        ColumnData::Date(_) => from_cell::<chrono::NaiveDate>(data)
            .map(|d| JsonValue::String(d.format("%Y-%m-%d").to_string())),
        ColumnData::Time(_) => from_cell::<chrono::NaiveTime>(data)
            .map(|t| JsonValue::String(t.format("%H:%M:%S%.f").to_string())),
        ColumnData::DateTimeOffset(_) => {
            from_cell::<chrono::DateTime<chrono::FixedOffset>>(data)
                .map(|dt| JsonValue::String(dt.to_rfc3339()))
        }
    };
    value.unwrap_or(JsonValue::Null)
}

fn from_cell<'a, T: FromSql<'a>>(data: &'a ColumnData<'static>) -> Option<T> {
    T::from_sql(data).ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> DatabaseSettings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DatabaseSettings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_options_defaults() {
        let options = ConnectionOptions::for_database(&DatabaseSettings::default(), "ProdDB");
        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 1433);
        assert_eq!(options.database, "ProdDB");
        assert!(options.user.is_none());
        assert!(options.trust_server_certificate);
        assert!(!options.encrypt);
        assert_eq!(options.connection_timeout_ms(), 30_000);
    }

    #[test]
    fn test_options_from_settings() {
        let s = settings(&[
            ("SERVER_NAME", "sql.example.com"),
            ("SERVER_PORT", "14330"),
            ("DB_USER", "reader"),
            ("DB_PASSWORD", "hunter2"),
            ("TRUST_SERVER_CERTIFICATE", "false"),
            ("CONNECTION_TIMEOUT", "5"),
        ]);
        let options = ConnectionOptions::for_database(&s, "StagingDB");
        assert_eq!(options.host, "sql.example.com");
        assert_eq!(options.port, 14330);
        assert_eq!(options.database, "StagingDB");
        assert_eq!(options.user.as_deref(), Some("reader"));
        assert_eq!(options.password.as_deref(), Some("hunter2"));
        assert!(!options.trust_server_certificate);
        assert_eq!(options.connection_timeout_ms(), 5_000);
    }

    #[test]
    fn test_options_unparsable_timeout_falls_back() {
        let s = settings(&[("CONNECTION_TIMEOUT", "thirty")]);
        let options = ConnectionOptions::for_database(&s, "ProdDB");
        assert_eq!(options.connection_timeout_ms(), 30_000);
    }

    #[test]
    fn test_options_debug_hides_password() {
        let s = settings(&[("DB_USER", "reader"), ("DB_PASSWORD", "hunter2")]);
        let debug = format!("{:?}", ConnectionOptions::for_database(&s, "ProdDB"));
        assert!(debug.contains("reader"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_sql_param_to_sql() {
        assert!(matches!(SqlParam::Null.to_sql(), ColumnData::String(None)));
        assert!(matches!(
            SqlParam::Bool(true).to_sql(),
            ColumnData::Bit(Some(true))
        ));
        assert!(matches!(SqlParam::Int(7).to_sql(), ColumnData::I64(Some(7))));
        let s = SqlParam::String("Alice".to_string());
        match s.to_sql() {
            ColumnData::String(Some(v)) => assert_eq!(v, "Alice"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cell_to_json_scalars() {
        assert_eq!(cell_to_json(&ColumnData::I32(Some(5))), serde_json::json!(5));
        assert_eq!(cell_to_json(&ColumnData::I32(None)), JsonValue::Null);
        assert_eq!(
            cell_to_json(&ColumnData::Bit(Some(false))),
            JsonValue::Bool(false)
        );
        assert_eq!(
            cell_to_json(&ColumnData::String(Some(Cow::Owned("hi".to_string())))),
            serde_json::json!("hi")
        );
    }

    #[test]
    fn test_cell_to_json_binary_is_base64() {
        let data = ColumnData::Binary(Some(Cow::Owned(vec![0xde, 0xad, 0xbe, 0xef])));
        assert_eq!(cell_to_json(&data), serde_json::json!("3q2+7w=="));
    }
}
