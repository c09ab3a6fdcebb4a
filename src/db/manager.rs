//! Entry point combining name resolution and pool management.

use crate::config::{EnvSettings, SettingsSource};
use crate::db::mssql::MssqlConnector;
use crate::db::pool::{Connector, DatabasePoolManager};
use crate::db::resolver::{DatabaseResolver, ResolveError};
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Hands out live handles for caller-specified or default databases.
///
/// Every name is checked against the allow-list before a pool is touched.
pub struct ConnectionManager<C: Connector = MssqlConnector> {
    resolver: DatabaseResolver,
    pools: DatabasePoolManager<C>,
}

impl ConnectionManager<MssqlConnector> {
    /// Connection manager for SQL Server, reading settings from the process environment.
    pub fn from_env() -> Self {
        let settings: Arc<dyn SettingsSource> = Arc::new(EnvSettings);
        Self::new(Arc::clone(&settings), MssqlConnector::new(settings))
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a connection manager from a settings source and a connector.
    pub fn new(settings: Arc<dyn SettingsSource>, connector: C) -> Self {
        Self {
            resolver: DatabaseResolver::new(settings),
            pools: DatabasePoolManager::new(connector),
        }
    }

    pub fn resolver(&self) -> &DatabaseResolver {
        &self.resolver
    }

    pub fn pools(&self) -> &DatabasePoolManager<C> {
        &self.pools
    }

    /// Resolve a requested database name, mapping failures to [`DbError::InvalidDatabase`].
    pub fn resolve(&self, requested: Option<&str>) -> DbResult<String> {
        self.resolver.resolve(requested).map_err(|e| {
            let allowed = self.resolver.allowed_databases();
            match &e {
                ResolveError::NotAllowed { database } => {
                    warn!(database = %database, "Rejected database outside allow-list");
                }
                ResolveError::NoNameAvailable => {
                    debug!("No database requested and no default configured");
                }
            }
            DbError::invalid_database(&allowed)
        })
    }

    /// Get a live handle for the requested database, or the default one.
    pub async fn acquire(&self, requested: Option<&str>) -> DbResult<C::Handle> {
        let database = self.resolve(requested)?;
        self.pools.get_handle(&database).await
    }

    /// Close every pool.
    pub async fn close_all(&self) {
        self.pools.close_all().await;
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("resolver", &self.resolver)
            .field("pools", &self.pools)
            .finish()
    }
}
