//! Per-database connection registry.
//!
//! Keeps at most one live [`DatabaseHandle`] per database name and recreates it
//! when it stops answering its liveness check.
//!
//! # Design Decisions
//!
//! - **`OnceCell` per database key**: Single-flight creation, so concurrent first
//!   requests for the same database share one connection attempt instead of
//!   racing and leaving orphan connections behind
//! - **Identity-checked removal**: A stale entry is only removed if the map still
//!   holds the exact cell that was observed as stale (`Arc::ptr_eq`); a cell that
//!   was already replaced by another task is left alone
//! - **Best-effort close**: Closing a stale handle may fail (the connection is
//!   usually already gone); the error is logged at debug level and dropped
//!
//! # Concurrency Safety
//!
//! - The map lock is never held across connection establishment or close
//! - Lock acquisition order is consistent: read lock first, write lock only to
//!   insert or remove a cell
//! - A cell whose initialisation failed is removed, so a failed connect leaves
//!   nothing behind in the registry

use crate::error::{DbError, DbResult};
use crate::models::{QueryResult, SqlParam};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{OnceCell, RwLock as TokioRwLock};
use tracing::{debug, info, warn};

/// Upper bound on stale-entry recreation within a single `get_handle` call.
pub const MAX_ACQUIRE_ATTEMPTS: usize = 3;

/// A live, cloneable query-execution handle bound to one database.
///
/// Clones share the same underlying connection pool.
#[async_trait]
pub trait DatabaseHandle: Clone + Send + Sync + 'static {
    /// Whether the handle can still serve queries.
    fn is_connected(&self) -> bool;

    /// Release the underlying connections.
    async fn close(&self) -> DbResult<()>;

    /// Run a statement that returns rows. Parameters bind to `@P1`, `@P2`, ...
    async fn query(&self, sql: &str, params: &[SqlParam]) -> DbResult<QueryResult>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64>;
}

/// Establishes handles for a database name.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Handle: DatabaseHandle;

    /// Build the per-database configuration and connect.
    async fn connect(&self, database: &str) -> DbResult<Self::Handle>;
}

/// Registry entry for one database.
pub struct PoolEntry<H> {
    pub handle: H,
    pub created_at: Instant,
}

impl<H> std::fmt::Debug for PoolEntry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolEntry")
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

type PoolCell<H> = Arc<OnceCell<PoolEntry<H>>>;

/// Manages one connection pool per database name.
///
/// Names handed to this manager must already be approved by the
/// [`DatabaseResolver`](super::DatabaseResolver); no re-validation happens here.
pub struct DatabasePoolManager<C: Connector> {
    connector: C,
    /// Per-database lazy pools. OnceCell ensures single-flight creation.
    pools: TokioRwLock<HashMap<String, PoolCell<C::Handle>>>,
}

impl<C: Connector> DatabasePoolManager<C> {
    /// Create an empty manager.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            pools: TokioRwLock::new(HashMap::new()),
        }
    }

    /// Access the connector (mostly for tests).
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Get a live handle for `database`, creating or recreating the pool if needed.
    ///
    /// A handle that fails its liveness check is closed, discarded and replaced.
    /// Connection failures propagate unchanged; nothing is retried at this layer.
    pub async fn get_handle(&self, database: &str) -> DbResult<C::Handle> {
        for attempt in 1..=MAX_ACQUIRE_ATTEMPTS {
            let cell = self.cell_for(database).await;

            let created = AtomicBool::new(false);
            let init = cell
                .get_or_try_init(|| async {
                    debug!(database = %database, "Creating new database pool");
                    let handle = self.connector.connect(database).await?;
                    created.store(true, Ordering::Release);
                    Ok::<_, DbError>(PoolEntry {
                        handle,
                        created_at: Instant::now(),
                    })
                })
                .await;

            let entry = match init {
                Ok(entry) => entry,
                Err(e) => {
                    self.remove_if_current(database, &cell, |current| !current.initialized())
                        .await;
                    warn!(database = %database, error = %e, "Failed to create database pool");
                    return Err(e);
                }
            };

            // A freshly created handle was just verified by the connector
            if created.load(Ordering::Acquire) || entry.handle.is_connected() {
                debug!(database = %database, "Returning database pool");
                return Ok(entry.handle.clone());
            }

            debug!(
                database = %database,
                attempt = attempt,
                "Database pool is no longer connected, recreating"
            );
            self.discard(database, &cell).await;
        }

        Err(DbError::connection(
            format!(
                "Could not obtain a live connection to '{}' after {} attempts",
                database, MAX_ACQUIRE_ATTEMPTS
            ),
            "Check that SQL Server is reachable and accepting connections",
        ))
    }

    /// Get the number of pools (initialized OnceCells).
    pub async fn pool_count(&self) -> usize {
        let pools = self.pools.read().await;
        pools.values().filter(|cell| cell.initialized()).count()
    }

    /// Whether an initialized pool exists for `database`.
    pub async fn contains(&self, database: &str) -> bool {
        let pools = self.pools.read().await;
        pools.get(database).is_some_and(|cell| cell.initialized())
    }

    /// Close all pools and empty the registry.
    pub async fn close_all(&self) {
        // Drain pools under lock, close outside lock
        let pools_to_close: Vec<_> = {
            let mut pools = self.pools.write().await;
            pools.drain().collect()
        };

        for (database, cell) in pools_to_close {
            if let Some(entry) = cell.get() {
                info!(database = %database, "Closing database pool");
                if let Err(e) = entry.handle.close().await {
                    debug!(database = %database, error = %e, "Error while closing database pool");
                }
            }
        }
    }

    /// Get or insert the OnceCell for `database`.
    async fn cell_for(&self, database: &str) -> PoolCell<C::Handle> {
        {
            let pools = self.pools.read().await;
            if let Some(cell) = pools.get(database) {
                return Arc::clone(cell);
            }
        }

        let mut pools = self.pools.write().await;
        // Double-check after acquiring write lock
        Arc::clone(
            pools
                .entry(database.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Remove `cell` from the registry if it is still the current one for
    /// `database` and `predicate` holds. Returns whether it was removed.
    async fn remove_if_current<F>(
        &self,
        database: &str,
        cell: &PoolCell<C::Handle>,
        predicate: F,
    ) -> bool
    where
        F: FnOnce(&PoolCell<C::Handle>) -> bool,
    {
        let mut pools = self.pools.write().await;
        match pools.get(database) {
            Some(current) if Arc::ptr_eq(current, cell) && predicate(current) => {
                pools.remove(database);
                true
            }
            _ => false,
        }
    }

    /// Drop a stale entry and close its handle, swallowing close errors.
    async fn discard(&self, database: &str, cell: &PoolCell<C::Handle>) {
        if !self.remove_if_current(database, cell, |_| true).await {
            // Another task already replaced it
            return;
        }

        if let Some(entry) = cell.get() {
            if let Err(e) = entry.handle.close().await {
                debug!(
                    database = %database,
                    error = %e,
                    "Ignoring error while closing stale database pool"
                );
            }
        }
    }
}

impl<C: Connector> std::fmt::Debug for DatabasePoolManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabasePoolManager").finish_non_exhaustive()
    }
}
