//! Integration tests for the per-database pool registry.

mod common;

use common::FakeConnector;
use mssql_mcp_server::db::{DatabaseHandle, DatabasePoolManager};
use mssql_mcp_server::error::DbError;
use std::time::Duration;

#[tokio::test]
async fn test_handle_is_reused_for_same_database() {
    let connector = FakeConnector::new();
    let pools = DatabasePoolManager::new(connector.clone());

    let first = pools.get_handle("ProdDB").await.unwrap();
    let second = pools.get_handle("ProdDB").await.unwrap();

    assert_eq!(connector.connects(), 1);
    assert_eq!(first.database, "ProdDB");
    assert_eq!(second.database, "ProdDB");
    assert_eq!(pools.pool_count().await, 1);
    assert!(pools.contains("ProdDB").await);
}

#[tokio::test]
async fn test_each_database_gets_its_own_pool() {
    let connector = FakeConnector::new();
    let pools = DatabasePoolManager::new(connector.clone());

    let prod = pools.get_handle("ProdDB").await.unwrap();
    let staging = pools.get_handle("StagingDB").await.unwrap();

    assert_eq!(prod.database, "ProdDB");
    assert_eq!(staging.database, "StagingDB");
    assert_eq!(connector.connects(), 2);
    assert_eq!(pools.pool_count().await, 2);
}

#[tokio::test]
async fn test_concurrent_first_requests_share_one_connection() {
    let connector = FakeConnector::new();
    connector.set_connect_delay(Duration::from_millis(50));
    let pools = DatabasePoolManager::new(connector.clone());

    let (a, b, c) = tokio::join!(
        pools.get_handle("ProdDB"),
        pools.get_handle("ProdDB"),
        pools.get_handle("ProdDB"),
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(connector.connects(), 1);
    assert_eq!(pools.pool_count().await, 1);
}

#[tokio::test]
async fn test_stale_handle_is_closed_and_recreated() {
    let connector = FakeConnector::new();
    let pools = DatabasePoolManager::new(connector.clone());

    let stale = pools.get_handle("ProdDB").await.unwrap();
    stale.disconnect();
    assert!(!stale.is_connected());

    let fresh = pools.get_handle("ProdDB").await.unwrap();

    assert!(fresh.is_connected());
    assert_eq!(connector.connects(), 2);
    assert_eq!(connector.closes(), 1);
    assert_eq!(pools.pool_count().await, 1);
}

#[tokio::test]
async fn test_close_error_on_stale_handle_is_ignored() {
    let connector = FakeConnector::new();
    connector.set_fail_close(true);
    let pools = DatabasePoolManager::new(connector.clone());

    pools.get_handle("ProdDB").await.unwrap().disconnect();

    let fresh = pools.get_handle("ProdDB").await;

    assert!(fresh.is_ok());
    assert_eq!(connector.closes(), 1);
    assert_eq!(connector.connects(), 2);
}

#[tokio::test]
async fn test_failed_connect_leaves_no_entry() {
    let connector = FakeConnector::new();
    connector.set_fail_connect(true);
    let pools = DatabasePoolManager::new(connector.clone());

    let err = pools.get_handle("ProdDB").await.unwrap_err();
    assert!(matches!(err, DbError::Connection { .. }));
    assert!(err.to_string().contains("Login failed for database 'ProdDB'"));
    assert!(!pools.contains("ProdDB").await);
    assert_eq!(pools.pool_count().await, 0);

    // The next request tries again from scratch
    connector.set_fail_connect(false);
    assert!(pools.get_handle("ProdDB").await.is_ok());
    assert_eq!(connector.connects(), 2);
    assert!(pools.contains("ProdDB").await);
}

#[tokio::test]
async fn test_failure_is_not_retried_within_one_request() {
    let connector = FakeConnector::new();
    connector.set_fail_connect(true);
    let pools = DatabasePoolManager::new(connector.clone());

    assert!(pools.get_handle("ProdDB").await.is_err());
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn test_close_all_empties_registry() {
    let connector = FakeConnector::new();
    let pools = DatabasePoolManager::new(connector.clone());

    let prod = pools.get_handle("ProdDB").await.unwrap();
    pools.get_handle("StagingDB").await.unwrap();

    pools.close_all().await;

    assert_eq!(connector.closes(), 2);
    assert_eq!(pools.pool_count().await, 0);
    assert!(!prod.is_connected());

    // A later request reconnects
    pools.get_handle("ProdDB").await.unwrap();
    assert_eq!(connector.connects(), 3);
}

#[tokio::test]
async fn test_close_all_swallows_close_errors() {
    let connector = FakeConnector::new();
    connector.set_fail_close(true);
    let pools = DatabasePoolManager::new(connector.clone());

    pools.get_handle("ProdDB").await.unwrap();
    pools.close_all().await;

    assert_eq!(pools.pool_count().await, 0);
}
