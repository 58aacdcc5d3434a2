//! Integration tests for the connection pool's leasing contract.

use db_doctor::DiagnosticPool;
use db_doctor::config::PoolSettings;
use db_doctor::error::ToolkitError;
use db_doctor::models::ConnectionConfig;
use std::time::Duration;

fn sqlite_config(dir: &tempfile::TempDir) -> ConnectionConfig {
    let path = dir.path().join("pool_test.db");
    ConnectionConfig::new(
        "pool-test",
        format!("sqlite://{}", path.display()),
        PoolSettings::default(),
    )
    .unwrap()
    .with_writable(true)
}

#[tokio::test]
async fn test_acquire_release_leaves_utilization_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let pool = DiagnosticPool::connect(&sqlite_config(&dir)).await.unwrap();

    let before = pool.utilization();
    let conn = pool.acquire().await.unwrap();
    assert_eq!(pool.utilization(), before + 1);
    conn.release();
    assert_eq!(pool.utilization(), before);

    // Error/early-return paths release through Drop as well.
    {
        let _conn = pool.acquire().await.unwrap();
    }
    assert_eq!(pool.utilization(), before);
}

#[tokio::test]
async fn test_exhausted_pool_times_out_with_pool_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sqlite_config(&dir);
    config.pool.max_connections = Some(2);
    config.pool.acquire_timeout_secs = Some(1);

    let pool = DiagnosticPool::connect(&config).await.unwrap();
    assert_eq!(pool.capacity(), 2);

    // Hold every slot.
    let _held1 = pool.acquire().await.unwrap();
    let _held2 = pool.acquire().await.unwrap();
    assert_eq!(pool.utilization(), 2);

    let start = std::time::Instant::now();
    let result = pool.acquire().await;
    assert!(matches!(result, Err(ToolkitError::PoolExhausted { .. })));
    // The acquire suspended until the configured timeout elapsed.
    assert!(start.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_slot_frees_after_release() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sqlite_config(&dir);
    config.pool.max_connections = Some(1);
    config.pool.acquire_timeout_secs = Some(5);

    let pool = DiagnosticPool::connect(&config).await.unwrap();

    let held = pool.acquire().await.unwrap();
    held.release();

    // The freed slot is immediately acquirable again.
    let conn = pool.acquire().await.unwrap();
    assert_eq!(pool.utilization(), 1);
    conn.release();
}

#[tokio::test]
async fn test_shutdown_rejects_acquisitions_with_pool_closed() {
    let dir = tempfile::tempdir().unwrap();
    let pool = DiagnosticPool::connect(&sqlite_config(&dir)).await.unwrap();

    pool.shutdown().await;
    assert!(pool.is_closed());
    assert!(matches!(pool.acquire().await, Err(ToolkitError::PoolClosed)));
}

#[tokio::test]
async fn test_concurrent_operations_across_distinct_connections() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sqlite_config(&dir);
    config.pool.max_connections = Some(4);
    let pool = DiagnosticPool::connect(&config).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let conn = pool.acquire().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            conn.release();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(pool.utilization(), 0);
}
