//! Failure scenario tests
//!
//! These tests verify that:
//! - Unreachable services are recorded as OFFLINE, every time
//! - Probe failures never stop a service's timer
//! - Storage failures degrade to empty reads and dropped writes

use std::time::Duration;

use chrono::Utc;
use statuswatch::Status;
use statuswatch::history::HistoryStore;
use statuswatch::monitor::Monitor;
use statuswatch::storage::StorageBackend;
use statuswatch::storage::sqlite::SqliteBackend;
use std::sync::Arc;

use crate::helpers::*;

#[tokio::test]
async fn test_unreachable_service_records_offline_every_tick() {
    let port = closed_port().await;
    let mut service = service_config("api", "core", &format!("http://127.0.0.1:{port}"));
    service.interval = 1;
    let config = memory_config(vec![service]);

    let mut monitor = Monitor::open(&config).await.unwrap();
    monitor.start().await;
    let id = monitor.find_service_id("api", "core").await.unwrap();

    let monitor_ref = &monitor;
    let two_checks = wait_until(Duration::from_secs(4), || async move {
        monitor_ref.get_history(id, 10).await.len() >= 2
    })
    .await;
    assert!(two_checks, "timer should keep running after failed checks");

    for entry in monitor.get_history(id, 10).await {
        assert_eq!(entry.status, Status::Offline);
        assert_eq!(entry.error.as_deref(), Some("Failed to connect to server."));
    }

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_record_check_for_unknown_service_is_dropped() {
    let monitor = Monitor::open(&memory_config(vec![])).await.unwrap();

    let written = monitor
        .record_check(999, Utc::now(), Status::Offline, None, None)
        .await;
    assert_eq!(written, None);
    assert_eq!(monitor.prune_history(999, 5).await, 0);

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_history_store_survives_closed_backend() {
    let backend = Arc::new(SqliteBackend::in_memory("").await.unwrap());
    let store = HistoryStore::new(backend.clone());
    backend.close().await.unwrap();

    assert_eq!(
        store.append(1, Utc::now(), Status::Operational, None, None).await,
        None
    );
    assert!(store.recent(1, 10).await.is_empty());
}

#[tokio::test]
async fn test_unwritable_database_path_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let bad_path = dir.path().join("missing-dir").join("status.db");
    let config = file_config(&bad_path, vec![service_config("a", "g", "https://a.example")]);

    assert!(Monitor::open(&config).await.is_err());
}
