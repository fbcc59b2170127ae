//! Concurrency tests
//!
//! These tests verify thread-safety and concurrent operation:
//! - Many service timers writing through one storage handle
//! - Concurrent writes and reads from external callers
//! - Checks of one service never overlapping

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use statuswatch::checker::{CheckOutcome, CheckRunner, ProbeOutcome, classify};
use statuswatch::{Monitor, Status};
use tempfile::tempdir;

use crate::helpers::*;

/// Runner that records the highest number of simultaneous checks
struct OverlapRunner {
    delay: Duration,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

#[async_trait]
impl CheckRunner for OverlapRunner {
    async fn check(&self, _endpoint: &Url) -> CheckOutcome {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        classify(ProbeOutcome::Reachable)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_services_share_one_database() {
    let temp_dir = tempdir().unwrap();
    let services = (0..10)
        .map(|i| {
            let mut service =
                service_config(&format!("svc-{i}"), "load", &format!("https://svc-{i}.example"));
            service.interval = 1;
            service
        })
        .collect();
    let mut config = file_config(&temp_dir.path().join("load.db"), services);
    config.history.retention = 3;

    let runner = FixedRunner::new(ProbeOutcome::Reachable);
    let mut monitor = Monitor::open_with_runner(&config, runner.clone())
        .await
        .unwrap();
    assert_eq!(monitor.start().await, 10);

    tokio::time::sleep(Duration::from_millis(4500)).await;

    let ids: Vec<i64> = monitor.list_services().await.iter().map(|s| s.id).collect();
    for id in &ids {
        let history = monitor.get_history(*id, 100).await;
        assert!(!history.is_empty());
        assert!(history.len() <= 3, "retention cap exceeded: {}", history.len());
    }
    assert!(runner.calls() >= 40);

    monitor.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_record_check_calls() {
    let temp_dir = tempdir().unwrap();
    let config = file_config(
        &temp_dir.path().join("writes.db"),
        vec![service_config("api", "core", "https://api.example")],
    );
    let monitor = Arc::new(
        Monitor::open_with_runner(&config, FixedRunner::new(ProbeOutcome::Reachable))
            .await
            .unwrap(),
    );
    let id = monitor.find_service_id("api", "core").await.unwrap();

    let mut tasks = vec![];
    for _ in 0..50 {
        let monitor = monitor.clone();
        tasks.push(tokio::spawn(async move {
            monitor
                .record_check(id, Utc::now(), Status::Operational, None, None)
                .await
        }));
    }
    for _ in 0..10 {
        let monitor = monitor.clone();
        tasks.push(tokio::spawn(async move {
            monitor.get_history(id, 5).await;
            None
        }));
    }

    let mut written = 0;
    for task in tasks {
        if task.await.unwrap().is_some() {
            written += 1;
        }
    }
    assert_eq!(written, 50);
    assert_eq!(monitor.get_history(id, 100).await.len(), 50);

    let ids: Vec<i64> = monitor
        .get_history(id, 100)
        .await
        .iter()
        .map(|e| e.id)
        .collect();
    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 50);

    match Arc::try_unwrap(monitor) {
        Ok(monitor) => monitor.shutdown().await.unwrap(),
        Err(_) => panic!("monitor still shared"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_checks_of_one_service_never_overlap() {
    let mut service = service_config("slow", "core", "https://slow.example");
    service.interval = 1;
    let runner = Arc::new(OverlapRunner {
        delay: Duration::from_millis(2500),
        running: AtomicUsize::new(0),
        max_running: AtomicUsize::new(0),
    });

    let mut monitor = Monitor::open_with_runner(&memory_config(vec![service]), runner.clone())
        .await
        .unwrap();
    monitor.start().await;

    let id = monitor.find_service_id("slow", "core").await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    // The timer's own check is in flight, so a manual one is refused.
    let manual = monitor
        .scheduler()
        .handle(id)
        .unwrap()
        .check_now()
        .await
        .unwrap();
    assert!(manual.is_none());

    tokio::time::sleep(Duration::from_millis(3000)).await;
    monitor.shutdown().await.unwrap();

    assert_eq!(runner.max_running.load(Ordering::SeqCst), 1);
}
