//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait. The registry and the
//! history store are written against it, never against a concrete engine.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::{HistoryEntry, NewHistoryEntry, Service, ServiceId};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Fields of a service row that is about to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewService {
    pub name: String,
    pub group: String,
    pub endpoint: String,
    pub hidden: bool,
}

/// Trait for persistent storage backends
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: every service actor writes through
/// the same backend concurrently. Implementations are responsible for
/// serializing writes if their engine needs it.
///
/// ## Ordering
///
/// Whenever history is ordered, it is by `timestamp` descending with ties
/// broken by `id` descending. `latest_history` and `retain_history` must use
/// the same ordering so that retention never keeps a row older than one it
/// deletes.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Every persisted service, in no particular order
    async fn list_services(&self) -> StorageResult<Vec<Service>>;

    /// Look up a service by its business key
    ///
    /// Returns `StorageError::NotFound` if no such service exists.
    async fn find_service_id(&self, name: &str, group: &str) -> StorageResult<ServiceId>;

    /// Insert a new service and return its assigned id
    async fn insert_service(&self, service: NewService) -> StorageResult<ServiceId>;

    /// Delete a service; its history is removed by cascade
    ///
    /// Returns whether a row was deleted.
    async fn delete_service(&self, id: ServiceId) -> StorageResult<bool>;

    /// Delete every service (and therefore all history)
    ///
    /// Returns the number of services deleted.
    async fn delete_all_services(&self) -> StorageResult<usize>;

    /// Append one history row and return its id
    async fn insert_history(&self, entry: NewHistoryEntry) -> StorageResult<i64>;

    /// The `limit` newest rows for a service, newest first
    async fn latest_history(
        &self,
        service_id: ServiceId,
        limit: usize,
    ) -> StorageResult<Vec<HistoryEntry>>;

    /// Delete all but the `cap` newest rows for a service
    ///
    /// Returns the number of rows deleted.
    async fn retain_history(&self, service_id: ServiceId, cap: usize) -> StorageResult<usize>;

    /// Number of history rows stored for a service
    async fn count_history(&self, service_id: ServiceId) -> StorageResult<usize>;

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend is operational.
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
