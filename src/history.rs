//! History store
//!
//! Append-only per-service time series with a retention cap. Write failures
//! are logged and the observation is dropped; read failures are logged and
//! reported as an empty history. Neither ever reaches the scheduler.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, instrument, trace};

use crate::storage::{HistoryEntry, NewHistoryEntry, ServiceId, Status, StorageBackend};

#[derive(Clone)]
pub struct HistoryStore {
    backend: Arc<dyn StorageBackend>,
}

impl HistoryStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Write one entry
    ///
    /// Returns the id of the new row, or `None` if the write failed and the
    /// entry was dropped.
    #[instrument(skip(self, error, possible_cause))]
    pub async fn append(
        &self,
        service_id: ServiceId,
        timestamp: DateTime<Utc>,
        status: Status,
        error: Option<String>,
        possible_cause: Option<String>,
    ) -> Option<i64> {
        let entry = NewHistoryEntry {
            service_id,
            timestamp,
            status,
            error,
            possible_cause,
        };

        match self.backend.insert_history(entry).await {
            Ok(id) => {
                trace!("stored history entry {id}");
                Some(id)
            }
            Err(e) => {
                error!("dropping history entry for service {service_id}: {e}");
                None
            }
        }
    }

    /// The `limit` most recent entries, newest first
    pub async fn recent(&self, service_id: ServiceId, limit: usize) -> Vec<HistoryEntry> {
        self.backend
            .latest_history(service_id, limit)
            .await
            .unwrap_or_else(|e| {
                error!("failed to read history for service {service_id}: {e}");
                Vec::new()
            })
    }

    /// Delete all but the `cap` most recent entries
    ///
    /// Returns the number of deleted rows (zero on failure).
    pub async fn retain(&self, service_id: ServiceId, cap: usize) -> usize {
        match self.backend.retain_history(service_id, cap).await {
            Ok(deleted) => deleted,
            Err(e) => {
                error!("cleanup failed for service with id: {service_id}");
                trace!("cleanup failed because of a storage error: {e}");
                0
            }
        }
    }
}
