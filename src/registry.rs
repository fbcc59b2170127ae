//! Service registry
//!
//! Owns the canonical list of monitored services and keeps the persisted rows
//! in step with the configured ones.
//!
//! ## Reconciliation
//!
//! Services are compared by `(name, group, endpoint)`. A persisted service whose
//! triple no longer appears in the configuration is deleted, together with its
//! history. A configured service whose `(name, group)` is already persisted is
//! left alone. Everything else is inserted. Running the same reconciliation
//! twice writes nothing the second time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::config::{DEFAULT_INTERVAL, ServiceKey, ServiceSpec};
use crate::storage::{NewService, Service, ServiceId, StorageBackend, StorageError, StorageResult};

/// What a reconciliation pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed: usize,
    pub inserted: usize,
    pub unchanged: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.removed == 0 && self.inserted == 0
    }
}

#[derive(Clone)]
pub struct ServiceRegistry {
    backend: Arc<dyn StorageBackend>,
}

impl ServiceRegistry {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Make the persisted services match `desired`
    ///
    /// Storage errors are returned to the caller; the monitor cannot start on
    /// a registry it failed to reconcile.
    #[instrument(skip_all, fields(desired = desired.len()))]
    pub async fn reconcile(&self, desired: &[ServiceSpec]) -> StorageResult<ReconcileReport> {
        if desired.is_empty() {
            warn!("no services configured, the service table will be emptied");
            let removed = self.backend.delete_all_services().await?;
            return Ok(ReconcileReport {
                removed,
                ..ReconcileReport::default()
            });
        }

        info!("reconciling services");

        let wanted: HashSet<ServiceKey> = desired.iter().map(ServiceSpec::key).collect();
        let mut report = ReconcileReport::default();

        let mut present = HashSet::new();
        for service in self.backend.list_services().await? {
            if wanted.contains(&ServiceKey::from(&service)) {
                present.insert((service.name, service.group));
                continue;
            }

            debug!(
                "removing obsolete service {}/{} ({})",
                service.group, service.name, service.endpoint
            );
            if self.backend.delete_service(service.id).await? {
                report.removed += 1;
            }
        }

        for spec in desired {
            if !present.insert((spec.name.clone(), spec.group.clone())) {
                report.unchanged += 1;
                continue;
            }

            debug!("registering service {}/{}", spec.group, spec.name);
            self.backend
                .insert_service(NewService {
                    name: spec.name.clone(),
                    group: spec.group.clone(),
                    endpoint: spec.endpoint.as_str().to_string(),
                    hidden: spec.hidden,
                })
                .await?;
            report.inserted += 1;
        }

        if report.is_noop() {
            info!("all service entries are up to date");
        } else {
            info!(
                "service entries updated ({} removed, {} inserted, {} unchanged)",
                report.removed, report.inserted, report.unchanged
            );
        }

        Ok(report)
    }

    /// Every registered service, in no particular order
    ///
    /// A storage failure is logged and reported as an empty list.
    pub async fn list_services(&self) -> Vec<Service> {
        self.backend.list_services().await.unwrap_or_else(|e| {
            error!("failed to list services: {e}");
            Vec::new()
        })
    }

    /// Id of the service registered under `(name, group)`, if any
    pub async fn find_service_id(&self, name: &str, group: &str) -> Option<ServiceId> {
        match self.backend.find_service_id(name, group).await {
            Ok(id) => Some(id),
            Err(StorageError::NotFound(_)) => None,
            Err(e) => {
                error!("failed to look up service {group}/{name}: {e}");
                None
            }
        }
    }
}

/// Pair every persisted service with its configured check interval
///
/// A service that matches no specification falls back to `DEFAULT_INTERVAL`.
pub fn service_intervals(
    services: Vec<Service>,
    desired: &[ServiceSpec],
) -> Vec<(Service, Duration)> {
    let intervals: HashMap<ServiceKey, Duration> = desired
        .iter()
        .map(|spec| (spec.key(), spec.interval))
        .collect();

    services
        .into_iter()
        .map(|service| {
            let interval = intervals
                .get(&ServiceKey::from(&service))
                .copied()
                .unwrap_or(DEFAULT_INTERVAL);
            (service, interval)
        })
        .collect()
}
