//! Process wiring
//!
//! `Monitor` owns the storage handle and builds the registry, the history
//! store and the scheduler on top of it. Startup and shutdown are explicit
//! calls; nothing here is global.
//!
//! ```no_run
//! # use statuswatch::{config::read_config_file, monitor::Monitor};
//! # async fn example() -> anyhow::Result<()> {
//! let config = read_config_file("./config.json")?;
//! let mut monitor = Monitor::open(&config).await?;
//! monitor.start().await;
//! // ...
//! monitor.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::actors::service_monitor::ProbeSettings;
use crate::checker::{CheckRunner, HttpCheckRunner};
use crate::config::{Config, ServiceSpec};
use crate::history::HistoryStore;
use crate::registry::{ReconcileReport, ServiceRegistry, service_intervals};
use crate::scheduler::Scheduler;
use crate::storage::sqlite::SqliteBackend;
use crate::storage::{HistoryEntry, Service, ServiceId, Status, StorageBackend};

pub struct Monitor {
    backend: Arc<dyn StorageBackend>,
    registry: ServiceRegistry,
    history: HistoryStore,
    scheduler: Scheduler,
    specs: Vec<ServiceSpec>,
    reconciled: ReconcileReport,
}

impl Monitor {
    /// Validate the configuration, open storage and reconcile the registry
    ///
    /// Fails on any configuration error and on any storage error during
    /// reconciliation. Nothing is scheduled yet.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let runner = HttpCheckRunner::new(config.check.timeout())
            .context("failed to build the HTTP client")?;
        Self::open_with_runner(config, Arc::new(runner)).await
    }

    /// Same as `open`, with a custom check runner
    #[instrument(skip_all)]
    pub async fn open_with_runner(
        config: &Config,
        runner: Arc<dyn CheckRunner>,
    ) -> anyhow::Result<Self> {
        let specs = config.validate().context("invalid configuration")?;

        let prefix = &config.database.table_prefix;
        let backend: Arc<dyn StorageBackend> = match &config.database.path {
            Some(path) => Arc::new(SqliteBackend::new(path, prefix).await?),
            None => {
                warn!("no database path configured, falling back to an in-memory database");
                Arc::new(SqliteBackend::in_memory(prefix).await?)
            }
        };

        let registry = ServiceRegistry::new(backend.clone());
        let reconciled = registry
            .reconcile(&specs)
            .await
            .context("failed to reconcile the service registry")?;

        let history = HistoryStore::new(backend.clone());
        let scheduler = Scheduler::new(ProbeSettings {
            runner,
            history: history.clone(),
            retention: config.history.retention,
        });

        Ok(Self {
            backend,
            registry,
            history,
            scheduler,
            specs,
            reconciled,
        })
    }

    /// Start one timer per registered service
    pub async fn start(&mut self) -> usize {
        let services = self.registry.list_services().await;
        let started = self
            .scheduler
            .start(service_intervals(services, &self.specs));
        info!("monitoring {started} services");
        started
    }

    /// Stop all timers, wait for in-flight checks, then close storage
    #[instrument(skip_all)]
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.scheduler.stop().await;
        self.backend.close().await?;
        info!("shutdown complete");
        Ok(())
    }

    /// Outcome of the reconciliation performed by `open`
    pub fn reconcile_report(&self) -> ReconcileReport {
        self.reconciled
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub async fn list_services(&self) -> Vec<Service> {
        self.registry.list_services().await
    }

    /// Newest-first history of a service
    pub async fn get_history(&self, service_id: ServiceId, limit: usize) -> Vec<HistoryEntry> {
        self.history.recent(service_id, limit).await
    }

    pub async fn find_service_id(&self, name: &str, group: &str) -> Option<ServiceId> {
        self.registry.find_service_id(name, group).await
    }

    pub async fn record_check(
        &self,
        service_id: ServiceId,
        timestamp: DateTime<Utc>,
        status: Status,
        error: Option<String>,
        possible_cause: Option<String>,
    ) -> Option<i64> {
        self.history
            .append(service_id, timestamp, status, error, possible_cause)
            .await
    }

    pub async fn prune_history(&self, service_id: ServiceId, cap: usize) -> usize {
        self.history.retain(service_id, cap).await
    }
}
