//! Scheduler - one independent timer per service
//!
//! The scheduler spawns a `ServiceMonitorActor` per service and keeps its
//! handle. Actors share nothing but the check runner and the history store,
//! so a slow or failing service never delays another one.

use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::actors::service_monitor::{ProbeSettings, ServiceHandle};
use crate::config::parse_endpoint;
use crate::storage::{Service, ServiceId};

pub struct Scheduler {
    settings: ProbeSettings,
    monitors: Vec<(ServiceHandle, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new(settings: ProbeSettings) -> Self {
        Self {
            settings,
            monitors: Vec::new(),
        }
    }

    /// Start one timer per service
    ///
    /// A service whose stored endpoint no longer parses is logged and left
    /// unscheduled. Returns the number of timers started.
    #[instrument(skip_all, fields(services = services.len()))]
    pub fn start(&mut self, services: Vec<(Service, Duration)>) -> usize {
        let mut started = 0;

        for (service, interval) in services {
            let endpoint = match parse_endpoint(&service.endpoint) {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    error!(
                        "not scheduling {}/{}: {e:#}",
                        service.group, service.name
                    );
                    continue;
                }
            };

            info!(
                "scheduling a check every {}s for service {}/{}",
                interval.as_secs_f64(),
                service.group,
                service.name
            );
            self.monitors.push(ServiceHandle::spawn(
                service,
                endpoint,
                interval,
                self.settings.clone(),
            ));
            started += 1;
        }

        started
    }

    /// Handles of all running monitors
    pub fn handles(&self) -> impl Iterator<Item = &ServiceHandle> {
        self.monitors.iter().map(|(handle, _)| handle)
    }

    /// Handle of the monitor for a given service
    pub fn handle(&self, service_id: ServiceId) -> Option<&ServiceHandle> {
        self.handles().find(|handle| handle.service_id() == service_id)
    }

    /// Cancel all future ticks and wait for in-flight checks to finish
    #[instrument(skip_all)]
    pub async fn stop(&mut self) {
        let monitors = std::mem::take(&mut self.monitors);
        if monitors.is_empty() {
            return;
        }

        info!("stopping {} service monitors", monitors.len());

        for (handle, _) in &monitors {
            handle.shutdown().await;
        }

        let results = join_all(monitors.into_iter().map(|(_, join)| join)).await;
        for result in results {
            if let Err(e) = result {
                error!("service monitor ended abnormally: {e}");
            }
        }

        info!("scheduler stopped");
    }
}
