//! ServiceMonitorActor - Periodically checks one service endpoint
//!
//! ## Key Features
//!
//! 1. **Fixed-rate cadence** - Ticks are anchored to the actor's start, the first one fires immediately
//! 2. **No overlap** - A tick that arrives while the previous check is still running is skipped
//! 3. **Shared pool** - Checks run as spawned tasks on the runtime's worker pool
//! 4. **Cooperative shutdown** - In-flight checks finish and are stored before the actor exits
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → in-flight? ──yes──> skip (logged)
//!                  │ no
//!                  ▼
//!            spawn check → CheckRunner → HistoryStore::append → HistoryStore::retain
//!     ↑
//!     └─── Commands (CheckNow, Shutdown)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use reqwest::Url;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::checker::{CheckOutcome, CheckRunner};
use crate::history::HistoryStore;
use crate::storage::{Service, ServiceId, Status};

use super::messages::{ServiceCommand, TimerState};

/// Collaborators shared by every service monitor
#[derive(Clone)]
pub struct ProbeSettings {
    pub runner: Arc<dyn CheckRunner>,
    pub history: HistoryStore,
    /// Retention cap applied after every stored check
    pub retention: usize,
}

/// State shared between the actor and its spawned checks
struct ProbeContext {
    service: Service,
    endpoint: Url,
    settings: ProbeSettings,
    in_flight: AtomicBool,
    state: watch::Sender<TimerState>,
}

impl ProbeContext {
    /// Check once, store the result, apply retention
    async fn run(&self) -> CheckOutcome {
        let outcome = self.settings.runner.check(&self.endpoint).await;
        let timestamp = Utc::now();

        if outcome.status == Status::Operational {
            trace!("{}/{} is operational", self.service.group, self.service.name);
        } else {
            info!(
                "check failed ({}/{}): {} {}",
                self.service.group,
                self.service.name,
                outcome.status,
                outcome.error.as_deref().unwrap_or_default()
            );
        }

        self.settings
            .history
            .append(
                self.service.id,
                timestamp,
                outcome.status,
                outcome.error.clone(),
                outcome.possible_cause.clone(),
            )
            .await;
        self.settings
            .history
            .retain(self.service.id, self.settings.retention)
            .await;

        outcome
    }
}

/// Actor that monitors a single service endpoint
pub struct ServiceMonitorActor {
    context: Arc<ProbeContext>,

    /// Time between two ticks
    interval_duration: Duration,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<ServiceCommand>,

    /// Checks currently running on the worker pool
    probes: JoinSet<()>,
}

impl ServiceMonitorActor {
    fn new(
        context: Arc<ProbeContext>,
        interval_duration: Duration,
        command_rx: mpsc::Receiver<ServiceCommand>,
    ) -> Self {
        Self {
            context,
            interval_duration,
            command_rx,
            probes: JoinSet::new(),
        }
    }

    /// Run the actor's main loop
    ///
    /// This runs until a Shutdown command is received or every handle is dropped.
    #[instrument(skip(self), fields(service = %self.context.service.name, group = %self.context.service.group))]
    pub async fn run(mut self) {
        debug!("starting service monitor actor");

        let mut ticker = interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.context.state.send_replace(TimerState::Scheduled);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.start_probe(None),

                cmd = self.command_rx.recv() => match cmd {
                    Some(ServiceCommand::CheckNow { respond_to }) => {
                        debug!("received CheckNow command");
                        self.start_probe(Some(respond_to));
                    }
                    Some(ServiceCommand::Shutdown) => {
                        debug!("received shutdown command");
                        break;
                    }
                    None => {
                        warn!("command channel closed, shutting down");
                        break;
                    }
                },

                Some(result) = self.probes.join_next(), if !self.probes.is_empty() => {
                    if let Err(e) = result {
                        error!("check task failed: {e}");
                    }
                }
            }
        }

        // Let in-flight checks finish and store their result.
        while let Some(result) = self.probes.join_next().await {
            if let Err(e) = result {
                error!("check task failed: {e}");
            }
        }

        self.context.state.send_replace(TimerState::Cancelled);
        debug!("service monitor actor stopped");
    }

    fn start_probe(&mut self, respond_to: Option<oneshot::Sender<Option<CheckOutcome>>>) {
        if self.context.in_flight.swap(true, Ordering::AcqRel) {
            warn!(
                "previous check of {}/{} still running, skipping",
                self.context.service.group, self.context.service.name
            );
            if let Some(tx) = respond_to {
                let _ = tx.send(None);
            }
            return;
        }

        self.context.state.send_replace(TimerState::Running);

        let context = Arc::clone(&self.context);
        self.probes.spawn(async move {
            let outcome = context.run().await;

            context.in_flight.store(false, Ordering::Release);
            context.state.send_if_modified(|state| {
                if *state == TimerState::Running {
                    *state = TimerState::Scheduled;
                    true
                } else {
                    false
                }
            });

            if let Some(tx) = respond_to {
                let _ = tx.send(Some(outcome));
            }
        });
    }
}

/// Handle for controlling a ServiceMonitorActor
#[derive(Clone)]
pub struct ServiceHandle {
    sender: mpsc::Sender<ServiceCommand>,
    state: watch::Receiver<TimerState>,
    service: Service,
}

impl ServiceHandle {
    /// Spawn a new service monitor actor
    ///
    /// The returned join handle completes once the actor has stopped and its
    /// last check has been stored.
    pub fn spawn(
        service: Service,
        endpoint: Url,
        interval: Duration,
        settings: ProbeSettings,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(TimerState::Idle);

        let context = Arc::new(ProbeContext {
            service: service.clone(),
            endpoint,
            settings,
            in_flight: AtomicBool::new(false),
            state: state_tx,
        });

        let actor = ServiceMonitorActor::new(context, interval, cmd_rx);
        let join = tokio::spawn(actor.run());

        let handle = Self {
            sender: cmd_tx,
            state: state_rx,
            service,
        };
        (handle, join)
    }

    /// Trigger an immediate check
    ///
    /// Returns `None` if a check for this service was already in flight.
    pub async fn check_now(&self) -> Result<Option<CheckOutcome>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ServiceCommand::CheckNow { respond_to: tx })
            .await?;

        Ok(rx.await?)
    }

    /// Ask the actor to stop
    pub async fn shutdown(&self) {
        let _ = self.sender.send(ServiceCommand::Shutdown).await;
    }

    /// Current timer state
    pub fn state(&self) -> TimerState {
        *self.state.borrow()
    }

    pub fn service_id(&self) -> ServiceId {
        self.service.id
    }

    pub fn service(&self) -> &Service {
        &self.service
    }
}
