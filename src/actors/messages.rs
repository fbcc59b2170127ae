//! Message types for actor communication
//!
//! Each service monitor actor owns an mpsc command channel and publishes its
//! timer state on a watch channel. Replies travel back over oneshot channels.

use tokio::sync::oneshot;

use crate::checker::CheckOutcome;

/// Commands that can be sent to a ServiceMonitorActor
#[derive(Debug)]
pub enum ServiceCommand {
    /// Run a check right away, outside the timer cadence
    ///
    /// Replies with `None` when a check for the service is already in flight.
    CheckNow {
        respond_to: oneshot::Sender<Option<CheckOutcome>>,
    },

    /// Stop issuing checks
    ///
    /// The actor waits for its in-flight check to be stored and then exits.
    Shutdown,
}

/// Lifecycle of one service's timer
///
/// ```text
/// Idle -> Scheduled -> Running -> Scheduled -> ... -> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Spawned, the timer has not started yet
    Idle,

    /// Waiting for the next tick
    Scheduled,

    /// A check is in flight
    Running,

    /// Shut down; no further checks will run
    Cancelled,
}
