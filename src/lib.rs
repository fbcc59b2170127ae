//! Endpoint status monitor
//!
//! Periodically checks a configured set of http(s) services, classifies each
//! result as `OPERATIONAL`, `LIMITED` or `OFFLINE`, and keeps a bounded
//! per-service history in SQLite.
//!
//! - [`registry`] keeps the persisted services in step with the configuration
//! - [`checker`] probes one endpoint and classifies the outcome
//! - [`scheduler`] runs one independent timer per service
//! - [`history`] appends results and enforces the retention cap
//! - [`monitor`] wires everything together

pub mod actors;
pub mod checker;
pub mod config;
pub mod history;
pub mod monitor;
pub mod registry;
pub mod scheduler;
pub mod storage;

pub use checker::{CheckOutcome, CheckRunner, HttpCheckRunner};
pub use monitor::Monitor;
pub use storage::{HistoryEntry, Service, ServiceId, Status};
